// error.rs — error types shared by the widget core and its hosts

use thiserror::Error;

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised while building or driving a render backend.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No backend could be created, not even the software canvas.
    #[error("no rendering backend available: {0}")]
    NoBackend(String),

    /// A GPU configuration preset failed to produce a live context.
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),

    /// The GPU context was lost while rendering.
    #[error("graphics context lost")]
    ContextLost,

    /// A texture or other resource could not be created.
    #[error("failed to create resource: {0}")]
    Resource(String),

    /// A frame could not be produced.
    #[error("frame render failed: {0}")]
    Frame(String),
}

/// Errors raised while decoding a panorama image.
#[derive(Debug, Error)]
pub enum PanoramaError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has zero size")]
    Empty,
}

/// Errors raised by host (DOM) operations.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("host API unavailable: {0}")]
    Unavailable(&'static str),

    #[error("host call failed: {0}")]
    Js(String),
}

/// Errors raised while probing device capabilities. Probing fails soft, so
/// these only ever surface in logs.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no graphics context")]
    NoContext,

    #[error("graphics context cannot allocate {0}")]
    Allocation(&'static str),

    #[error("probe failed: {0}")]
    Other(String),
}
