// backend/mod.rs — rendering backends
//
// ┌──────────────────────────────────────────────┐
// │              RenderBackend trait             │
// ├────────────────┬──────────────┬──────────────┤
// │ GPU            │ GPU          │ Software     │
// │ (accelerated)  │ (software    │ canvas       │
// │                │  rasterizer) │ (CPU rays)   │
// └────────────────┴──────────────┴──────────────┘

pub mod config;
pub mod gpu;
pub mod software;

use std::sync::Arc;

use crate::camera::Camera;
use crate::error::RenderResult;
use crate::panorama::Panorama;

pub use config::{renderer_config, GpuPreset, PowerPreference, RendererConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gpu,
    Software,
}

/// Logical (CSS pixel) size of a render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    /// Zero-sized containers still get a 1×1 surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn scaled(&self, ratio: f32) -> Self {
        Self::new(
            (self.width as f32 * ratio).round() as u32,
            (self.height as f32 * ratio).round() as u32,
        )
    }
}

/// The capability set every backend offers the viewer.
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    fn max_texture_dimension(&self) -> u32;

    fn resize(&mut self, size: SurfaceSize);

    fn set_pixel_ratio(&mut self, ratio: f32);

    /// Replace the panorama shown on the sphere.
    fn set_panorama(&mut self, panorama: Arc<Panorama>) -> RenderResult<()>;

    /// Draw one frame. Without a panorama the frame is blank.
    fn render_frame(&mut self, camera: &Camera) -> RenderResult<()>;

    /// Free every graphics resource and detach the output surface.
    /// Idempotent; rendering afterwards is a no-op.
    fn release(&mut self);
}

/// Builds backends for one container. Implemented by the host.
#[allow(async_fn_in_trait)]
pub trait BackendProvider {
    /// Try to build a GPU backend with one preset.
    async fn create_gpu(&self, preset: &GpuPreset, size: SurfaceSize) -> RenderResult<Box<dyn RenderBackend>>;

    /// Build the CPU canvas backend.
    fn create_software(&self, size: SurfaceSize) -> RenderResult<Box<dyn RenderBackend>>;
}
