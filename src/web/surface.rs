// surface.rs — canvases and the backends drawn into them

use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, Document, HtmlCanvasElement, HtmlElement, ImageData};

use super::listener::Listener;
use crate::backend::gpu::GpuBackend;
use crate::backend::software::{CanvasSink, SoftwareCanvasBackend};
use crate::backend::{BackendKind, BackendProvider, GpuPreset, RenderBackend, SurfaceSize};
use crate::camera::Camera;
use crate::error::{RenderError, RenderResult};
use crate::panorama::Panorama;

/// WebGL context state changes reported by a GPU canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextEvent {
    Lost,
    Restored,
}

/// Builds backends inside one viewer container.
pub struct WebBackendProvider {
    document: Document,
    container: HtmlElement,
    on_context: Rc<dyn Fn(ContextEvent)>,
}

impl WebBackendProvider {
    pub fn new(document: Document, container: HtmlElement, on_context: Rc<dyn Fn(ContextEvent)>) -> Self {
        Self {
            document,
            container,
            on_context,
        }
    }

    /// A fresh canvas filling the container, inserted behind the controls.
    fn mount_canvas(&self, class: &str) -> RenderResult<HtmlCanvasElement> {
        let canvas: HtmlCanvasElement = self
            .document
            .create_element("canvas")
            .map_err(|e| RenderError::Resource(format!("{e:?}")))?
            .dyn_into()
            .map_err(|_| RenderError::Resource("canvas element has the wrong type".into()))?;
        canvas.set_class_name(class);
        let style = canvas.style();
        for (name, value) in [
            ("position", "absolute"),
            ("top", "0"),
            ("left", "0"),
            ("width", "100%"),
            ("height", "100%"),
            ("display", "block"),
        ] {
            let _ = style.set_property(name, value);
        }
        self.container
            .insert_before(&canvas, self.container.first_child().as_ref())
            .map_err(|e| RenderError::Resource(format!("{e:?}")))?;
        Ok(canvas)
    }
}

impl BackendProvider for WebBackendProvider {
    async fn create_gpu(&self, preset: &GpuPreset, size: SurfaceSize) -> RenderResult<Box<dyn RenderBackend>> {
        let canvas = self.mount_canvas("psv-canvas psv-canvas-gpu")?;
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let attempt = async {
            let surface = instance
                .create_surface_from_canvas(canvas.clone())
                .map_err(|e| RenderError::GpuInit(e.to_string()))?;
            GpuBackend::new(&instance, surface, preset, size).await
        };
        match attempt.await {
            Ok(backend) => {
                let listeners = context_listeners(&canvas, &self.on_context);
                Ok(Box::new(GpuCanvasBackend {
                    inner: backend,
                    canvas: Some(canvas),
                    listeners,
                }))
            }
            Err(e) => {
                canvas.remove();
                Err(e)
            }
        }
    }

    fn create_software(&self, size: SurfaceSize) -> RenderResult<Box<dyn RenderBackend>> {
        let canvas = self.mount_canvas("psv-canvas psv-canvas-2d")?;
        let context = canvas
            .get_context("2d")
            .ok()
            .flatten()
            .and_then(|c| c.dyn_into::<CanvasRenderingContext2d>().ok());
        let Some(context) = context else {
            canvas.remove();
            return Err(RenderError::NoBackend("2d canvas context unavailable".into()));
        };
        let sink = Canvas2dSink { canvas, context };
        Ok(Box::new(SoftwareCanvasBackend::new(Box::new(sink), size)))
    }
}

fn context_listeners(canvas: &HtmlCanvasElement, on_context: &Rc<dyn Fn(ContextEvent)>) -> Vec<Listener> {
    let mut listeners = Vec::new();
    let lost = on_context.clone();
    match Listener::new(canvas, "webglcontextlost", move |e| {
        e.prevent_default();
        lost(ContextEvent::Lost);
    }) {
        Ok(l) => listeners.push(l),
        Err(e) => log::warn!("cannot observe context loss: {e}"),
    }
    let restored = on_context.clone();
    match Listener::new(canvas, "webglcontextrestored", move |_| restored(ContextEvent::Restored)) {
        Ok(l) => listeners.push(l),
        Err(e) => log::warn!("cannot observe context restoration: {e}"),
    }
    listeners
}

/// [`GpuBackend`] that owns its canvas and context listeners.
struct GpuCanvasBackend {
    inner: GpuBackend,
    canvas: Option<HtmlCanvasElement>,
    listeners: Vec<Listener>,
}

impl RenderBackend for GpuCanvasBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn max_texture_dimension(&self) -> u32 {
        self.inner.max_texture_dimension()
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.inner.resize(size);
    }

    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.inner.set_pixel_ratio(ratio);
    }

    fn set_panorama(&mut self, panorama: Arc<Panorama>) -> RenderResult<()> {
        self.inner.set_panorama(panorama)
    }

    fn render_frame(&mut self, camera: &Camera) -> RenderResult<()> {
        self.inner.render_frame(camera)
    }

    fn release(&mut self) {
        self.inner.release();
        self.listeners.clear();
        if let Some(canvas) = self.canvas.take() {
            canvas.remove();
        }
    }
}

/// Presents software frames with `putImageData`.
struct Canvas2dSink {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl CanvasSink for Canvas2dSink {
    fn resize(&mut self, size: SurfaceSize) {
        self.canvas.set_width(size.width);
        self.canvas.set_height(size.height);
    }

    fn present(&mut self, frame: &RgbaImage) -> RenderResult<()> {
        let (width, height) = frame.dimensions();
        let data = ImageData::new_with_u8_clamped_array_and_sh(Clamped(frame.as_raw().as_slice()), width, height)
            .map_err(|e| RenderError::Frame(format!("{e:?}")))?;
        self.context
            .put_image_data(&data, 0.0, 0.0)
            .map_err(|e| RenderError::Frame(format!("{e:?}")))
    }

    fn detach(&mut self) {
        self.canvas.remove();
    }
}
