// software.rs — CPU canvas backend

use std::sync::Arc;

use image::RgbaImage;

use super::{BackendKind, RenderBackend, SurfaceSize};
use crate::camera::Camera;
use crate::error::RenderResult;
use crate::panorama::Panorama;
use crate::projector;

/// Texture edge limit for the CPU path; larger sources only cost memory.
const SOFTWARE_MAX_TEXTURE: u32 = 4096;

/// Destination for finished software frames, e.g. a 2D canvas.
pub trait CanvasSink {
    fn resize(&mut self, size: SurfaceSize);

    /// Copy `frame` to the visible surface.
    fn present(&mut self, frame: &RgbaImage) -> RenderResult<()>;

    /// Remove the surface from the page.
    fn detach(&mut self);
}

/// Paints frames with [`projector::project`]. Pixel ratio is pinned to 1.
pub struct SoftwareCanvasBackend {
    sink: Option<Box<dyn CanvasSink>>,
    frame: RgbaImage,
    panorama: Option<Arc<Panorama>>,
}

impl SoftwareCanvasBackend {
    pub fn new(sink: Box<dyn CanvasSink>, size: SurfaceSize) -> Self {
        let mut backend = Self {
            sink: Some(sink),
            frame: RgbaImage::new(size.width, size.height),
            panorama: None,
        };
        backend.resize(size);
        backend
    }

    /// The most recently painted frame.
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }
}

impl RenderBackend for SoftwareCanvasBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn max_texture_dimension(&self) -> u32 {
        SOFTWARE_MAX_TEXTURE
    }

    fn resize(&mut self, size: SurfaceSize) {
        if self.frame.dimensions() != (size.width, size.height) {
            self.frame = RgbaImage::new(size.width, size.height);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.resize(size);
        }
        log::debug!("software canvas resized to {}x{}", size.width, size.height);
    }

    fn set_pixel_ratio(&mut self, _ratio: f32) {}

    fn set_panorama(&mut self, panorama: Arc<Panorama>) -> RenderResult<()> {
        self.panorama = Some(panorama);
        Ok(())
    }

    fn render_frame(&mut self, camera: &Camera) -> RenderResult<()> {
        let (Some(sink), Some(panorama)) = (self.sink.as_mut(), self.panorama.as_ref()) else {
            return Ok(());
        };
        projector::project(panorama, camera, &mut self.frame);
        sink.present(&self.frame)
    }

    fn release(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.detach();
        }
        self.panorama = None;
        self.frame = RgbaImage::new(0, 0);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use image::Rgba;

    use super::*;

    #[derive(Default)]
    pub(crate) struct SinkLog {
        pub presents: usize,
        pub detaches: usize,
        pub size: Option<SurfaceSize>,
    }

    pub(crate) struct RecordingSink(pub Rc<RefCell<SinkLog>>);

    impl CanvasSink for RecordingSink {
        fn resize(&mut self, size: SurfaceSize) {
            self.0.borrow_mut().size = Some(size);
        }

        fn present(&mut self, _frame: &RgbaImage) -> RenderResult<()> {
            self.0.borrow_mut().presents += 1;
            Ok(())
        }

        fn detach(&mut self) {
            self.0.borrow_mut().detaches += 1;
        }
    }

    fn backend() -> (SoftwareCanvasBackend, Rc<RefCell<SinkLog>>) {
        let log = Rc::new(RefCell::new(SinkLog::default()));
        let b = SoftwareCanvasBackend::new(Box::new(RecordingSink(log.clone())), SurfaceSize::new(8, 4));
        (b, log)
    }

    #[test]
    fn blank_until_a_panorama_arrives() {
        let (mut b, log) = backend();
        b.render_frame(&Camera::new(90.0, 0.0, 75.0, 2.0)).unwrap();
        assert_eq!(log.borrow().presents, 0);

        let pano = Panorama::from_rgba(RgbaImage::from_pixel(8, 4, Rgba([9, 9, 9, 255])), 4096).unwrap();
        b.set_panorama(Arc::new(pano)).unwrap();
        b.render_frame(&Camera::new(90.0, 0.0, 75.0, 2.0)).unwrap();
        assert_eq!(log.borrow().presents, 1);
        assert_eq!(b.frame().get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn release_detaches_once() {
        let (mut b, log) = backend();
        b.release();
        b.release();
        assert_eq!(log.borrow().detaches, 1);
        b.render_frame(&Camera::new(0.0, 0.0, 75.0, 1.0)).unwrap();
        assert_eq!(log.borrow().presents, 0);
    }

    #[test]
    fn resize_reallocates_frame_and_sink() {
        let (mut b, log) = backend();
        b.resize(SurfaceSize::new(3, 2));
        assert_eq!(b.frame().dimensions(), (3, 2));
        assert_eq!(log.borrow().size, Some(SurfaceSize::new(3, 2)));
    }
}
