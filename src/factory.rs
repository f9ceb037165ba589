// factory.rs — backend selection with graceful degradation
//
// GPU presets are tried in order by one retry loop; whatever happens, the
// caller gets a backend back unless the host cannot even provide a 2D
// canvas.

use crate::backend::{BackendProvider, GpuPreset, RenderBackend, RendererConfig, SurfaceSize};
use crate::device::DeviceInfo;
use crate::error::{RenderError, RenderResult};

/// Build the best backend the device supports.
///
/// Never returns a GPU construction error: exhausted presets fall back to the
/// software canvas.
pub async fn create_renderer<P: BackendProvider>(
    provider: &P,
    device: &DeviceInfo,
    config: &RendererConfig,
    size: SurfaceSize,
) -> RenderResult<Box<dyn RenderBackend>> {
    if device.gpu_api_supported {
        match try_presets(provider, &GpuPreset::ladder(config, device.is_mobile), size).await {
            Ok(mut backend) => {
                backend.set_pixel_ratio(config.pixel_ratio);
                backend.resize(size);
                return Ok(backend);
            }
            Err(e) => log::debug!("GPU backend unavailable, using software canvas: {e}"),
        }
    } else {
        log::debug!("graphics API unsupported, using software canvas");
    }

    create_software(provider, size)
}

/// First preset that yields a live backend, or the last failure.
async fn try_presets<P: BackendProvider>(
    provider: &P,
    presets: &[GpuPreset],
    size: SurfaceSize,
) -> RenderResult<Box<dyn RenderBackend>> {
    let mut last_error = RenderError::GpuInit("no presets to try".to_string());
    for (attempt, preset) in presets.iter().enumerate() {
        match provider.create_gpu(preset, size).await {
            Ok(backend) => {
                log::debug!("GPU backend created with preset #{attempt}: {preset:?}");
                return Ok(backend);
            }
            Err(e) => {
                log::debug!("GPU preset #{attempt} failed: {e}");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Software canvas at pixel ratio 1.
pub fn create_software<P: BackendProvider>(
    provider: &P,
    size: SurfaceSize,
) -> RenderResult<Box<dyn RenderBackend>> {
    let mut backend = provider
        .create_software(size)
        .map_err(|e| RenderError::NoBackend(e.to_string()))?;
    backend.set_pixel_ratio(1.0);
    Ok(backend)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::backend::software::tests::{RecordingSink, SinkLog};
    use crate::backend::software::SoftwareCanvasBackend;
    use crate::backend::BackendKind;
    use crate::camera::Camera;
    use crate::panorama::Panorama;

    /// GPU stand-in that records everything done to it.
    #[derive(Default)]
    pub(crate) struct StubGpuLog {
        pub pixel_ratio: Option<f32>,
        pub size: Option<SurfaceSize>,
        pub frames: usize,
        pub releases: usize,
        pub lose_context: bool,
    }

    pub(crate) struct StubGpu(pub Rc<RefCell<StubGpuLog>>);

    impl RenderBackend for StubGpu {
        fn kind(&self) -> BackendKind {
            BackendKind::Gpu
        }

        fn max_texture_dimension(&self) -> u32 {
            8192
        }

        fn resize(&mut self, size: SurfaceSize) {
            self.0.borrow_mut().size = Some(size);
        }

        fn set_pixel_ratio(&mut self, ratio: f32) {
            self.0.borrow_mut().pixel_ratio = Some(ratio);
        }

        fn set_panorama(&mut self, _panorama: Arc<Panorama>) -> RenderResult<()> {
            Ok(())
        }

        fn render_frame(&mut self, _camera: &Camera) -> RenderResult<()> {
            let mut log = self.0.borrow_mut();
            if log.lose_context {
                return Err(RenderError::ContextLost);
            }
            log.frames += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.0.borrow_mut().releases += 1;
        }
    }

    /// Provider whose GPU attempts succeed from attempt `succeed_at` on.
    #[derive(Default)]
    pub(crate) struct FakeProvider {
        pub succeed_at: Option<usize>,
        pub attempts: Cell<usize>,
        pub presets: RefCell<Vec<GpuPreset>>,
        pub gpu_log: Rc<RefCell<StubGpuLog>>,
        pub sink_log: Rc<RefCell<SinkLog>>,
    }

    impl FakeProvider {
        pub(crate) fn working() -> Self {
            Self {
                succeed_at: Some(0),
                ..Self::default()
            }
        }
    }

    impl BackendProvider for FakeProvider {
        async fn create_gpu(&self, preset: &GpuPreset, _size: SurfaceSize) -> RenderResult<Box<dyn RenderBackend>> {
            let attempt = self.attempts.get();
            self.attempts.set(attempt + 1);
            self.presets.borrow_mut().push(preset.clone());
            match self.succeed_at {
                Some(n) if attempt >= n => Ok(Box::new(StubGpu(self.gpu_log.clone()))),
                _ => Err(RenderError::GpuInit(format!("attempt {attempt} refused"))),
            }
        }

        fn create_software(&self, size: SurfaceSize) -> RenderResult<Box<dyn RenderBackend>> {
            Ok(Box::new(SoftwareCanvasBackend::new(
                Box::new(RecordingSink(self.sink_log.clone())),
                size,
            )))
        }
    }

    fn device(mobile: bool, gpu: bool) -> DeviceInfo {
        DeviceInfo {
            is_mobile: mobile,
            is_desktop_os: false,
            gpu_api_supported: gpu,
            hardware_acceleration_enabled: true,
            user_agent: String::new(),
            device_pixel_ratio: 2.0,
        }
    }

    fn build(provider: &FakeProvider, device: &DeviceInfo) -> Box<dyn RenderBackend> {
        let config = RendererConfig::for_device(device);
        pollster::block_on(create_renderer(provider, device, &config, SurfaceSize::new(320, 200))).unwrap()
    }

    #[test]
    fn unsupported_gpu_never_touches_the_gpu_path() {
        let provider = FakeProvider::working();
        let backend = build(&provider, &device(false, false));
        assert_eq!(backend.kind(), BackendKind::Software);
        assert_eq!(provider.attempts.get(), 0);
    }

    #[test]
    fn desktop_gets_one_attempt() {
        let provider = FakeProvider {
            succeed_at: Some(1),
            ..FakeProvider::default()
        };
        let backend = build(&provider, &device(false, true));
        assert_eq!(backend.kind(), BackendKind::Software);
        assert_eq!(provider.attempts.get(), 1);
    }

    #[test]
    fn mobile_walks_down_the_preset_ladder() {
        let provider = FakeProvider {
            succeed_at: Some(2),
            ..FakeProvider::default()
        };
        let backend = build(&provider, &device(true, true));
        assert_eq!(backend.kind(), BackendKind::Gpu);
        assert_eq!(provider.attempts.get(), 3);
        let presets = provider.presets.borrow();
        assert_eq!(presets[2], GpuPreset { antialias: Some(false), ..GpuPreset::default() });
    }

    #[test]
    fn exhausted_ladder_falls_back_to_software() {
        let provider = FakeProvider::default();
        let backend = build(&provider, &device(true, true));
        assert_eq!(backend.kind(), BackendKind::Software);
        assert_eq!(provider.attempts.get(), 4);
    }

    #[test]
    fn successful_gpu_gets_ratio_and_size() {
        let provider = FakeProvider::working();
        build(&provider, &device(false, true));
        let log = provider.gpu_log.borrow();
        assert_eq!(log.pixel_ratio, Some(2.0));
        assert_eq!(log.size, Some(SurfaceSize::new(320, 200)));
    }
}
