// probe.rs — capability probing against the live browser

use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlCanvasElement, WebGlRenderingContext, Window};

use crate::device::DeviceProbe;
use crate::error::ProbeError;

/// `UNMASKED_RENDERER_WEBGL` from `WEBGL_debug_renderer_info`.
const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

pub struct WebDeviceProbe {
    window: Window,
    document: Document,
}

impl WebDeviceProbe {
    pub fn new(window: Window, document: Document) -> Self {
        Self { window, document }
    }

    /// A WebGL context on a throwaway canvas.
    fn throwaway_context(&self) -> Result<WebGlRenderingContext, ProbeError> {
        let canvas: HtmlCanvasElement = self
            .document
            .create_element("canvas")
            .map_err(|e| ProbeError::Other(format!("{e:?}")))?
            .dyn_into()
            .map_err(|_| ProbeError::Other("canvas is not an HtmlCanvasElement".into()))?;
        ["webgl", "experimental-webgl"]
            .iter()
            .find_map(|kind| canvas.get_context(kind).ok().flatten())
            .and_then(|ctx| ctx.dyn_into::<WebGlRenderingContext>().ok())
            .ok_or(ProbeError::NoContext)
    }
}

impl DeviceProbe for WebDeviceProbe {
    fn user_agent(&self) -> String {
        self.window.navigator().user_agent().unwrap_or_default()
    }

    fn has_touch(&self) -> bool {
        let ontouchstart = js_sys::Reflect::has(&self.window, &"ontouchstart".into()).unwrap_or(false);
        ontouchstart || self.window.navigator().max_touch_points() > 0
    }

    fn viewport_width(&self) -> f64 {
        self.window
            .inner_width()
            .ok()
            .and_then(|w| w.as_f64())
            .unwrap_or(f64::MAX)
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.window.device_pixel_ratio()
    }

    fn probe_gpu_api(&self) -> Result<(), ProbeError> {
        let gl = self.throwaway_context()?;
        let program = gl.create_program().ok_or(ProbeError::Allocation("program"))?;
        let vertex = gl.create_shader(WebGlRenderingContext::VERTEX_SHADER);
        let fragment = gl.create_shader(WebGlRenderingContext::FRAGMENT_SHADER);
        let ok = vertex.is_some() && fragment.is_some();
        gl.delete_shader(vertex.as_ref());
        gl.delete_shader(fragment.as_ref());
        gl.delete_program(Some(&program));
        if ok {
            Ok(())
        } else {
            Err(ProbeError::Allocation("shader"))
        }
    }

    fn unmasked_renderer(&self) -> Result<Option<String>, ProbeError> {
        let gl = self.throwaway_context()?;
        let extension = gl
            .get_extension("WEBGL_debug_renderer_info")
            .map_err(|e| ProbeError::Other(format!("{e:?}")))?;
        if extension.is_none() {
            return Ok(None);
        }
        gl.get_parameter(UNMASKED_RENDERER_WEBGL)
            .map(|v| v.as_string())
            .map_err(|e| ProbeError::Other(format!("{e:?}")))
    }
}
