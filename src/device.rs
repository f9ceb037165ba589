// device.rs — device-class and graphics capability detection
//
// Detection runs once per process: `device_info` memoizes the first
// result and every later caller gets the same `DeviceInfo`, whatever probe
// it passes in.

use once_cell::sync::OnceCell;

use crate::error::ProbeError;

const MOBILE_AGENT_MARKERS: &[&str] = &[
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

const MAC_AGENT_MARKERS: &[&str] = &["mac", "macintosh", "macintel", "macppc", "mac68k"];

/// Viewport width at or below which a touch device counts as mobile.
pub const MOBILE_MAX_VIEWPORT_WIDTH: f64 = 768.0;

/// Raw capability queries against the hosting platform.
pub trait DeviceProbe {
    fn user_agent(&self) -> String;

    /// Touch events or touch points are available.
    fn has_touch(&self) -> bool;

    /// Layout viewport width in CSS pixels.
    fn viewport_width(&self) -> f64;

    fn device_pixel_ratio(&self) -> f64;

    /// Acquire a throwaway graphics context and allocate a program and a
    /// shader pair in it.
    fn probe_gpu_api(&self) -> Result<(), ProbeError>;

    /// Unmasked renderer string of a throwaway graphics context.
    /// `Ok(None)` means the diagnostic extension is missing.
    fn unmasked_renderer(&self) -> Result<Option<String>, ProbeError>;
}

/// What the page runs on. Immutable once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub is_mobile: bool,
    /// macOS-family user agent; selects the WebKit-first fullscreen order and
    /// the higher pixel-ratio cap.
    pub is_desktop_os: bool,
    pub gpu_api_supported: bool,
    pub hardware_acceleration_enabled: bool,
    pub user_agent: String,
    pub device_pixel_ratio: f64,
}

impl DeviceInfo {
    /// Run every probe. Never fails; a failing probe reads as "unsupported".
    pub fn detect(probe: &dyn DeviceProbe) -> Self {
        Self::detect_with_width(probe, MOBILE_MAX_VIEWPORT_WIDTH)
    }

    pub fn detect_with_width(probe: &dyn DeviceProbe, mobile_max_width: f64) -> Self {
        let user_agent = probe.user_agent();
        let is_mobile = is_mobile(
            probe.has_touch(),
            &user_agent,
            probe.viewport_width(),
            mobile_max_width,
        );
        let gpu_api_supported = match probe.probe_gpu_api() {
            Ok(()) => true,
            Err(e) => {
                log::debug!("graphics API not supported: {e}");
                false
            }
        };
        let hardware_acceleration_enabled = hardware_accelerated(probe.unmasked_renderer());

        let info = Self {
            is_mobile,
            is_desktop_os: contains_any(&user_agent, MAC_AGENT_MARKERS),
            gpu_api_supported,
            hardware_acceleration_enabled,
            user_agent,
            device_pixel_ratio: probe.device_pixel_ratio(),
        };
        log::debug!("device info detected: {info:?}");
        info
    }
}

static DEVICE_INFO: OnceCell<DeviceInfo> = OnceCell::new();

/// Process-wide device info, computed on the first call only.
pub fn device_info(probe: &dyn DeviceProbe) -> &'static DeviceInfo {
    DEVICE_INFO.get_or_init(|| DeviceInfo::detect(probe))
}

/// Like [`device_info`], honouring a custom mobile width on first use.
pub fn device_info_with_width(probe: &dyn DeviceProbe, mobile_max_width: f64) -> &'static DeviceInfo {
    DEVICE_INFO.get_or_init(|| DeviceInfo::detect_with_width(probe, mobile_max_width))
}

/// Mobile = touch AND (mobile user agent OR narrow viewport).
pub fn is_mobile(has_touch: bool, user_agent: &str, viewport_width: f64, max_width: f64) -> bool {
    has_touch && (contains_any(user_agent, MOBILE_AGENT_MARKERS) || viewport_width <= max_width)
}

/// A missing diagnostic extension is optimistically "accelerated"; a failed
/// probe is not.
fn hardware_accelerated(renderer: Result<Option<String>, ProbeError>) -> bool {
    match renderer {
        Ok(Some(name)) => !name.to_lowercase().contains("software"),
        Ok(None) => true,
        Err(e) => {
            log::debug!("hardware acceleration probe failed: {e}");
            false
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct FakeProbe {
        pub agent: &'static str,
        pub touch: bool,
        pub width: f64,
        pub gpu: bool,
        pub renderer: Result<Option<&'static str>, ()>,
    }

    impl FakeProbe {
        pub(crate) fn desktop() -> Self {
            Self {
                agent: "Mozilla/5.0 (X11; Linux x86_64) Chrome/120",
                touch: false,
                width: 1440.0,
                gpu: true,
                renderer: Ok(Some("ANGLE (NVIDIA GeForce)")),
            }
        }

        pub(crate) fn phone() -> Self {
            Self {
                agent: "Mozilla/5.0 (Linux; Android 14) Mobile",
                touch: true,
                width: 412.0,
                gpu: true,
                renderer: Ok(Some("Adreno 740")),
            }
        }
    }

    impl DeviceProbe for FakeProbe {
        fn user_agent(&self) -> String {
            self.agent.to_string()
        }

        fn has_touch(&self) -> bool {
            self.touch
        }

        fn viewport_width(&self) -> f64 {
            self.width
        }

        fn device_pixel_ratio(&self) -> f64 {
            2.0
        }

        fn probe_gpu_api(&self) -> Result<(), ProbeError> {
            if self.gpu {
                Ok(())
            } else {
                Err(ProbeError::NoContext)
            }
        }

        fn unmasked_renderer(&self) -> Result<Option<String>, ProbeError> {
            self.renderer
                .map(|r| r.map(str::to_string))
                .map_err(|()| ProbeError::NoContext)
        }
    }

    #[test]
    fn touch_laptop_with_wide_viewport_is_not_mobile() {
        assert!(!is_mobile(true, "Mozilla/5.0 (Windows NT 10.0)", 1920.0, 768.0));
    }

    #[test]
    fn narrow_touch_viewport_is_mobile_even_with_desktop_agent() {
        assert!(is_mobile(true, "Mozilla/5.0 (Windows NT 10.0)", 768.0, 768.0));
        assert!(!is_mobile(false, "iPhone", 320.0, 768.0));
    }

    #[test]
    fn software_renderer_string_disables_acceleration() {
        assert!(!hardware_accelerated(Ok(Some("Google SwiftShader Software".into()))));
        assert!(hardware_accelerated(Ok(None)));
        assert!(!hardware_accelerated(Err(ProbeError::NoContext)));
    }

    #[test]
    fn failed_gpu_probe_reads_as_unsupported() {
        let probe = FakeProbe { gpu: false, ..FakeProbe::desktop() };
        let info = DeviceInfo::detect(&probe);
        assert!(!info.gpu_api_supported);
        assert!(!info.is_mobile);
    }

    #[test]
    fn mac_agent_sets_desktop_os() {
        let probe = FakeProbe {
            agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2)",
            ..FakeProbe::desktop()
        };
        assert!(DeviceInfo::detect(&probe).is_desktop_os);
    }

    #[test]
    fn device_info_is_computed_once() {
        let first = device_info(&FakeProbe::desktop());
        let second = device_info(&FakeProbe::phone());
        assert!(std::ptr::eq(first, second));
    }
}
