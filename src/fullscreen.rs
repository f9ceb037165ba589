// fullscreen.rs — fullscreen state machine for one viewer
//
// Entering moves the container into a full-viewport overlay (pseudo
// fullscreen) and, on desktop, also asks the browser for native fullscreen.
// Touch devices only get the overlay: they never call a native API and
// ignore change events and the Escape key.
//
// Vendor differences are resolved once by `detect_api`; everything else
// is written against the normalized `FullscreenApi`.

use crate::device::DeviceInfo;
use crate::error::HostError;

/// Viewport meta content used when no native fullscreen is available.
pub const LOCKED_VIEWPORT: &str = "width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no";

/// Method, event and property names of one vendor's fullscreen API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullscreenApi {
    pub request: &'static str,
    pub exit: &'static str,
    pub change_event: &'static str,
    pub element: &'static str,
}

pub const STANDARD: FullscreenApi = FullscreenApi {
    request: "requestFullscreen",
    exit: "exitFullscreen",
    change_event: "fullscreenchange",
    element: "fullscreenElement",
};

pub const WEBKIT: FullscreenApi = FullscreenApi {
    request: "webkitRequestFullscreen",
    exit: "webkitExitFullscreen",
    change_event: "webkitfullscreenchange",
    element: "webkitFullscreenElement",
};

pub const MOZ: FullscreenApi = FullscreenApi {
    request: "mozRequestFullScreen",
    exit: "mozCancelFullScreen",
    change_event: "mozfullscreenchange",
    element: "mozFullScreenElement",
};

pub const MS: FullscreenApi = FullscreenApi {
    request: "msRequestFullscreen",
    exit: "msExitFullscreen",
    change_event: "MSFullscreenChange",
    element: "msFullscreenElement",
};

pub const ALL_APIS: [FullscreenApi; 4] = [STANDARD, WEBKIT, MOZ, MS];

/// Preference order: WebKit first on macOS, where it is the more reliable
/// of the two; elsewhere the standard API, then the prefixed ones.
pub fn vendor_order(mac: bool) -> &'static [FullscreenApi] {
    const MAC: [FullscreenApi; 2] = [WEBKIT, STANDARD];
    if mac {
        &MAC
    } else {
        &ALL_APIS
    }
}

pub fn detect_api(mac: bool, has_method: impl Fn(&str) -> bool) -> Option<FullscreenApi> {
    vendor_order(mac).iter().copied().find(|api| has_method(api.request))
}

/// The inline style properties fullscreen overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStyle {
    pub position: String,
    pub top: String,
    pub left: String,
    pub width: String,
    pub height: String,
    pub z_index: String,
    pub background_color: String,
    pub padding_top: String,
    pub max_width: String,
    pub max_height: String,
}

impl ContainerStyle {
    /// `self` with the overrides that fill the overlay.
    pub fn fullscreen(&self) -> Self {
        Self {
            position: "relative".into(),
            width: "100vw".into(),
            height: "100vh".into(),
            padding_top: "0".into(),
            max_width: "none".into(),
            max_height: "none".into(),
            background_color: "#000".into(),
            ..self.clone()
        }
    }
}

/// DOM side effects of the coordinator. Implemented by the host.
pub trait FullscreenHost {
    /// Best effort; failures are the host's to log.
    fn lock_landscape(&mut self);

    fn unlock_orientation(&mut self);

    fn container_style(&self) -> ContainerStyle;

    fn set_container_style(&mut self, style: &ContainerStyle);

    /// Move the container into a new full-viewport overlay, remembering its
    /// parent and next sibling.
    fn mount_overlay(&mut self) -> Result<(), HostError>;

    fn unmount_overlay(&mut self);

    /// Ask for native fullscreen. An asynchronous refusal is reported later
    /// through [`FullscreenCoordinator::native_request_failed`].
    fn request_native(&mut self, api: &FullscreenApi) -> Result<(), HostError>;

    fn exit_native(&mut self, api: &FullscreenApi);

    fn native_active(&self) -> bool;

    fn viewport_meta(&self) -> Option<String>;

    fn set_viewport_meta(&mut self, content: &str);

    /// Nudge iOS Safari into hiding its address bar.
    fn hide_address_bar(&mut self);

    fn set_scroll_locked(&mut self, locked: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenState {
    Inline,
    Fullscreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Native {
    Off,
    Requested,
    Active,
}

#[derive(Debug, Clone)]
pub struct FullscreenCoordinator {
    mobile: bool,
    ios: bool,
    api: Option<FullscreenApi>,
    state: FullscreenState,
    saved_style: Option<ContainerStyle>,
    saved_viewport: Option<String>,
    native: Native,
}

impl FullscreenCoordinator {
    pub fn new(device: &DeviceInfo, api: Option<FullscreenApi>) -> Self {
        let agent = device.user_agent.to_lowercase();
        Self {
            mobile: device.is_mobile,
            ios: ["iphone", "ipad", "ipod"].iter().any(|m| agent.contains(m)),
            api: if device.is_mobile { None } else { api },
            state: FullscreenState::Inline,
            saved_style: None,
            saved_viewport: None,
            native: Native::Off,
        }
    }

    pub fn state(&self) -> FullscreenState {
        self.state
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state == FullscreenState::Fullscreen
    }

    pub fn native_enabled(&self) -> bool {
        !self.mobile
    }

    pub fn api(&self) -> Option<&FullscreenApi> {
        self.api.as_ref()
    }

    /// Enter fullscreen. Returns whether the state changed.
    pub fn enter(&mut self, host: &mut dyn FullscreenHost) -> Result<bool, HostError> {
        if self.is_fullscreen() {
            return Ok(false);
        }

        host.lock_landscape();
        let original = host.container_style();
        host.set_container_style(&original.fullscreen());
        if let Err(e) = host.mount_overlay() {
            host.set_container_style(&original);
            host.unlock_orientation();
            return Err(e);
        }
        self.saved_style = Some(original);

        match self.api {
            Some(api) => match host.request_native(&api) {
                Ok(()) => self.native = Native::Requested,
                Err(e) => {
                    log::debug!("native fullscreen refused: {e}");
                    self.apply_viewport_fallback(host);
                }
            },
            None => self.apply_viewport_fallback(host),
        }

        host.set_scroll_locked(true);
        self.state = FullscreenState::Fullscreen;
        log::debug!("entered fullscreen (native: {:?})", self.native);
        Ok(true)
    }

    /// Leave fullscreen, undoing every step of [`FullscreenCoordinator::enter`].
    /// Returns whether the state changed; the caller re-lays out after a short
    /// settle delay.
    pub fn exit(&mut self, host: &mut dyn FullscreenHost) -> bool {
        self.restore(host, true)
    }

    pub fn toggle(&mut self, host: &mut dyn FullscreenHost) -> Result<bool, HostError> {
        if self.is_fullscreen() {
            Ok(self.exit(host))
        } else {
            self.enter(host)
        }
    }

    /// Reconcile a native fullscreen change event. Returns true if the
    /// browser left fullscreen on its own and the overlay was torn down.
    pub fn on_native_change(&mut self, host: &mut dyn FullscreenHost) -> bool {
        if self.mobile || !self.is_fullscreen() {
            return false;
        }
        match (self.native, host.native_active()) {
            (Native::Requested, true) => {
                self.native = Native::Active;
                false
            }
            (Native::Active, false) => {
                log::debug!("native fullscreen ended externally");
                self.restore(host, false)
            }
            _ => false,
        }
    }

    /// Escape key. Returns true if it ended fullscreen.
    pub fn on_escape(&mut self, host: &mut dyn FullscreenHost) -> bool {
        if self.mobile || !self.is_fullscreen() {
            return false;
        }
        self.exit(host)
    }

    pub fn native_request_failed(&mut self, host: &mut dyn FullscreenHost) {
        if self.is_fullscreen() && self.native == Native::Requested {
            self.native = Native::Off;
            self.apply_viewport_fallback(host);
        }
    }

    fn apply_viewport_fallback(&mut self, host: &mut dyn FullscreenHost) {
        if let Some(content) = host.viewport_meta() {
            host.set_viewport_meta(LOCKED_VIEWPORT);
            self.saved_viewport = Some(content);
        }
        if self.ios {
            host.hide_address_bar();
        }
    }

    fn restore(&mut self, host: &mut dyn FullscreenHost, exit_native: bool) -> bool {
        if !self.is_fullscreen() {
            return false;
        }

        host.unlock_orientation();
        if let Some(content) = self.saved_viewport.take() {
            host.set_viewport_meta(&content);
        }
        host.set_scroll_locked(false);
        if let Some(style) = self.saved_style.take() {
            host.set_container_style(&style);
        }
        host.unmount_overlay();

        if exit_native && self.native != Native::Off && host.native_active() {
            if let Some(api) = self.api {
                host.exit_native(&api);
            }
        }
        self.native = Native::Off;
        self.state = FullscreenState::Inline;
        log::debug!("left fullscreen");
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records host calls in order.
    #[derive(Default)]
    pub(crate) struct FakeFullscreenHost {
        pub calls: Vec<String>,
        pub style: ContainerStyle,
        pub viewport: Option<String>,
        pub native: bool,
        pub refuse_native: bool,
        pub refuse_overlay: bool,
        pub mounted: bool,
    }

    impl FullscreenHost for FakeFullscreenHost {
        fn lock_landscape(&mut self) {
            self.calls.push("lock".into());
        }

        fn unlock_orientation(&mut self) {
            self.calls.push("unlock".into());
        }

        fn container_style(&self) -> ContainerStyle {
            self.style.clone()
        }

        fn set_container_style(&mut self, style: &ContainerStyle) {
            self.style = style.clone();
        }

        fn mount_overlay(&mut self) -> Result<(), HostError> {
            if self.refuse_overlay {
                return Err(HostError::Unavailable("document.body"));
            }
            self.mounted = true;
            self.calls.push("mount".into());
            Ok(())
        }

        fn unmount_overlay(&mut self) {
            self.mounted = false;
            self.calls.push("unmount".into());
        }

        fn request_native(&mut self, api: &FullscreenApi) -> Result<(), HostError> {
            self.calls.push(format!("request:{}", api.request));
            if self.refuse_native {
                return Err(HostError::Js("denied".into()));
            }
            self.native = true;
            Ok(())
        }

        fn exit_native(&mut self, api: &FullscreenApi) {
            self.calls.push(format!("exit:{}", api.exit));
            self.native = false;
        }

        fn native_active(&self) -> bool {
            self.native
        }

        fn viewport_meta(&self) -> Option<String> {
            self.viewport.clone()
        }

        fn set_viewport_meta(&mut self, content: &str) {
            self.viewport = Some(content.to_string());
        }

        fn hide_address_bar(&mut self) {
            self.calls.push("hide-bar".into());
        }

        fn set_scroll_locked(&mut self, locked: bool) {
            self.calls.push(format!("scroll-locked:{locked}"));
        }
    }

    fn device(mobile: bool, agent: &str) -> DeviceInfo {
        DeviceInfo {
            is_mobile: mobile,
            is_desktop_os: false,
            gpu_api_supported: true,
            hardware_acceleration_enabled: true,
            user_agent: agent.into(),
            device_pixel_ratio: 1.0,
        }
    }

    fn styled_host() -> FakeFullscreenHost {
        FakeFullscreenHost {
            style: ContainerStyle {
                width: "640px".into(),
                padding_top: "56.25%".into(),
                ..ContainerStyle::default()
            },
            viewport: Some("width=device-width".into()),
            ..FakeFullscreenHost::default()
        }
    }

    #[test]
    fn mac_prefers_webkit() {
        assert_eq!(detect_api(true, |_| true), Some(WEBKIT));
        assert_eq!(detect_api(false, |_| true), Some(STANDARD));
        assert_eq!(detect_api(false, |m| m == MS.request), Some(MS));
        assert_eq!(detect_api(true, |m| m == MOZ.request), None);
    }

    #[test]
    fn enter_then_exit_restores_everything() {
        let mut host = styled_host();
        let original = host.style.clone();
        let mut fs = FullscreenCoordinator::new(&device(false, "Windows"), Some(STANDARD));

        assert!(fs.enter(&mut host).unwrap());
        assert!(host.mounted);
        assert_eq!(host.style.width, "100vw");
        assert!(!fs.on_native_change(&mut host));

        assert!(fs.exit(&mut host));
        assert_eq!(host.style, original);
        assert!(!host.mounted);
        assert!(!host.native);
        assert_eq!(host.viewport.as_deref(), Some("width=device-width"));
        assert!(host.calls.contains(&"exit:exitFullscreen".to_string()));
        assert!(!fs.exit(&mut host));
    }

    #[test]
    fn refused_native_uses_viewport_fallback() {
        let mut host = FakeFullscreenHost {
            refuse_native: true,
            ..styled_host()
        };
        let mut fs = FullscreenCoordinator::new(&device(false, "Windows"), Some(STANDARD));
        fs.enter(&mut host).unwrap();
        assert_eq!(host.viewport.as_deref(), Some(LOCKED_VIEWPORT));
        fs.exit(&mut host);
        assert_eq!(host.viewport.as_deref(), Some("width=device-width"));
        assert!(!host.calls.iter().any(|c| c.starts_with("exit:")));
    }

    #[test]
    fn mobile_gets_overlay_only() {
        let mut host = styled_host();
        let mut fs = FullscreenCoordinator::new(&device(true, "iPhone"), Some(STANDARD));
        fs.enter(&mut host).unwrap();
        assert!(!host.calls.iter().any(|c| c.starts_with("request:")));
        assert!(host.calls.contains(&"hide-bar".to_string()));
        assert!(!fs.on_escape(&mut host));
        assert!(fs.is_fullscreen());
    }

    #[test]
    fn external_native_exit_is_reconciled_without_calling_exit() {
        let mut host = styled_host();
        let mut fs = FullscreenCoordinator::new(&device(false, "Windows"), Some(STANDARD));
        fs.enter(&mut host).unwrap();
        fs.on_native_change(&mut host);
        host.native = false;
        assert!(fs.on_native_change(&mut host));
        assert!(!fs.is_fullscreen());
        assert!(!host.mounted);
        assert!(!host.calls.iter().any(|c| c.starts_with("exit:")));
    }

    #[test]
    fn escape_only_acts_while_fullscreen() {
        let mut host = styled_host();
        let mut fs = FullscreenCoordinator::new(&device(false, "Windows"), None);
        assert!(!fs.on_escape(&mut host));
        fs.enter(&mut host).unwrap();
        assert!(fs.on_escape(&mut host));
    }

    #[test]
    fn failed_overlay_undoes_partial_enter() {
        let mut host = FakeFullscreenHost {
            refuse_overlay: true,
            ..styled_host()
        };
        let original = host.style.clone();
        let mut fs = FullscreenCoordinator::new(&device(false, "Windows"), Some(STANDARD));
        assert!(fs.enter(&mut host).is_err());
        assert_eq!(host.style, original);
        assert!(!fs.is_fullscreen());
    }
}
