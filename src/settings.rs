// settings.rs — tunables for every viewer on the page

use serde::Deserialize;

/// Page-wide viewer settings. Every field has a default, so a partial JSON
/// document only overrides what it names.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerSettings {
    /// Maximum number of simultaneously animating viewers.
    pub max_active_viewers: usize,
    /// Fraction of the container that must be on screen to count as visible.
    pub visibility_threshold: f64,
    pub pointer_sensitivity: f32,
    pub touch_sensitivity: f32,
    /// Auto-rotation speed in degrees per second.
    pub auto_rotate_speed: f32,
    pub auto_rotate_resume_ms: u64,
    pub context_loss_fallback_ms: u64,
    pub notice_dismiss_ms: u64,
    pub fullscreen_settle_ms: u64,
    pub initial_lon: f32,
    pub initial_lat: f32,
    pub initial_fov: f32,
    pub zoom_step: f32,
    pub min_fov: f32,
    pub max_fov: f32,
    pub lat_limit: f32,
    /// Touch devices at or below this viewport width count as mobile.
    pub mobile_max_width: f64,
    /// Entering the viewport re-admits a viewer; leaving it frees the slot.
    pub admission_follows_visibility: bool,
    /// Verbose logging, including failed GPU presets.
    pub diagnostics: bool,
    /// Notice language; `None` follows the browser locale.
    pub language: Option<String>,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            max_active_viewers: 3,
            visibility_threshold: 0.1,
            pointer_sensitivity: 0.1,
            touch_sensitivity: 0.15,
            auto_rotate_speed: 3.0,
            auto_rotate_resume_ms: 3000,
            context_loss_fallback_ms: 1000,
            notice_dismiss_ms: 10_000,
            fullscreen_settle_ms: 100,
            initial_lon: 90.0,
            initial_lat: 0.0,
            initial_fov: 75.0,
            zoom_step: 10.0,
            min_fov: 30.0,
            max_fov: 90.0,
            lat_limit: 85.0,
            mobile_max_width: 768.0,
            admission_follows_visibility: true,
            diagnostics: false,
            language: None,
        }
    }
}

impl ViewerSettings {
    /// Parse settings from JSON, keeping defaults for absent fields.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(text)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Same as [`ViewerSettings::from_json`] but never fails: a malformed
    /// document is logged and replaced by the defaults.
    pub fn from_json_or_default(text: &str) -> Self {
        Self::from_json(text).unwrap_or_else(|e| {
            log::warn!("ignoring malformed viewer settings: {e}");
            Self::default()
        })
    }

    fn sanitize(&mut self) {
        self.max_active_viewers = self.max_active_viewers.max(1);
        self.visibility_threshold = self.visibility_threshold.clamp(0.0, 1.0);
        self.lat_limit = self.lat_limit.clamp(0.0, 89.9);
        if self.min_fov > self.max_fov {
            std::mem::swap(&mut self.min_fov, &mut self.max_fov);
        }
        self.initial_fov = self.initial_fov.clamp(self.min_fov, self.max_fov);
        self.initial_lat = self.initial_lat.clamp(-self.lat_limit, self.lat_limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_widget_constants() {
        let s = ViewerSettings::default();
        assert_eq!(s.max_active_viewers, 3);
        assert_eq!(s.pointer_sensitivity, 0.1);
        assert_eq!(s.touch_sensitivity, 0.15);
        assert_eq!((s.min_fov, s.max_fov), (30.0, 90.0));
        assert_eq!(s.auto_rotate_resume_ms, 3000);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s = ViewerSettings::from_json(r#"{"maxActiveViewers": 5, "diagnostics": true}"#).unwrap();
        assert_eq!(s.max_active_viewers, 5);
        assert!(s.diagnostics);
        assert_eq!(s.initial_fov, 75.0);
    }

    #[test]
    fn sanitize_repairs_inverted_bounds() {
        let s = ViewerSettings::from_json(r#"{"minFov": 100, "maxFov": 20, "maxActiveViewers": 0}"#)
            .unwrap();
        assert_eq!((s.min_fov, s.max_fov), (20.0, 100.0));
        assert_eq!(s.max_active_viewers, 1);
    }

    #[test]
    fn malformed_json_falls_back() {
        assert_eq!(ViewerSettings::from_json_or_default("{nope"), ViewerSettings::default());
    }
}
