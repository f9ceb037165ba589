// config.rs — GPU context configuration derived from the device class

use once_cell::sync::OnceCell;

use crate::device::DeviceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerPreference {
    LowPower,
    HighPerformance,
}

/// Process-wide renderer configuration, computed once from [`DeviceInfo`].
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub antialias: bool,
    pub preserve_drawing_buffer: bool,
    pub power_preference: PowerPreference,
    /// Device pixels per CSS pixel, clamped per device class.
    pub pixel_ratio: f32,
    pub fail_if_major_performance_caveat: bool,
}

impl RendererConfig {
    pub fn for_device(device: &DeviceInfo) -> Self {
        let dpr = device.device_pixel_ratio as f32;
        let mut config = Self {
            antialias: true,
            preserve_drawing_buffer: true,
            power_preference: PowerPreference::LowPower,
            pixel_ratio: 1.0,
            fail_if_major_performance_caveat: false,
        };

        if device.is_mobile {
            config.antialias = false;
            config.preserve_drawing_buffer = false;
            config.pixel_ratio = dpr.min(1.5);
        } else if device.hardware_acceleration_enabled {
            if device.is_desktop_os {
                config.power_preference = PowerPreference::HighPerformance;
                config.pixel_ratio = dpr.min(3.0);
            } else {
                config.pixel_ratio = dpr.min(2.0);
            }
        } else {
            // Software GPU rasterizers are allowed; keep the fill rate down.
            config.pixel_ratio = 1.0;
        }
        config.pixel_ratio = config.pixel_ratio.max(0.5);
        config
    }
}

static RENDERER_CONFIG: OnceCell<RendererConfig> = OnceCell::new();

/// Process-wide renderer configuration, computed on the first call only.
pub fn renderer_config(device: &DeviceInfo) -> &'static RendererConfig {
    RENDERER_CONFIG.get_or_init(|| {
        let config = RendererConfig::for_device(device);
        log::debug!("renderer config: {config:?}");
        config
    })
}

/// One GPU construction attempt. `None` leaves the option at the graphics
/// library's default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpuPreset {
    pub antialias: Option<bool>,
    pub preserve_drawing_buffer: Option<bool>,
    pub power_preference: Option<PowerPreference>,
    pub fail_if_major_performance_caveat: Option<bool>,
}

impl GpuPreset {
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            antialias: Some(config.antialias),
            preserve_drawing_buffer: Some(config.preserve_drawing_buffer),
            power_preference: Some(config.power_preference),
            fail_if_major_performance_caveat: Some(config.fail_if_major_performance_caveat),
        }
    }

    /// Attempts in order. Mobile browsers refuse some context options, so
    /// they walk down to library defaults; desktop gets one shot.
    pub fn ladder(config: &RendererConfig, mobile: bool) -> Vec<Self> {
        let full = Self::from_config(config);
        if !mobile {
            return vec![full];
        }
        vec![
            full,
            Self {
                antialias: Some(false),
                preserve_drawing_buffer: Some(false),
                ..Self::default()
            },
            Self {
                antialias: Some(false),
                ..Self::default()
            },
            Self::default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(mobile: bool, accelerated: bool, mac: bool, dpr: f64) -> DeviceInfo {
        DeviceInfo {
            is_mobile: mobile,
            is_desktop_os: mac,
            gpu_api_supported: true,
            hardware_acceleration_enabled: accelerated,
            user_agent: String::new(),
            device_pixel_ratio: dpr,
        }
    }

    #[test]
    fn pixel_ratio_is_clamped_per_device_class() {
        assert_eq!(RendererConfig::for_device(&device(true, true, false, 3.0)).pixel_ratio, 1.5);
        assert_eq!(RendererConfig::for_device(&device(false, true, false, 3.0)).pixel_ratio, 2.0);
        assert_eq!(RendererConfig::for_device(&device(false, true, true, 4.0)).pixel_ratio, 3.0);
        assert_eq!(RendererConfig::for_device(&device(false, false, true, 4.0)).pixel_ratio, 1.0);
    }

    #[test]
    fn mobile_config_turns_off_expensive_options() {
        let c = RendererConfig::for_device(&device(true, true, false, 2.0));
        assert!(!c.antialias);
        assert!(!c.preserve_drawing_buffer);
        assert_eq!(c.power_preference, PowerPreference::LowPower);
    }

    #[test]
    fn mac_desktop_prefers_high_performance() {
        let c = RendererConfig::for_device(&device(false, true, true, 2.0));
        assert_eq!(c.power_preference, PowerPreference::HighPerformance);
    }

    #[test]
    fn ladder_length_depends_on_device_class() {
        let c = RendererConfig::for_device(&device(true, true, false, 2.0));
        let mobile = GpuPreset::ladder(&c, true);
        assert_eq!(mobile.len(), 4);
        assert_eq!(mobile[0], GpuPreset::from_config(&c));
        assert_eq!(mobile[3], GpuPreset::default());
        assert_eq!(GpuPreset::ladder(&c, false).len(), 1);
    }
}
