// visibility.rs — on-screen presence of one viewer's container

/// Tracks whether the container is visible enough to animate.
///
/// Starts out visible so a viewer that is never observed still animates.
#[derive(Debug, Clone)]
pub struct VisibilityScheduler {
    threshold: f64,
    visible: bool,
}

impl VisibilityScheduler {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
            visible: true,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Feed an observed intersection ratio. Returns the new visibility when
    /// it changed.
    pub fn observe(&mut self, is_intersecting: bool, ratio: f64) -> Option<bool> {
        let visible = is_intersecting && ratio >= self.threshold;
        if visible == self.visible {
            return None;
        }
        self.visible = visible;
        Some(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_threshold_crossings_are_reported() {
        let mut v = VisibilityScheduler::new(0.1);
        assert!(v.is_visible());
        assert_eq!(v.observe(true, 0.5), None);
        assert_eq!(v.observe(true, 0.05), Some(false));
        assert_eq!(v.observe(false, 0.0), None);
        assert_eq!(v.observe(true, 0.1), Some(true));
    }
}
