// timers.rs — per-instance deadline table
//
// Each viewer owns one slot per kind of pending delay. Arming a slot
// replaces whatever was pending there; the host polls `Timers::take_due`
// from a single host timeout scheduled at `Timers::next_deadline`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Resume auto-rotation after the user lets go.
    AutoRotateResume,
    /// Rebuild on the software backend after a context loss.
    ContextLossFallback,
    /// Collapse the expanded notice.
    NoticeDismiss,
    /// Re-layout once the browser has settled after leaving fullscreen.
    FullscreenSettle,
}

const KINDS: [TimerKind; 4] = [
    TimerKind::AutoRotateResume,
    TimerKind::ContextLossFallback,
    TimerKind::NoticeDismiss,
    TimerKind::FullscreenSettle,
];

#[derive(Debug, Default, Clone)]
pub struct Timers {
    deadlines: [Option<Duration>; 4],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `kind` at `now + delay`, cancelling any pending deadline of the
    /// same kind.
    pub fn arm(&mut self, kind: TimerKind, now: Duration, delay: Duration) {
        self.deadlines[slot(kind)] = Some(now + delay);
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[slot(kind)] = None;
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines[slot(kind)].is_some()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Duration) -> Vec<TimerKind> {
        let mut due: Vec<(Duration, TimerKind)> = KINDS
            .iter()
            .filter_map(|&kind| match self.deadlines[slot(kind)] {
                Some(at) if at <= now => Some((at, kind)),
                _ => None,
            })
            .collect();
        due.sort_by_key(|(at, _)| *at);
        for (_, kind) in &due {
            self.cancel(*kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }

    pub fn clear(&mut self) {
        self.deadlines = [None; 4];
    }
}

fn slot(kind: TimerKind) -> usize {
    match kind {
        TimerKind::AutoRotateResume => 0,
        TimerKind::ContextLossFallback => 1,
        TimerKind::NoticeDismiss => 2,
        TimerKind::FullscreenSettle => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn rearming_replaces_the_pending_deadline() {
        let mut t = Timers::new();
        t.arm(TimerKind::AutoRotateResume, ms(0), ms(3000));
        t.arm(TimerKind::AutoRotateResume, ms(2000), ms(3000));
        assert!(t.take_due(ms(3500)).is_empty());
        assert_eq!(t.take_due(ms(5000)), vec![TimerKind::AutoRotateResume]);
        assert!(!t.is_armed(TimerKind::AutoRotateResume));
    }

    #[test]
    fn due_timers_come_out_in_deadline_order() {
        let mut t = Timers::new();
        t.arm(TimerKind::NoticeDismiss, ms(0), ms(900));
        t.arm(TimerKind::FullscreenSettle, ms(0), ms(100));
        assert_eq!(t.next_deadline(), Some(ms(100)));
        assert_eq!(
            t.take_due(ms(1000)),
            vec![TimerKind::FullscreenSettle, TimerKind::NoticeDismiss]
        );
        assert_eq!(t.next_deadline(), None);
    }

    #[test]
    fn clear_drops_everything() {
        let mut t = Timers::new();
        t.arm(TimerKind::ContextLossFallback, ms(0), ms(1));
        t.clear();
        assert!(t.take_due(ms(10)).is_empty());
    }
}
