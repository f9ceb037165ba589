// admission.rs — cap on simultaneously animating viewers
//
// Insertion-ordered: when full, registering evicts the earliest entry. The
// registry only reports the eviction; deactivating the evicted viewer is the
// caller's job and must not come back through `AdmissionRegistry::register`.

use std::collections::VecDeque;

/// Stable per-page identifier of a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(pub u32);

impl std::fmt::Display for ViewerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct AdmissionRegistry {
    capacity: usize,
    active: VecDeque<ViewerId>,
}

impl AdmissionRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            active: VecDeque::with_capacity(capacity),
        }
    }

    /// Admit `id`, returning the viewer evicted to make room.
    ///
    /// Registering an already admitted viewer keeps its original position and
    /// evicts nobody.
    pub fn register(&mut self, id: ViewerId) -> Option<ViewerId> {
        if self.contains(id) {
            return None;
        }
        let evicted = if self.active.len() >= self.capacity {
            self.active.pop_front()
        } else {
            None
        };
        self.active.push_back(id);
        if let Some(old) = evicted {
            log::debug!("{id} admitted, evicting {old}");
        }
        evicted
    }

    /// Remove `id` if present; returns whether it was.
    pub fn unregister(&mut self, id: ViewerId) -> bool {
        match self.active.iter().position(|&v| v == id) {
            Some(index) => {
                self.active.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ViewerId) -> bool {
        self.active.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admitted viewers, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = ViewerId> + '_ {
        self.active.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourth_registration_evicts_the_first() {
        let mut r = AdmissionRegistry::new(3);
        for i in 0..3 {
            assert_eq!(r.register(ViewerId(i)), None);
        }
        assert_eq!(r.register(ViewerId(3)), Some(ViewerId(0)));
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![ViewerId(1), ViewerId(2), ViewerId(3)]);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut r = AdmissionRegistry::new(3);
        for i in 0..50 {
            r.register(ViewerId(i % 7));
            assert!(r.len() <= 3);
        }
    }

    #[test]
    fn re_registering_is_a_no_op() {
        let mut r = AdmissionRegistry::new(2);
        r.register(ViewerId(1));
        r.register(ViewerId(2));
        assert_eq!(r.register(ViewerId(1)), None);
        assert_eq!(r.iter().next(), Some(ViewerId(1)));
    }

    #[test]
    fn unregister_absent_is_harmless() {
        let mut r = AdmissionRegistry::new(3);
        assert!(!r.unregister(ViewerId(9)));
        r.register(ViewerId(9));
        assert!(r.unregister(ViewerId(9)));
        assert!(r.is_empty());
    }
}
