//! Obstacle signal - the one primitive shared by the guidance loop and the monitor
//!
//! Latch semantics: the monitor raises, the orchestrator clears. Raising an
//! already-raised signal changes nothing, so detections never queue up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ObstacleSignal {
    raised: Arc<AtomicBool>,
}

impl ObstacleSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch; returns true only on the transition from clear to raised
    pub fn raise(&self) -> bool {
        !self.raised.swap(true, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Reset the latch; returns true if it was raised
    pub fn clear(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_is_idempotent() {
        let signal = ObstacleSignal::new();
        assert!(!signal.is_raised());
        assert!(signal.raise());
        assert!(!signal.raise());
        assert!(!signal.raise());
        assert!(signal.is_raised());

        // A single clear undoes any number of raises
        assert!(signal.clear());
        assert!(!signal.is_raised());
        assert!(!signal.clear());
    }

    #[test]
    fn test_clones_share_state() {
        let monitor_side = ObstacleSignal::new();
        let guidance_side = monitor_side.clone();
        monitor_side.raise();
        assert!(guidance_side.is_raised());
        guidance_side.clear();
        assert!(!monitor_side.is_raised());
    }

    #[test]
    fn test_concurrent_raises_transition_once() {
        let signal = ObstacleSignal::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let signal = signal.clone();
                std::thread::spawn(move || signal.raise())
            })
            .collect();
        let transitions = handles.into_iter().filter_map(|h| h.join().ok()).filter(|r| *r).count();
        assert_eq!(transitions, 1);
    }
}
