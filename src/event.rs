//! Threshold-armed wake events.
//!
//! A waiter that needs "at least `n` bytes readable" (or writable) arms the
//! event with its threshold, then polls for the signal. The ISR reports the
//! buffer level after every mutation; once the level crosses the armed
//! threshold the signal latches. Arming always clears any stale signal
//! first, and waiters disarm on exit, so a threshold left over from an
//! earlier wait can never wake a later one.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Single-slot wake channel between one waiter and one ISR.
///
/// A threshold of zero means "disarmed".
pub struct ThresholdEvent {
    threshold: AtomicUsize,
    signaled: AtomicBool,
}

impl ThresholdEvent {
    pub const fn new() -> Self {
        ThresholdEvent {
            threshold: AtomicUsize::new(0),
            signaled: AtomicBool::new(false),
        }
    }

    /// Arm the event to fire once the reported level reaches `threshold`.
    ///
    /// Thresholds are clamped to at least 1; the signal is reset so a stale
    /// wake from a previous arming cannot satisfy this one.
    pub fn arm(&self, threshold: usize) {
        self.signaled.store(false, Ordering::Release);
        self.threshold.store(threshold.max(1), Ordering::Release);
    }

    /// Drop the armed threshold and any pending signal.
    pub fn disarm(&self) {
        self.threshold.store(0, Ordering::Release);
        self.signaled.store(false, Ordering::Release);
    }

    /// ISR side: report the current buffer level.
    pub fn notify(&self, level: usize) {
        let threshold = self.threshold.load(Ordering::Acquire);
        if threshold != 0 && level >= threshold {
            self.threshold.store(0, Ordering::Release);
            self.signaled.store(true, Ordering::Release);
        }
    }

    /// Waiter side: has the armed threshold been crossed?
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_threshold() {
        let ev = ThresholdEvent::new();
        ev.arm(3);

        ev.notify(1);
        assert!(!ev.is_signaled());
        ev.notify(2);
        assert!(!ev.is_signaled());
        ev.notify(3);
        assert!(ev.is_signaled());
    }

    #[test]
    fn unarmed_event_ignores_notifications() {
        let ev = ThresholdEvent::new();
        ev.notify(100);
        assert!(!ev.is_signaled());
    }

    #[test]
    fn rearm_clears_stale_signal() {
        let ev = ThresholdEvent::new();
        ev.arm(1);
        ev.notify(1);
        assert!(ev.is_signaled());

        // A new waiter arming with a higher threshold must not see the old
        // waiter's signal.
        ev.arm(5);
        assert!(!ev.is_signaled());
        ev.notify(4);
        assert!(!ev.is_signaled());
        ev.notify(5);
        assert!(ev.is_signaled());
    }

    #[test]
    fn disarm_drops_threshold_and_signal() {
        let ev = ThresholdEvent::new();
        ev.arm(2);
        ev.notify(2);
        ev.disarm();
        assert!(!ev.is_signaled());

        // Disarmed: further notifications do nothing.
        ev.notify(10);
        assert!(!ev.is_signaled());
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let ev = ThresholdEvent::new();
        ev.arm(0);
        ev.notify(0);
        assert!(!ev.is_signaled());
        ev.notify(1);
        assert!(ev.is_signaled());
    }
}
