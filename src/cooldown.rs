//! Duplicate suppression after an accepted scan
//!
//! The gate holds a single expiry deadline. Arming replaces the deadline, so
//! suppressions never stack, and the gate reads as disarmed once the deadline
//! passes. The expired deadline is dropped on the next `try_accept`. Deadlines use [`tokio::time::Instant`] so paused-clock tests can
//! drive them.

use std::time::Duration;
use tokio::time::Instant;

/// Single-slot cooldown gate
#[derive(Debug, Default)]
pub struct CooldownGate {
    expires_at: Option<Instant>,
}

impl CooldownGate {
    /// Create a disarmed gate
    pub fn new() -> Self {
        Self { expires_at: None }
    }

    /// Returns true only when the gate is not armed.
    ///
    /// The caller arms the gate after acting on an accepted detection.
    pub fn try_accept(&mut self) -> bool {
        if self.is_armed() {
            return false;
        }
        self.expires_at = None;
        true
    }

    /// Start a suppression window of `duration`, cancelling any pending one.
    pub fn arm(&mut self, duration: Duration) {
        if duration.is_zero() {
            self.expires_at = None;
            return;
        }
        if self.expires_at.is_some() {
            tracing::trace!("Replacing pending cooldown");
        }
        self.expires_at = Some(Instant::now() + duration);
    }

    /// Whether a suppression window is currently running
    pub fn is_armed(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Time left until the gate disarms
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }

    /// Drop the pending deadline. Only used when the owning session tears down.
    pub(crate) fn clear(&mut self) {
        self.expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn test_suppresses_until_duration_elapses() {
        let mut gate = CooldownGate::new();
        assert!(gate.try_accept());
        gate.arm(Duration::from_millis(3000));

        time::advance(Duration::from_millis(2999)).await;
        assert!(!gate.try_accept());

        time::advance(Duration::from_millis(2)).await;
        assert!(gate.try_accept());
        assert!(!gate.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_window() {
        let mut gate = CooldownGate::new();
        gate.arm(Duration::from_millis(1000));
        time::advance(Duration::from_millis(800)).await;

        gate.arm(Duration::from_millis(1000));
        time::advance(Duration::from_millis(500)).await;
        assert!(gate.is_armed());

        time::advance(Duration::from_millis(501)).await;
        assert!(!gate.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_rearm_does_not_stack() {
        let mut gate = CooldownGate::new();
        gate.arm(Duration::from_millis(5000));
        gate.arm(Duration::from_millis(100));
        time::advance(Duration::from_millis(101)).await;
        assert!(gate.try_accept());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_visible_through_shared_reference() {
        let mut gate = CooldownGate::new();
        gate.arm(Duration::from_millis(3000));
        let observer = &gate;
        assert!(observer.is_armed());

        time::advance(Duration::from_millis(3001)).await;
        let observer = &gate;
        assert!(!observer.is_armed());
        assert_eq!(observer.remaining(), None);
        assert!(gate.try_accept());
        assert!(gate.expires_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_never_arms() {
        let mut gate = CooldownGate::new();
        gate.arm(Duration::ZERO);
        assert!(gate.try_accept());
        assert_eq!(gate.remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let mut gate = CooldownGate::new();
        gate.arm(Duration::from_secs(3));
        time::advance(Duration::from_secs(1)).await;
        assert_eq!(gate.remaining(), Some(Duration::from_secs(2)));
        gate.clear();
        assert_eq!(gate.remaining(), None);
    }
}
