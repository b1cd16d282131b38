//! # Timeout Supervisor
//!
//! Single deadline for the one request in flight. Every arm or disarm bumps
//! a generation counter; a firing carries the generation it was armed with,
//! so a timer that raced a response or a cancel is recognized as stale.

use tokio::time::{Duration, Instant};
use tracing::trace;

/// Generation tag of an armed deadline
pub type TimerGeneration = u64;

#[derive(Debug, Default)]
pub struct TimeoutSupervisor {
    generation: TimerGeneration,
    deadline: Option<Instant>,
}

impl TimeoutSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the deadline `after` from now
    pub fn arm(&mut self, after: Duration) -> TimerGeneration {
        self.generation += 1;
        self.deadline = Some(Instant::now() + after);
        trace!(generation = self.generation, ?after, "timeout armed");
        self.generation
    }

    pub fn disarm(&mut self) {
        if self.deadline.take().is_some() {
            self.generation += 1;
            trace!(generation = self.generation, "timeout disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Generation of the current deadline, if armed
    pub fn armed_generation(&self) -> Option<TimerGeneration> {
        self.deadline.map(|_| self.generation)
    }

    /// Consume a firing
    ///
    /// Returns true, and disarms, only if `generation` is the armed one.
    pub fn fire(&mut self, generation: TimerGeneration) -> bool {
        if self.deadline.is_some() && generation == self.generation {
            self.deadline = None;
            true
        } else {
            trace!(generation, current = self.generation, "stale timeout ignored");
            false
        }
    }

    /// Whether the armed deadline is at or before `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_disarmed() {
        let supervisor = TimeoutSupervisor::new();
        assert!(!supervisor.is_armed());
        assert!(supervisor.deadline().is_none());
        assert!(supervisor.armed_generation().is_none());
    }

    #[test]
    fn test_fire_current_generation() {
        let mut supervisor = TimeoutSupervisor::new();
        let generation = supervisor.arm(Duration::from_millis(500));
        assert!(supervisor.is_armed());
        assert!(supervisor.fire(generation));
        assert!(!supervisor.is_armed());
        // Only once
        assert!(!supervisor.fire(generation));
    }

    #[test]
    fn test_rearm_makes_old_generation_stale() {
        let mut supervisor = TimeoutSupervisor::new();
        let first = supervisor.arm(Duration::from_millis(500));
        let second = supervisor.arm(Duration::from_millis(500));
        assert_ne!(first, second);
        assert!(!supervisor.fire(first));
        assert!(supervisor.is_armed());
        assert!(supervisor.fire(second));
    }

    #[test]
    fn test_disarm_makes_generation_stale() {
        let mut supervisor = TimeoutSupervisor::new();
        let generation = supervisor.arm(Duration::from_millis(500));
        supervisor.disarm();
        assert!(!supervisor.fire(generation));

        // Arming again never reuses the stale tag
        let next = supervisor.arm(Duration::from_millis(500));
        assert_ne!(next, generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_follows_clock() {
        let mut supervisor = TimeoutSupervisor::new();
        supervisor.arm(Duration::from_millis(500));

        assert!(!supervisor.is_expired(Instant::now()));
        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(!supervisor.is_expired(Instant::now()));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(supervisor.is_expired(Instant::now()));
    }
}
