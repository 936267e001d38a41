//! # Run Lifecycle
//!
//! Phase machine for one benchmark run, driven purely by monotonic time:
//! idle until started, warmup when configured, then the measured window,
//! then cooldown while workers drain, complete once finalized.

use std::time::{Duration, Instant};

/// Phase of a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Warmup,
    Running,
    Cooldown,
    Complete,
}

/// Deadline clock owned by the orchestrator.
#[derive(Debug)]
pub struct Lifecycle {
    warmup: Duration,
    duration: Duration,
    /// Grace past the loop deadline before workers are given up on, two
    /// request timeouts so an in-flight request can finish or trip.
    grace: Duration,
    started: Option<Instant>,
    completed: bool,
}

impl Lifecycle {
    pub fn new(warmup: Duration, duration: Duration, request_timeout: Duration) -> Self {
        Lifecycle {
            warmup,
            duration,
            grace: request_timeout * 2,
            started: None,
            completed: false,
        }
    }

    /// Enters warmup (or directly the measured window when warmup is zero).
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        self.started = Some(now);
    }

    /// Marks the run finalized regardless of the clock.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub fn phase(&self) -> Phase {
        self.phase_at(Instant::now())
    }

    pub fn phase_at(&self, now: Instant) -> Phase {
        if self.completed {
            return Phase::Complete;
        }
        let started = match self.started {
            Some(started) => started,
            None => return Phase::Idle,
        };
        let elapsed = now.saturating_duration_since(started);
        if elapsed < self.warmup {
            Phase::Warmup
        } else if elapsed < self.warmup + self.duration {
            Phase::Running
        } else {
            Phase::Cooldown
        }
    }

    /// Fraction of the measured window already elapsed, in [0, 1].
    pub fn progress(&self) -> f64 {
        self.progress_at(Instant::now())
    }

    pub fn progress_at(&self, now: Instant) -> f64 {
        let started = match self.started {
            Some(started) => started,
            None => return 0.0,
        };
        let elapsed = now.saturating_duration_since(started);
        let run_elapsed = elapsed.saturating_sub(self.warmup);
        (run_elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Instant the workers' request loops stop issuing new requests.
    pub fn deadline(&self) -> Option<Instant> {
        self.started.map(|started| started + self.warmup + self.duration)
    }

    /// Instant past which a worker that has not reported done is abandoned.
    pub fn hard_deadline(&self) -> Option<Instant> {
        self.deadline().map(|deadline| deadline + self.grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> (Lifecycle, Instant) {
        let mut lc = Lifecycle::new(
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(5),
        );
        let epoch = Instant::now();
        lc.start_at(epoch);
        (lc, epoch)
    }

    #[test]
    fn idle_until_started() {
        let lc = Lifecycle::new(Duration::ZERO, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(lc.phase(), Phase::Idle);
        assert_eq!(lc.progress(), 0.0);
        assert!(lc.deadline().is_none());
    }

    #[test]
    fn phases_follow_the_clock() {
        let (lc, epoch) = lifecycle();
        assert_eq!(lc.phase_at(epoch), Phase::Warmup);
        assert_eq!(lc.phase_at(epoch + Duration::from_secs(1)), Phase::Warmup);
        assert_eq!(lc.phase_at(epoch + Duration::from_secs(2)), Phase::Running);
        assert_eq!(lc.phase_at(epoch + Duration::from_secs(11)), Phase::Running);
        assert_eq!(lc.phase_at(epoch + Duration::from_secs(12)), Phase::Cooldown);
    }

    #[test]
    fn zero_warmup_starts_running() {
        let mut lc = Lifecycle::new(Duration::ZERO, Duration::from_secs(10), Duration::from_secs(5));
        let epoch = Instant::now();
        lc.start_at(epoch);
        assert_eq!(lc.phase_at(epoch), Phase::Running);
    }

    #[test]
    fn complete_wins_over_the_clock() {
        let (mut lc, epoch) = lifecycle();
        lc.complete();
        assert_eq!(lc.phase_at(epoch), Phase::Complete);
    }

    #[test]
    fn progress_excludes_warmup_and_clamps() {
        let (lc, epoch) = lifecycle();
        assert_eq!(lc.progress_at(epoch + Duration::from_secs(1)), 0.0);
        let half = lc.progress_at(epoch + Duration::from_secs(7));
        assert!((half - 0.5).abs() < 1e-9);
        assert_eq!(lc.progress_at(epoch + Duration::from_secs(60)), 1.0);
    }

    #[test]
    fn deadlines_include_grace() {
        let (lc, epoch) = lifecycle();
        assert_eq!(lc.deadline(), Some(epoch + Duration::from_secs(12)));
        assert_eq!(lc.hard_deadline(), Some(epoch + Duration::from_secs(22)));
    }
}
