//! Submission window: how long the engine should hold jobs before starting.
//!
//! The window is a coarse admission-smoothing heuristic, not a scheduling
//! guarantee. Every job in a run is told to start at the same window end;
//! the engine is trusted to smear actual dispatch.
//!
//! - priority runs: `total * 0.05 + 5` seconds (about 50ms per job plus a
//!   warm-up floor), truncated to whole seconds, no cap
//! - fairness runs: `ceil(0.15 * total - 15)` seconds clamped to `[7, 30]`

use std::time::Duration;

use tokio::time::Instant;

use crate::model::RunMode;

/// Minimum fairness window in seconds.
const FAIRNESS_FLOOR_SECS: u64 = 7;

/// Maximum fairness window in seconds.
const FAIRNESS_CAP_SECS: u64 = 30;

/// Length of the submission window for a run of `total_jobs` jobs.
pub fn window(total_jobs: u64, mode: RunMode) -> Duration {
    let secs = match mode {
        RunMode::Priority => priority_window_secs(total_jobs),
        RunMode::Fairness => fairness_window_secs(total_jobs),
    };
    Duration::from_secs(secs)
}

fn priority_window_secs(total_jobs: u64) -> u64 {
    // total * 0.05 + 5, truncated
    total_jobs / 20 + 5
}

fn fairness_window_secs(total_jobs: u64) -> u64 {
    // ceil(0.15 * total - 15) == ceil((3 * total - 300) / 20), in integers
    let numerator = 3 * i128::from(total_jobs) - 300;
    let scaled = if numerator <= 0 {
        0
    } else {
        ((numerator + 19) / 20) as u64
    };
    scaled.clamp(FAIRNESS_FLOOR_SECS, FAIRNESS_CAP_SECS)
}

/// A submission window anchored at the moment a run starts launching.
///
/// Computed once per run; [`SubmissionWindow::delay`] is then evaluated as
/// each job is submitted, so the delay shrinks as submission proceeds and
/// saturates at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionWindow {
    length: Duration,
    end: Instant,
}

impl SubmissionWindow {
    /// Opens a window for `total_jobs` jobs starting now.
    pub fn open(total_jobs: u64, mode: RunMode) -> Self {
        Self::starting_at(Instant::now(), window(total_jobs, mode))
    }

    /// Opens a window of `length` starting at `start`.
    pub fn starting_at(start: Instant, length: Duration) -> Self {
        Self {
            length,
            end: start + length,
        }
    }

    /// Configured window length.
    pub fn length(&self) -> Duration {
        self.length
    }

    /// Instant at which the window closes.
    pub fn end(&self) -> Instant {
        self.end
    }

    /// Start delay for a job submitted now.
    pub fn delay(&self) -> Duration {
        self.delay_at(Instant::now())
    }

    /// Start delay for a job submitted at `now`; never negative.
    pub fn delay_at(&self, now: Instant) -> Duration {
        self.end.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_window() {
        assert_eq!(window(100, RunMode::Priority), Duration::from_secs(10));
        assert_eq!(window(300, RunMode::Priority), Duration::from_secs(20));
        assert_eq!(window(570, RunMode::Priority), Duration::from_secs(33));
        assert_eq!(window(1, RunMode::Priority), Duration::from_secs(5));
        assert_eq!(window(10_000, RunMode::Priority), Duration::from_secs(505));
    }

    #[test]
    fn test_fairness_window_floor_and_cap() {
        assert_eq!(window(1, RunMode::Fairness), Duration::from_secs(7));
        assert_eq!(window(100, RunMode::Fairness), Duration::from_secs(7));
        assert_eq!(window(300, RunMode::Fairness), Duration::from_secs(30));
        assert_eq!(window(440, RunMode::Fairness), Duration::from_secs(30));
        assert_eq!(window(100_000, RunMode::Fairness), Duration::from_secs(30));
    }

    #[test]
    fn test_fairness_window_linear_core() {
        assert_eq!(window(200, RunMode::Fairness), Duration::from_secs(15));
        // 0.15 * 150 - 15 = 7.5 -> 8
        assert_eq!(window(150, RunMode::Fairness), Duration::from_secs(8));
        // 0.15 * 201 - 15 = 15.15 -> 16
        assert_eq!(window(201, RunMode::Fairness), Duration::from_secs(16));
    }

    #[test]
    fn test_delay_shrinks_and_saturates() {
        let start = Instant::now();
        let w = SubmissionWindow::starting_at(start, Duration::from_secs(10));
        assert_eq!(w.delay_at(start), Duration::from_secs(10));
        assert_eq!(
            w.delay_at(start + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
        assert_eq!(w.delay_at(start + Duration::from_secs(10)), Duration::ZERO);
        assert_eq!(w.delay_at(start + Duration::from_secs(60)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_window_counts_down_with_clock() {
        let w = SubmissionWindow::open(100, RunMode::Priority);
        assert_eq!(w.length(), Duration::from_secs(10));
        assert_eq!(w.delay(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(w.delay(), Duration::from_secs(7));
    }
}
