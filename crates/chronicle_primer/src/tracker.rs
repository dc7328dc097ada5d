//! Priming progress reporting.

use std::time::{Duration, Instant};
use tracing::info;

/// Storage slots between two progress reports
pub const PRINT_FREQUENCY: u64 = 500_000;

/// Weight of the newest rate sample in the moving average
const SMOOTHING: f64 = 0.1;

/// Counts primed storage slots and logs a smoothed rate with an ETA
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    step: u64,
    target: u64,
    frequency: u64,
    start: Instant,
    last: Instant,
    rate: f64,
}

impl ProgressTracker {
    /// Create a tracker expecting `target` steps
    #[must_use]
    pub fn new(target: u64) -> Self {
        let now = Instant::now();
        Self {
            step: 0,
            target,
            frequency: PRINT_FREQUENCY,
            start: now,
            last: now,
            rate: 0.0,
        }
    }

    /// Report every `frequency` steps instead
    #[must_use]
    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency.max(1);
        self
    }

    /// Steps counted so far
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Smoothed rate in steps per second
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Count one step, logging when a report is due.
    ///
    /// Returns true if a report was logged.
    pub fn print_progress(&mut self) -> bool {
        self.step += 1;
        if self.step % self.frequency != 0 {
            return false;
        }

        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64().max(f64::EPSILON);
        let current = self.frequency as f64 / elapsed;
        self.rate = smooth(self.rate, current);
        self.last = now;

        let progress = if self.target == 0 {
            100.0
        } else {
            self.step as f64 / self.target as f64 * 100.0
        };
        let remaining = self.target.saturating_sub(self.step) as f64;
        let eta = Duration::from_secs_f64(remaining / self.rate.max(f64::EPSILON));
        info!(
            "[Primer] Loading state ... {current:8.1} slots/s, {progress:5.1}%, time: {}, ETA: {}",
            minutes(now.duration_since(self.start)),
            minutes(eta),
        );
        true
    }
}

fn smooth(rate: f64, sample: f64) -> f64 {
    sample * SMOOTHING + rate * (1.0 - SMOOTHING)
}

fn minutes(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_at_frequency() {
        let mut tracker = ProgressTracker::new(10).with_frequency(4);
        let reports: Vec<bool> = (0..8).map(|_| tracker.print_progress()).collect();
        assert_eq!(reports, [false, false, false, true, false, false, false, true]);
        assert_eq!(tracker.step(), 8);
        assert!(tracker.rate() > 0.0);
    }

    #[test]
    fn test_moving_average_weights_new_sample() {
        assert!((smooth(0.0, 100.0) - 10.0).abs() < 1e-9);
        assert!((smooth(10.0, 100.0) - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_minutes_format() {
        assert_eq!(minutes(Duration::from_secs(0)), "0:00");
        assert_eq!(minutes(Duration::from_secs(125)), "2:05");
    }
}
