use std::time::Duration;

use quanta::Instant;

/// A message rate computed over a single reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateReport {
    /// Messages per second over the window.
    pub rate: f64,

    /// Length of the window.
    pub elapsed: Duration,

    /// Number of messages counted in the window.
    pub messages: u64,
}

/// Tracks how many messages pass through over a wall-clock window, and computes the message rate once the window has
/// lasted at least the configured interval.
///
/// Timestamps are always supplied by the caller, so the reporter never reads the clock itself.
#[derive(Debug)]
pub struct RateReporter {
    interval: Duration,
    message_count: u64,
    window_start: Instant,
}

impl RateReporter {
    /// Creates a new `RateReporter` whose first window starts at `now`.
    ///
    /// `interval` must be non-zero, which is enforced when the relay configuration is built.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            message_count: 0,
            window_start: now,
        }
    }

    /// Records a message in the current window.
    pub fn on_message(&mut self) {
        self.message_count += 1;
    }

    /// Returns the number of messages recorded in the current window.
    #[cfg(test)]
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Returns the start of the current window.
    #[cfg(test)]
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Closes the current window and returns its message rate, if the window has reached the report interval by `now`.
    ///
    /// When a report is returned, a new, empty window starting at `now` is opened. Otherwise, nothing changes.
    pub fn maybe_report(&mut self, now: Instant) -> Option<RateReport> {
        let elapsed = now.duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }

        let messages = self.message_count;
        let report = RateReport {
            rate: messages as f64 / elapsed.as_secs_f64(),
            elapsed,
            messages,
        };

        self.message_count = 0;
        self.window_start = now;

        Some(report)
    }
}
