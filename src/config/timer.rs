//! Handshake retransmission timer callback.

use std::time::Duration;

use tracing::debug;

use crate::core::DEFAULT_RETRANSMIT_INTERVAL;

/// Callback the engine consults each time it re-arms the handshake timer.
///
/// The engine proposes an interval (usually its own exponential backoff);
/// this timer replaces it with the configured fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitTimer {
    interval: Duration,
}

impl RetransmitTimer {
    /// Timer returning `interval`, or the 1 s default when `None`.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval.unwrap_or(DEFAULT_RETRANSMIT_INTERVAL),
        }
    }

    /// The interval this timer hands back.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Next timer value. The engine's proposal is ignored.
    pub fn next_timeout(&self, proposed: Duration) -> Duration {
        debug!(
            proposed_us = proposed.as_micros() as u64,
            interval_us = self.interval.as_micros() as u64,
            "dtls timer callback"
        );
        self.interval
    }
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::new(None)
    }
}
