//! Session tuning parameters

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts, polling and buffer sizes for a controller session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bound on opening the transport
    pub connect_timeout_ms: u64,
    /// Bound on waiting for the terminal response to one line
    pub ack_timeout_ms: u64,
    /// Interval between `?` status polls; `None` disables polling
    pub status_poll_interval_ms: Option<u64>,
    /// Delay before an acknowledged move is assumed finished when not polling
    pub settle_delay_ms: u64,
    /// Console log entries kept in history
    pub log_capacity: usize,
    /// Controller event channel capacity
    pub event_buffer: usize,
    /// Keep streaming past `error:n` responses that are not fatal-class
    pub continue_on_nonfatal_error: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            ack_timeout_ms: 30_000,
            status_poll_interval_ms: Some(200),
            settle_delay_ms: 500,
            log_capacity: 100,
            event_buffer: 100,
            continue_on_nonfatal_error: false,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Poll period; `None` (or zero) means no polling
    pub fn status_poll_interval(&self) -> Option<Duration> {
        self.status_poll_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Disable status polling (moves settle on a timer instead)
    pub fn without_polling(mut self) -> Self {
        self.status_poll_interval_ms = None;
        self
    }

    /// Override the acknowledgement timeout
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Override the settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }
}
