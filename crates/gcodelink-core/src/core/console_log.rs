//! Bounded console log of traffic to and from the controller
//!
//! Every outbound line, inbound response and session notice is appended
//! here. History is capped (oldest entries are evicted) and live
//! subscribers see entries in append order from the moment they subscribe.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default number of entries kept in history.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Which way a log entry travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogDirection {
    /// Sent to the controller
    Outbound,
    /// Received from the controller
    Inbound,
    /// Session notice
    Info,
    /// Failure notice
    Error,
}

impl std::fmt::Display for LogDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogDirection::Outbound => write!(f, ">>"),
            LogDirection::Inbound => write!(f, "<<"),
            LogDirection::Info => write!(f, "--"),
            LogDirection::Error => write!(f, "!!"),
        }
    }
}

/// A single console log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub direction: LogDirection,
    pub message: String,
}

impl LogEntry {
    pub fn new(direction: LogDirection, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            direction,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.direction,
            self.message
        )
    }
}

/// Bounded, subscribable console log
///
/// Cloning shares the same history and subscribers.
#[derive(Clone)]
pub struct ConsoleLog {
    history: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
}

impl ConsoleLog {
    /// Create a log keeping at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            history: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx,
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn append(&self, direction: LogDirection, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(direction, message);
        {
            let mut history = self.history.write();
            history.push_back(entry.clone());
            while history.len() > self.capacity {
                history.pop_front();
            }
        }
        let _ = self.tx.send(entry.clone());
        entry
    }

    pub fn outbound(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogDirection::Outbound, message)
    }

    pub fn inbound(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogDirection::Inbound, message)
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogDirection::Info, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogDirection::Error, message)
    }

    /// History in append order (oldest first)
    pub fn entries(&self) -> Vec<LogEntry> {
        self.history.read().iter().cloned().collect()
    }

    /// History newest first, as consoles usually display it
    pub fn recent(&self) -> Vec<LogEntry> {
        self.history.read().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.history.write().clear();
    }

    /// Subscribe to entries appended from now on
    pub fn subscribe(&self) -> LogSubscription {
        LogSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Live view of new console log entries
pub struct LogSubscription {
    rx: broadcast::Receiver<LogEntry>,
}

impl LogSubscription {
    /// Wait for the next entry
    ///
    /// A subscriber that falls more than one history's worth behind skips
    /// the entries it missed. Returns `None` once the log is dropped.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        loop {
            match self.rx.recv().await {
                Ok(entry) => return Some(entry),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Console log subscriber lagged, skipped {} entries", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next entry if one is already queued
    pub fn try_recv(&mut self) -> Option<LogEntry> {
        loop {
            match self.rx.try_recv() {
                Ok(entry) => return Some(entry),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
