//! Event system for controller sessions
//!
//! Provides:
//! - Event types for connection, machine state and stream changes
//! - Event dispatcher for publishing events to subscribers

use crate::data::{ControllerState, StreamOutcome};
use tokio::sync::broadcast;

/// Controller event types
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Connection established to the given address
    Connected(String),
    /// Disconnection occurred
    Disconnected,
    /// Controller state changed
    StateChanged(ControllerState),
    /// Alarm occurred
    Alarm(u32, String),
    /// Error occurred
    Error(String),
    /// An immediate command was acknowledged
    CommandComplete(String),
    /// A streamed line was acknowledged
    StreamProgress {
        /// Lines completed so far, including skipped blanks.
        completed: usize,
        /// Lines in the program.
        total: usize,
        /// Completion in percent.
        percent: f64,
    },
    /// A stream ended
    StreamFinished(StreamOutcome),
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::Connected(name) => write!(f, "Connected to {}", name),
            ControllerEvent::Disconnected => write!(f, "Disconnected"),
            ControllerEvent::StateChanged(state) => write!(f, "State: {}", state),
            ControllerEvent::Alarm(code, desc) => write!(f, "Alarm {} ({})", code, desc),
            ControllerEvent::Error(msg) => write!(f, "Error: {}", msg),
            ControllerEvent::CommandComplete(cmd) => write!(f, "Command complete: {}", cmd),
            ControllerEvent::StreamProgress {
                completed,
                total,
                percent,
            } => write!(f, "Stream {}/{} ({:.1}%)", completed, total, percent),
            ControllerEvent::StreamFinished(outcome) => write!(f, "Stream {}", outcome),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 100)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received it. Publishing with
    /// no subscribers is not an error.
    pub fn publish(&self, event: ControllerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
