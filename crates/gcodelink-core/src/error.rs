//! Error handling for GCodeLink
//!
//! Error types for every layer of the control pipeline:
//! - Transport errors (opening, reading and writing the byte stream)
//! - Protocol errors (malformed or unexpected inbound messages)
//! - Controller errors (rejected lines, alarms, timeouts, lifecycle misuse)
//!
//! G-code interpretation never fails; malformed words are skipped, so there
//! is no parse error type here.

use thiserror::Error;

/// Transport error type
///
/// Failures of the underlying duplex byte stream. Any of these ends the
/// current connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Failed to open the transport
    #[error("Failed to open {address}: {reason}")]
    FailedToOpen {
        /// The address that failed to open.
        address: String,
        /// The reason the open failed.
        reason: String,
    },

    /// Connection attempt did not finish in time
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Connection lost while in use
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Write to the transport failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason for the write failure.
        reason: String,
    },

    /// No connection is open
    #[error("Not connected")]
    NotConnected,

    /// Invalid address
    #[error("Invalid address: {address}")]
    InvalidAddress {
        /// The address that could not be used.
        address: String,
    },
}

/// Protocol error type
///
/// An inbound message could not be understood. The message is dropped and
/// the session continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Status report without the closing delimiter or with broken fields
    #[error("Malformed status report: {line}")]
    MalformedStatus {
        /// The raw inbound line.
        line: String,
    },

    /// Status report declaring a state this dialect does not know
    #[error("Unknown machine state '{state}'")]
    UnknownState {
        /// The state token as received.
        state: String,
    },

    /// Response that arrived with no command waiting for it
    #[error("Unexpected response '{line}'")]
    UnexpectedResponse {
        /// The raw inbound line.
        line: String,
    },
}

/// Controller error type
///
/// Errors reported by, or enforced on behalf of, the controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Controller is not connected
    #[error("Controller not connected")]
    NotConnected,

    /// The controller answered a line with an error token
    #[error("Line {line_number} rejected ({line}): {message}")]
    CommandRejected {
        /// 1-based line number within the program (1 for immediate commands).
        line_number: usize,
        /// The offending line as sent.
        line: String,
        /// Raw error text from the controller.
        message: String,
    },

    /// Alarm condition reported by the controller
    #[error("Alarm: {code} - {message}")]
    Alarm {
        /// The alarm code.
        code: u32,
        /// The alarm message.
        message: String,
    },

    /// Motion refused locally because the machine is in alarm
    #[error("Machine is in alarm; unlock before sending motion")]
    AlarmLocked,

    /// No acknowledgement within the per-line bound
    #[error("No acknowledgement after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// A stream is already running on this connection
    #[error("A program stream is already active")]
    StreamActive,

    /// Invalid state transition
    #[error("Invalid state transition from {current} to {requested}")]
    InvalidStateTransition {
        /// The current state name.
        current: String,
        /// The requested state name.
        requested: String,
    },
}

/// Main error type for GCodeLink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Controller(ControllerError::Timeout { .. })
                | Error::Transport(TransportError::ConnectionTimeout { .. })
        )
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }

    /// Check if the controller rejected a line
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::CommandRejected { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
