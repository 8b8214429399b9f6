//! # GCodeLink Core
//!
//! Core types and shared state for GCodeLink.
//! Provides the machine data model, the error taxonomy, the single-writer
//! machine status model, the bounded console log and controller events.

pub mod config;
pub mod core;
pub mod data;
pub mod error;

pub use config::SessionConfig;

pub use core::{
    console_log::{ConsoleLog, LogDirection, LogEntry, LogSubscription},
    event::{ControllerEvent, EventDispatcher},
    status_model::{MachineStatusModel, StatusReader},
};

pub use data::{
    Axis, BufferState, ControllerState, MachineStatus, Overrides, PartialPosition, Position,
    StatusReport, StreamOutcome, Units,
};

pub use error::{ControllerError, Error, ProtocolError, Result, TransportError};
