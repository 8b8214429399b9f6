//! Shared runtime state: status model, console log and events

pub mod console_log;
pub mod event;
pub mod status_model;
