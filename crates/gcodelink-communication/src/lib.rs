//! # GCodeLink Communication
//!
//! Transports, the GRBL dialect and the session pipeline for GCodeLink.
//! The session controller owns a connection, classifies inbound traffic,
//! keeps the machine status model current and streams programs one
//! acknowledged line at a time.

pub mod communication;
pub mod controller;
pub mod firmware;

pub use communication::{
    line_buffer::LineBuffer,
    simulated::{ReceivedLine, SimulatedTransport, SimulatorConfig},
    tcp::TcpTransport,
    Link, Transport,
};

pub use controller::{
    streamer::{CommandStreamer, StreamHandle, StreamReport},
    SessionController,
};

pub use firmware::grbl::{
    commands::{default_macros, Macro},
    response_parser::InboundMessage,
};
