//! # GCodeLink
//!
//! A G-code sender for GRBL-style CNC controllers with:
//! - A modal G-code interpreter and toolpath extraction for previews
//! - A single-writer machine status model with watch-channel subscribers
//! - Acknowledgement-gated program streaming with pause, cancel and progress
//! - TCP and in-process simulated transports
//!
//! ## Architecture
//!
//! GCodeLink is organized as a workspace with multiple crates:
//!
//! 1. **gcodelink-core** - Data model, errors, status model, console log, events
//! 2. **gcodelink-visualizer** - Tokenizer, interpreter, path builder, viewport
//! 3. **gcodelink-communication** - Transports, GRBL dialect, session controller
//! 4. **gcodelink-settings** - Configuration files
//! 5. **gcodelink** - Command-line front end that integrates all crates

pub mod cli;

pub use gcodelink_communication::{
    default_macros, CommandStreamer, Link, Macro, SessionController, SimulatedTransport,
    SimulatorConfig, StreamHandle, StreamReport, TcpTransport, Transport,
};

pub use gcodelink_core::{
    Axis, ConsoleLog, ControllerError, ControllerEvent, ControllerState, Error, EventDispatcher,
    LogDirection, LogEntry, MachineStatus, MachineStatusModel, Position, Result, SessionConfig,
    StatusReader, StreamOutcome, Units,
};

pub use gcodelink_settings::{default_config_path, Config, ConnectionSettings, MachineSettings};

pub use gcodelink_visualizer::{
    parse_line, Command, GCodeInterpreter, ModalState, PathBounds, PathBuilder, Toolpath,
    Waypoint,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Pretty formatted output on stderr, keeping stdout for command output
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
