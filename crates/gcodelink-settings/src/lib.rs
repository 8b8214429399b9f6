//! GCodeLink Settings Crate
//!
//! Handles application configuration: connection target, session tuning,
//! jog settings and macros, persisted as JSON or TOML.

pub mod config;

pub use config::{default_config_path, Config, ConnectionSettings, MachineSettings};
