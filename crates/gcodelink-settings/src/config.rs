//! Configuration and settings management for GCodeLink
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML files; the default file lives in the platform config directory.
//!
//! Configuration is organized into sections:
//! - Connection target (host, port, simulator)
//! - Session tuning (timeouts, polling, buffers)
//! - Machine preferences (jog settings, macros)

use gcodelink_communication::communication::tcp::DEFAULT_TCP_PORT;
use gcodelink_communication::firmware::grbl::commands::{
    default_macros, Macro, DEFAULT_JOG_FEED, JOG_STEP_SIZES,
};
use gcodelink_core::{Error, Result, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where to find the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Hostname or IP address of the controller's telnet bridge
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Talk to the built-in simulator instead of a machine
    pub simulate: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_TCP_PORT,
            simulate: false,
        }
    }
}

impl ConnectionSettings {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Machine preference settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Jog step sizes offered to the operator, in mm
    pub jog_step_sizes: Vec<f64>,
    /// Selected jog step in mm
    pub jog_step: f64,
    /// Jog feed rate in mm/min
    pub jog_feed_rate: f64,
    pub macros: Vec<Macro>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            jog_step_sizes: JOG_STEP_SIZES.to_vec(),
            jog_step: 1.0,
            jog_feed_rate: DEFAULT_JOG_FEED,
            macros: default_macros(),
        }
    }
}

impl MachineSettings {
    pub fn find_macro(&self, name: &str) -> Option<&Macro> {
        self.macros
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub session: SessionConfig,
    pub machine: MachineSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        _ => Err(Error::other("Config file must be .json or .toml")),
    }
}

/// `<config dir>/gcodelink/config.toml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gcodelink").join("config.toml"))
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    ///
    /// Missing keys take their default values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("Failed to read config file: {}", e)))?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid JSON config: {}", e)))?,
            Format::Toml => toml::from_str(&content)
                .map_err(|e| Error::other(format!("Invalid TOML config: {}", e)))?,
        };

        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("Failed to write config file: {}", e)))?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.connection.simulate && self.connection.host.trim().is_empty() {
            return Err(Error::other("Connection host must not be empty"));
        }
        if self.connection.port == 0 {
            return Err(Error::other("Connection port must be > 0"));
        }

        let session = &self.session;
        if session.connect_timeout_ms == 0 || session.ack_timeout_ms == 0 {
            return Err(Error::other("Timeouts must be > 0"));
        }
        if session.status_poll_interval_ms == Some(0) {
            return Err(Error::other("Status poll interval must be > 0"));
        }
        if session.log_capacity == 0 || session.event_buffer == 0 {
            return Err(Error::other("Log and event buffers must hold at least one entry"));
        }

        let machine = &self.machine;
        if machine.jog_feed_rate <= 0.0 {
            return Err(Error::other("Jog feed rate must be > 0"));
        }
        if machine.jog_step <= 0.0 || machine.jog_step_sizes.iter().any(|s| *s <= 0.0) {
            return Err(Error::other("Jog steps must be > 0"));
        }
        if let Some(m) = machine.macros.iter().find(|m| m.name.trim().is_empty()) {
            return Err(Error::other(format!(
                "Macro '{}' needs a name",
                m.commands.lines().next().unwrap_or_default()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.address(), "localhost:23");
        assert_eq!(config.machine.macros.len(), 7);
        assert!(config.machine.find_macro("park").is_some());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::new();
        config.machine.jog_feed_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.session.status_poll_interval_ms = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::new();
        config.connection.host.clear();
        assert!(config.validate().is_err());
        config.connection.simulate = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(format_of(Path::new("config.yaml")).is_err());
        assert!(format_of(Path::new("config")).is_err());
    }
}
