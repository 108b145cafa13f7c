//! Connection settings
//!
//! Settings are read from a TOML file. Every field has a default, so an empty
//! (or missing) file yields a working configuration:
//!
//! ```toml
//! [client]
//! default_timeout_ms = 1000
//! max_frame_len = 4096
//! line_ending = "any"
//! overlap = "queue"
//!
//! [serial]
//! path = "/dev/ttyUSB0"
//! baud_rate = 9600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// How a line is terminated on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\r`, `\n` and `\r\n` all end a line; empty lines are skipped.
    #[default]
    Any,
    /// Only the two byte sequence `\r\n` ends a line.
    CrLf,
}

/// What `send` does while another request is outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    /// Wait for earlier requests to finish, in arrival order.
    #[default]
    Queue,
    /// Return [`crate::Error::RequestInProgress`] immediately.
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Reply window for commands that do not carry their own timeout.
    pub default_timeout_ms: u64,
    /// Longest unterminated line accepted before the connection faults.
    pub max_frame_len: usize,
    pub line_ending: LineEnding,
    pub overlap: OverlapPolicy,
    /// How long a single transport read may block before the reader thread
    /// checks for shutdown.
    pub read_poll_ms: u64,
    /// Anomalies buffered for [`crate::Client::anomalies`] before new ones are
    /// only logged.
    pub anomaly_capacity: usize,
}

impl ClientConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 1000,
            max_frame_len: 4096,
            line_ending: LineEnding::Any,
            overlap: OverlapPolicy::Queue,
            read_poll_ms: 50,
            anomaly_capacity: 256,
        }
    }
}

/// Serial line parameters. The SIS protocol always runs 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: 9600,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientConfig,
    pub serial: SerialConfig,
}

impl Settings {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load `<config dir>/sistrum/config.toml`, or the defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading settings");
                Self::load(path)
            }
            _ => {
                tracing::debug!("no settings file, using defaults");
                Ok(Self::default())
            }
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sistrum").join("config.toml"))
}
