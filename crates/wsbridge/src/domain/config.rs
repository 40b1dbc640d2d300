//! Bridge configuration types.
//!
//! [`BridgeConfig`] is built once at startup from the command line and passed
//! by value into the drivers.  It holds the three queue port endpoints and
//! the [`BridgeSettings`] tunables, which may come from a TOML file.
//!
//! The transport address (where to listen or which URL to dial) is *not*
//! part of this struct: it arrives at runtime on the options port.
//!
//! # Settings file format
//!
//! ```toml
//! queue_capacity = 256
//! barrier_timeout_secs = 30
//! drain_timeout_ms = 1000
//! shutdown_timeout_ms = 5000
//! ```
//!
//! Every field is optional; missing fields take the defaults above.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default capacity of every bounded queue in the bridge.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default deadline for both queue ports to report readiness.
pub const DEFAULT_BARRIER_TIMEOUT_SECS: u64 = 30;

/// Default window for a closing connection to flush its outbound queue.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1_000;

/// Default bound on joining background tasks at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Errors produced while assembling or receiving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("missing required port endpoint --port.{0}")]
    MissingEndpoint(&'static str),

    #[error("options port closed before a configuration packet arrived")]
    OptionsClosed,

    #[error("shutdown requested while waiting for configuration")]
    Interrupted,
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// Tunables shared by both topologies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Capacity of connection queues, hub queues, and port buffers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_barrier_timeout_secs")]
    pub barrier_timeout_secs: u64,

    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_barrier_timeout_secs() -> u64 {
    DEFAULT_BARRIER_TIMEOUT_SECS
}
fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}
fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            barrier_timeout_secs: DEFAULT_BARRIER_TIMEOUT_SECS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl BridgeSettings {
    /// Parses and validates settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses, and validates a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, plus anything
    /// [`BridgeSettings::from_toml_str`] can return.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects values that would deadlock or disable a component.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.barrier_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "barrier_timeout_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_secs(self.barrier_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

/// Connection strings of the three queue ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEndpoints {
    /// Receives the single configuration packet.
    pub options: String,
    /// Data toward the websocket side.
    pub input: String,
    /// Data from the websocket side.
    pub output: String,
}

/// All startup configuration for one bridge process.
///
/// # Example
///
/// ```rust
/// use wsbridge::domain::{BridgeConfig, BridgeSettings, PortEndpoints};
///
/// let config = BridgeConfig {
///     endpoints: PortEndpoints {
///         options: "tcp://127.0.0.1:5000".into(),
///         input: "tcp://127.0.0.1:5001".into(),
///         output: "tcp://127.0.0.1:5002".into(),
///     },
///     settings: BridgeSettings::default(),
/// };
/// assert_eq!(config.settings.queue_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub endpoints: PortEndpoints,
    pub settings: BridgeSettings,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
