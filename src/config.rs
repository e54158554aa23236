//! Application configuration.
//!
//! Every section has a `Default` and `with_*` builder methods, and the whole
//! tree (de)serialises with serde so it can be read from a file.
//!
//! # Example
//!
//! ```rust
//! use signalbox::config::{Config, DccConfig, SensorServerConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.dcc.port, 2560);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_dcc(DccConfig::default().with_host("192.168.0.22"))
//!     .with_sensor_server(SensorServerConfig::default().with_port(4100));
//! assert_eq!(config.sensor_server.port, 4100);
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reading below which a proximity sensor reports a train present.
pub const DEFAULT_DETECTION_THRESHOLD: i64 = 1500;

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for this schema.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command station connection
    pub dcc: DccConfig,
    /// Sensor ingestion server
    pub sensor_server: SensorServerConfig,
    /// Speed ramp control loop
    pub control_loop: ControlLoopConfig,
    /// HTTP API
    pub web: WebConfig,
}

impl Config {
    /// Parse configuration from a YAML string; missing keys take defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Set DCC configuration
    pub fn with_dcc(mut self, dcc: DccConfig) -> Self {
        self.dcc = dcc;
        self
    }

    /// Set sensor server configuration
    pub fn with_sensor_server(mut self, sensor_server: SensorServerConfig) -> Self {
        self.sensor_server = sensor_server;
        self
    }

    /// Set control loop configuration
    pub fn with_control_loop(mut self, control_loop: ControlLoopConfig) -> Self {
        self.control_loop = control_loop;
        self
    }

    /// Set web configuration
    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }
}

// ============================================================================
// DCC Config
// ============================================================================

/// Command station connection configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DccConfig {
    /// Command station hostname or IP
    pub host: String,
    /// Command station TCP port
    pub port: u16,
    /// How long to wait for a cab status answer, in milliseconds
    pub status_timeout_ms: u64,
    /// Track powered on at start and off on emergency stop
    pub track: String,
}

impl Default for DccConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2560,
            status_timeout_ms: 2000,
            track: crate::dcc::MAIN_TRACK.to_string(),
        }
    }
}

impl DccConfig {
    /// Set the command station host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the command station port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the status query timeout
    pub fn with_status_timeout_ms(mut self, ms: u64) -> Self {
        self.status_timeout_ms = ms;
        self
    }

    /// Set the powered track name
    pub fn with_track(mut self, track: &str) -> Self {
        self.track = track.to_string();
        self
    }

    /// Status query timeout as a [`Duration`]
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

// ============================================================================
// Sensor Server Config
// ============================================================================

/// Sensor ingestion server configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorServerConfig {
    /// Address to bind
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Reading below which a sensor counts as triggered, unless the sensor
    /// has its own threshold in the config store
    pub detection_threshold: i64,
}

impl Default for SensorServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 4000,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
        }
    }
}

impl SensorServerConfig {
    /// Set the bind address
    pub fn with_bind(mut self, bind: &str) -> Self {
        self.bind = bind.to_string();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the default detection threshold
    pub fn with_detection_threshold(mut self, threshold: i64) -> Self {
        self.detection_threshold = threshold;
        self
    }

    /// `bind:port` as a socket address string
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

// ============================================================================
// Control Loop Config
// ============================================================================

/// Speed ramp control loop configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLoopConfig {
    /// Tick interval in milliseconds
    pub tick_interval_ms: u64,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
        }
    }
}

impl ControlLoopConfig {
    /// Set the tick interval
    pub fn with_tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms.max(1);
        self
    }

    /// Tick interval as a [`Duration`]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// ============================================================================
// Web Config
// ============================================================================

/// HTTP API configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Port to listen on
    pub port: u16,
    /// Whether to enable CORS for all origins
    pub cors_permissive: bool,
    /// Whether the HTTP API is served
    pub enabled: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_permissive: true,
            enabled: false,
        }
    }
}

impl WebConfig {
    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set CORS mode
    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// Enable or disable the HTTP API
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Listen address on all interfaces
    pub fn addr(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.port).into()
    }
}

// ============================================================================
// Tests
// ============================================================================
