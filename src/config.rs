//! Relay configuration
//!
//! Every field has a default, so an empty YAML document is a valid config:
//!
//! ```rust
//! use camrelay::config::RelayConfig;
//! use std::time::Duration;
//!
//! let config = RelayConfig::from_yaml_str("max_backoff_ms: 16000").unwrap();
//! assert_eq!(config.max_backoff(), Duration::from_secs(16));
//! assert_eq!(config.initial_backoff(), Duration::from_secs(1));
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{RelayError, Result};

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self { width: 1920, height: 1080 }
    }
}

/// Low-latency transport options handed to the stream source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Force reliable, ordered transport (RTSP over TCP)
    pub reliable_transport: bool,
    /// Disable demuxer-side buffering
    pub disable_buffering: bool,
    /// Ask the decoder for low-delay output
    pub low_delay: bool,
    /// Maximum demux delay in microseconds
    pub max_delay_us: u64,
    /// Bytes probed to detect the stream format
    pub probe_size: u32,
    /// Microseconds spent analysing the stream before the first frame
    pub analyze_duration_us: u64,
    /// Bound on any single socket operation
    pub socket_timeout_ms: u64,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            reliable_transport: true,
            disable_buffering: true,
            low_delay: true,
            max_delay_us: 0,
            probe_size: 32,
            analyze_duration_us: 0,
            socket_timeout_ms: 5_000,
        }
    }
}

impl TransportOptions {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// Render as demuxer option key/value pairs
    pub fn to_options(&self) -> Vec<(String, String)> {
        let mut options = Vec::with_capacity(7);
        if self.reliable_transport {
            options.push(("rtsp_transport".to_string(), "tcp".to_string()));
        }
        let stimeout_us = self.socket_timeout_ms.saturating_mul(1_000);
        options.push(("stimeout".to_string(), stimeout_us.to_string()));
        if self.disable_buffering {
            options.push(("fflags".to_string(), "nobuffer".to_string()));
        }
        if self.low_delay {
            options.push(("flags".to_string(), "low_delay".to_string()));
        }
        options.push(("max_delay".to_string(), self.max_delay_us.to_string()));
        options.push(("probesize".to_string(), self.probe_size.to_string()));
        options.push(("analyzeduration".to_string(), self.analyze_duration_us.to_string()));
        options
    }
}

/// Address plus transport options for one stream connection
///
/// Immutable once built; a new address needs a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    url: String,
    transport: TransportOptions,
}

impl StreamConfig {
    /// Validate the address and bind it to the transport options
    pub fn new(url: impl Into<String>, transport: TransportOptions) -> Result<Self> {
        let raw = url.into();
        let url = raw.trim();
        if url.is_empty() {
            return Err(RelayError::invalid_address(raw, "address is empty"));
        }
        if url.chars().any(char::is_whitespace) {
            return Err(RelayError::invalid_address(raw.clone(), "address contains whitespace"));
        }
        Ok(Self { url: url.to_string(), transport })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }

    pub fn socket_timeout(&self) -> Duration {
        self.transport.socket_timeout()
    }

    /// Demuxer options for opening this stream
    pub fn options(&self) -> Vec<(String, String)> {
        self.transport.to_options()
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Size of the placeholder frame and of the output device
    pub placeholder: Resolution,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// How long the sink waits on the relay before looping
    pub take_timeout_ms: u64,
    pub transport: TransportOptions,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            placeholder: Resolution::default(),
            initial_backoff_ms: 1_000,
            max_backoff_ms: 32_000,
            take_timeout_ms: 1_000,
            transport: TransportOptions::default(),
        }
    }
}

impl RelayConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn take_timeout(&self) -> Duration {
        Duration::from_millis(self.take_timeout_ms)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RelayError::file_error(path.to_path_buf(), e))?;
        debug!("Loaded relay config from {} ({} bytes)", path.display(), yaml.len());
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        if self.placeholder.width == 0 || self.placeholder.height == 0 {
            return Err(RelayError::config(format!(
                "placeholder resolution {}x{} must be non-zero",
                self.placeholder.width, self.placeholder.height
            )));
        }
        if self.initial_backoff_ms == 0 {
            return Err(RelayError::config("initial_backoff_ms must be non-zero"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(RelayError::config(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        if self.take_timeout_ms == 0 {
            return Err(RelayError::config("take_timeout_ms must be non-zero"));
        }
        if self.transport.socket_timeout_ms == 0 {
            return Err(RelayError::config("transport.socket_timeout_ms must be non-zero"));
        }
        Ok(())
    }

    /// Bind `url` to this config's transport options
    pub fn stream(&self, url: impl Into<String>) -> Result<StreamConfig> {
        StreamConfig::new(url, self.transport.clone())
    }
}
