//! Error types for the relay engine.
//!
//! All errors implement the `std::error::Error` trait and carry structured context
//! for logging and recovery guidance.
//!
//! ## Error Categories
//!
//! - **Source Errors**: The network stream could not be opened, read, or decoded
//! - **Sink Errors**: The output device could not be opened or rejected a frame
//! - **Frame Errors**: A pixel buffer did not match its declared dimensions
//! - **Configuration Errors**: Invalid addresses, settings, or unreadable config files
//!
//! ## Recovery and Retry
//!
//! Source errors are transient: the stream connection turns them into reconnection
//! attempts and never lets them escape. Sink open failures are not retryable.
//!
//! ```rust
//! use camrelay::RelayError;
//!
//! let error = RelayError::source_failed("connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Stream source failure: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("Stream ended unexpectedly")]
    StreamEnded,

    #[error("Failed to open output device: {reason}")]
    SinkOpen {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to deliver frame to output device: {reason}")]
    Delivery {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Frame buffer of {actual} bytes does not match {width}x{height} (expected {expected})")]
    FrameLayout { width: u32, height: u32, expected: usize, actual: usize },

    #[error("Invalid stream address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("Config file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Source { .. } => true,
            RelayError::Timeout { .. } => true,
            RelayError::StreamEnded => true,
            RelayError::Delivery { .. } => true,
            RelayError::SinkOpen { .. } => false,
            RelayError::FrameLayout { .. } => false,
            RelayError::InvalidAddress { .. } => false,
            RelayError::Config { .. } => false,
            RelayError::File { .. } => false,
            RelayError::Parse { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Source { .. } => vec![
                "Check that the camera or stream server is reachable",
                "Verify the stream URL, credentials and path",
                "Confirm the server accepts RTSP over TCP",
            ],
            RelayError::Timeout { .. } => vec![
                "Check network latency to the stream source",
                "Increase the socket timeout",
            ],
            RelayError::StreamEnded => vec![
                "Check whether the source restarted or dropped the session",
                "Wait for the automatic reconnection",
            ],
            RelayError::SinkOpen { .. } => vec![
                "Ensure a virtual camera driver is installed and loaded",
                "Close other applications holding the virtual camera",
                "Restart the relay after fixing the device",
            ],
            RelayError::Delivery { .. } => vec![
                "Check that frame dimensions match the output device",
                "Verify the output device is still present",
            ],
            RelayError::FrameLayout { .. } => vec![
                "Check the decoder output pixel format",
                "Verify width and height reported by the decoder",
            ],
            RelayError::InvalidAddress { .. } => vec![
                "Provide a non-empty URL such as rtsp://host:554/stream",
                "Remove surrounding whitespace from the address",
            ],
            RelayError::Config { .. } => vec![
                "Check configured durations are non-zero",
                "Ensure the initial backoff does not exceed the maximum",
            ],
            RelayError::File { .. } => vec![
                "Check the config file exists and is readable",
                "Check file permissions",
            ],
            RelayError::Parse { .. } => vec![
                "Check the YAML syntax of the config file",
                "Compare field names against the documented configuration",
            ],
        }
    }

    /// Helper constructor for source errors.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        RelayError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for source errors with an underlying cause.
    pub fn source_failed_with(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RelayError::Source { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for timeouts.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        RelayError::Timeout { operation: operation.into(), duration }
    }

    /// Helper constructor for output device open failures.
    pub fn sink_open_failed(reason: impl Into<String>) -> Self {
        RelayError::SinkOpen { reason: reason.into(), source: None }
    }

    /// Helper constructor for per-frame delivery failures.
    pub fn delivery_failed(reason: impl Into<String>) -> Self {
        RelayError::Delivery { reason: reason.into(), source: None }
    }

    /// Helper constructor for rejected stream addresses.
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        RelayError::InvalidAddress { address: address.into(), reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        RelayError::Config { details: details.into() }
    }

    /// Helper constructor for config file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        RelayError::File { path, source }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for RelayError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        RelayError::Parse { context: "relay config".to_string(), details: err.to_string() }
    }
}
