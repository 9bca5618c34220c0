//! Resilient relay from a network video stream into a virtual camera.
//!
//! camrelay keeps an output device fed at a steady pace whatever the upstream
//! source is doing. While the stream is live its decoded frames are forwarded;
//! while it is unreachable or reconnecting a colour-bar placeholder is shown.
//!
//! # Features
//!
//! - **Always-on output**: the sink never stalls waiting for the network
//! - **Freshest frame wins**: a single-slot relay drops stale frames instead of queueing
//! - **Automatic reconnection**: exponential backoff from 1s up to 32s
//! - **Pluggable I/O**: decoding and the output device sit behind small traits
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use camrelay::{Orchestrator, OutputBackend, RelayConfig, RelayEvent, StreamSource};
//!
//! async fn run(
//!     source: Arc<dyn StreamSource>,
//!     backend: Arc<dyn OutputBackend>,
//! ) -> camrelay::Result<()> {
//!     let engine = Orchestrator::new(source, backend, RelayConfig::default())?;
//!     let mut events = engine.subscribe();
//!     engine.start("rtsp://192.168.1.20:554/stream").await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let RelayEvent::ConnectionEstablished { rate } = event {
//!             println!("Live at {rate} fps");
//!         }
//!     }
//!     engine.stop().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod events;
pub mod placeholder;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// Relay pipeline
pub mod connection;
pub mod orchestrator;
pub mod relay;
pub mod sink;
pub mod stream;

// External collaborators
pub mod output;
pub mod source;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::{RelayConfig, Resolution, StreamConfig, TransportOptions};
pub use connection::{Backoff, StreamConnection};
pub use events::{EventBus, FrameEvent, RelayEvent};
pub use orchestrator::Orchestrator;
pub use output::{OutputBackend, OutputDevice};
pub use placeholder::PlaceholderGenerator;
pub use relay::{FrameRelay, RelayMode, RelayStats};
pub use sink::SinkDriver;
pub use source::{Packet, SourceSession, StreamSource};
