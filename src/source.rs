//! Stream source traits
//!
//! The decoding library is an external collaborator. These traits are the
//! capability the stream connection needs from it: open an address with
//! transport options, report the advertised frame rate, read packets, and
//! decode them into frames.

use std::sync::Arc;

use crate::Result;
use crate::config::StreamConfig;
use crate::types::{Frame, FrameRate};

/// Demuxed, still-encoded packet
#[derive(Debug, Clone)]
pub struct Packet {
    /// Decode timestamp. Packets without one are skipped.
    pub dts: Option<i64>,
    /// Index of the substream the packet belongs to
    pub stream_index: usize,
    /// Encoded payload (zero-copy via Arc)
    pub data: Arc<[u8]>,
}

impl Packet {
    pub fn new(dts: Option<i64>, stream_index: usize, data: Vec<u8>) -> Self {
        Self { dts, stream_index, data: data.into() }
    }
}

/// Opens network streams
#[async_trait::async_trait]
pub trait StreamSource: Send + Sync + 'static {
    /// Open `config.url()` with `config.options()`
    ///
    /// Returns an open session once the stream descriptor has been read. Any
    /// error is treated as transient by the caller.
    async fn connect(&self, config: &StreamConfig) -> Result<Box<dyn SourceSession>>;
}

/// One open stream
#[async_trait::async_trait]
pub trait SourceSession: Send {
    /// Average frame rate advertised by the video substream, if any
    fn average_rate(&self) -> Option<FrameRate>;

    /// Read the next packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - Packet available
    /// - `Ok(None)` - Stream ended
    /// - `Err(e)` - Transport error
    async fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// Decode a packet
    ///
    /// A packet may yield zero or more frames; `None` entries are null decoder
    /// results and are skipped by the caller.
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Option<Frame>>>;

    /// Release network resources. Called exactly once before the session is dropped.
    async fn close(&mut self);
}
