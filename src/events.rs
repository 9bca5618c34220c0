//! Fire-and-forget notifications for the presentation layer
//!
//! Control events and frame events travel on separate broadcast channels so that
//! a flood of frames can never push a connection event out of a slow
//! subscriber's buffer. Sending never blocks; a subscriber that falls behind
//! skips ahead.

use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::trace;

use crate::types::{ConnectionState, Frame, FrameRate};

const CONTROL_CAPACITY: usize = 256;
const FRAME_CAPACITY: usize = 16;

/// Connection and sink lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// The active connection changed state
    StatusChanged(ConnectionState),
    /// A source was opened; frames at `rate` follow
    ConnectionEstablished { rate: FrameRate },
    /// The source was lost or could not be opened
    ConnectionLost,
    /// About to wait `wait` before reconnection attempt number `attempt`
    ReconnectAttempt { wait: Duration, attempt: u32 },
    /// The output device could not be opened
    SinkFailed { reason: String },
}

/// Frame side channel
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// Decoded from the source, before the relay
    Ingested(Frame),
    /// Sent to the output device (always RGB)
    Delivered(Frame),
}

impl FrameEvent {
    pub fn frame(&self) -> &Frame {
        match self {
            FrameEvent::Ingested(frame) | FrameEvent::Delivered(frame) => frame,
        }
    }
}

/// Broadcast hub shared by the connection, the sink and the orchestrator
#[derive(Debug, Clone)]
pub struct EventBus {
    control: broadcast::Sender<RelayEvent>,
    frames: broadcast::Sender<FrameEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (control, _) = broadcast::channel(CONTROL_CAPACITY);
        let (frames, _) = broadcast::channel(FRAME_CAPACITY);
        Self { control, frames }
    }

    pub fn emit(&self, event: RelayEvent) {
        trace!(?event, "Relay event");
        // No subscribers is fine
        let _ = self.control.send(event);
    }

    pub fn frame_ingested(&self, frame: Frame) {
        let _ = self.frames.send(FrameEvent::Ingested(frame));
    }

    pub fn frame_delivered(&self, frame: Frame) {
        let _ = self.frames.send(FrameEvent::Delivered(frame));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.control.subscribe()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<FrameEvent> {
        self.frames.subscribe()
    }

    /// Control events as a stream, skipping over lag
    pub fn events(&self) -> impl Stream<Item = RelayEvent> + 'static {
        BroadcastStream::new(self.control.subscribe()).filter_map(|item| async move { skip_lag(item) })
    }

    /// Frames sent to the output device, as a stream
    pub fn delivered_frames(&self) -> impl Stream<Item = Frame> + 'static {
        BroadcastStream::new(self.frames.subscribe()).filter_map(|item| async move {
            match skip_lag(item)? {
                FrameEvent::Delivered(frame) => Some(frame),
                FrameEvent::Ingested(_) => None,
            }
        })
    }

    /// Frames decoded from the source, as a stream
    pub fn ingested_frames(&self) -> impl Stream<Item = Frame> + 'static {
        BroadcastStream::new(self.frames.subscribe()).filter_map(|item| async move {
            match skip_lag(item)? {
                FrameEvent::Ingested(frame) => Some(frame),
                FrameEvent::Delivered(_) => None,
            }
        })
    }
}

fn skip_lag<T>(item: Result<T, BroadcastStreamRecvError>) -> Option<T> {
    match item {
        Ok(value) => Some(value),
        Err(err) => {
            trace!(%err, "Event subscriber lagged");
            None
        }
    }
}
