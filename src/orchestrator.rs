//! Top-level wiring of stream ingestion, the frame relay and the sink
//!
//! The orchestrator owns one [`SinkDriver`] for its whole life and at most one
//! [`StreamConnection`] at a time. Connection edges toggle the relay between
//! live and placeholder output, so the virtual camera never goes dark.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info};

use crate::Result;
use crate::config::RelayConfig;
use crate::connection::{Backoff, ConnectionLinks, StreamConnection, TransitionHandler};
use crate::events::{EventBus, FrameEvent, RelayEvent};
use crate::output::OutputBackend;
use crate::relay::{FrameRelay, RelayMode};
use crate::sink::SinkDriver;
use crate::source::StreamSource;
use crate::stream::ThrottleExt;
use crate::types::{ConnectionState, Frame, FrameRate, PreviewRate};

/// Applies connection edges to the relay and the sink
struct RelayWiring {
    relay: Arc<FrameRelay>,
    sink: Arc<SinkDriver>,
    width: u32,
    height: u32,
}

impl TransitionHandler for RelayWiring {
    fn on_connected(&self, rate: FrameRate) {
        self.relay.set_mode(RelayMode::Live);
        if let Err(e) = self.sink.initialize(self.width, self.height, rate) {
            error!("Sink could not follow stream frame rate {}: {}", rate, e);
        }
    }

    fn on_lost(&self) {
        self.relay.set_mode(RelayMode::Placeholder);
    }
}

/// Relay engine entry point
///
/// Must be created inside a tokio runtime; the sink's delivery loop is spawned
/// immediately.
pub struct Orchestrator {
    source: Arc<dyn StreamSource>,
    config: RelayConfig,
    relay: Arc<FrameRelay>,
    sink: Arc<SinkDriver>,
    events: EventBus,
    status: Arc<watch::Sender<ConnectionState>>,
    active: Mutex<Option<StreamConnection>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn StreamSource>,
        backend: Arc<dyn OutputBackend>,
        config: RelayConfig,
    ) -> Result<Self> {
        config.validate()?;

        let relay = Arc::new(FrameRelay::new(config.placeholder.width, config.placeholder.height));
        let events = EventBus::new();
        let sink = Arc::new(SinkDriver::new(
            Arc::clone(&relay),
            backend,
            events.clone(),
            config.take_timeout(),
        ));
        sink.start();

        let (status, _) = watch::channel(ConnectionState::Disconnected);
        info!(
            width = config.placeholder.width,
            height = config.placeholder.height,
            "Relay engine created"
        );

        Ok(Self {
            source,
            config,
            relay,
            sink,
            events,
            status: Arc::new(status),
            active: Mutex::new(None),
        })
    }

    /// Start relaying from `address`, replacing any current stream
    ///
    /// Calls are serialised. An invalid address is rejected before the current
    /// stream is touched. Placeholder frames flow from the moment this returns,
    /// whether or not the source is reachable.
    pub async fn start(&self, address: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        let stream = self.config.stream(address)?;

        if let Some(mut previous) = active.take() {
            info!(url = previous.url(), "Stopping previous stream");
            previous.stop().await;
        }

        let width = self.config.placeholder.width;
        let height = self.config.placeholder.height;
        self.relay.set_mode(RelayMode::Placeholder);
        self.sink.initialize(width, height, FrameRate::DEFAULT)?;

        let links = ConnectionLinks {
            relay: Arc::clone(&self.relay),
            events: self.events.clone(),
            handler: Arc::new(RelayWiring {
                relay: Arc::clone(&self.relay),
                sink: Arc::clone(&self.sink),
                width,
                height,
            }),
            status: Arc::clone(&self.status),
            backoff: Backoff::new(self.config.initial_backoff(), self.config.max_backoff()),
        };

        info!(url = stream.url(), "Starting stream");
        *active = Some(StreamConnection::spawn(Arc::clone(&self.source), stream, links));
        Ok(())
    }

    /// Drop the active stream but keep the camera on the placeholder
    ///
    /// The sink keeps running, so [`Orchestrator::start`] can connect again
    /// later. Does nothing to the sink when no stream is active.
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        if let Some(mut connection) = active.take() {
            info!(url = connection.url(), "Disconnecting stream");
            connection.stop().await;
        }
        self.relay.set_mode(RelayMode::Placeholder);
    }

    /// Stop the stream and the sink
    ///
    /// The output device is closed; the engine cannot be started again.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(mut connection) = active.take() {
            connection.stop().await;
        }
        self.relay.set_mode(RelayMode::Placeholder);
        self.sink.stop().await;
        info!("Relay engine stopped");
    }

    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Current status followed by every change
    pub fn status_updates(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.status.subscribe())
    }

    /// Address of the active stream, if any
    pub async fn address(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|c| c.url().to_string())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    pub fn frames(&self) -> broadcast::Receiver<FrameEvent> {
        self.events.subscribe_frames()
    }

    /// Delivered frames for display, at most at `rate`
    ///
    /// The rate is normalised against the sink's pacing at the time of the call.
    pub fn preview(&self, rate: PreviewRate) -> BoxStream<'static, Frame> {
        let sink_rate = self.sink.frame_rate().unwrap_or_default();
        let frames = self.events.delivered_frames();
        match rate.throttle_interval(sink_rate) {
            None => frames.boxed(),
            Some(period) => frames.throttle(period).boxed(),
        }
    }

    pub fn relay(&self) -> &Arc<FrameRelay> {
        &self.relay
    }

    pub fn sink(&self) -> &Arc<SinkDriver> {
        &self.sink
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}
