//! Stream connection: ingest, loss detection and reconnection
//!
//! One spawned task owns the whole state machine for a connection. Because a
//! single task drives connect, read and backoff in sequence, at most one
//! reconnection sequence exists per connection and a loss is reported exactly
//! once, however the failure surfaced.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use crate::RelayError;
use crate::config::StreamConfig;
use crate::events::{EventBus, RelayEvent};
use crate::relay::FrameRelay;
use crate::source::{SourceSession, StreamSource};
use crate::types::{ConnectionState, FrameRate};

/// Reacts to connection edges before observers hear about them
///
/// Called from the connection task; implementations must not block.
pub trait TransitionHandler: Send + Sync + 'static {
    /// The source is open. Called once per successful connection, before any frame.
    fn on_connected(&self, rate: FrameRate);

    /// The source was lost or could not be opened. Called once per loss.
    fn on_lost(&self);
}

/// Everything a connection publishes into
#[derive(Clone)]
pub struct ConnectionLinks {
    pub relay: Arc<FrameRelay>,
    pub events: EventBus,
    pub handler: Arc<dyn TransitionHandler>,
    /// Status shared with whoever owns the connection
    pub status: Arc<watch::Sender<ConnectionState>>,
    pub backoff: Backoff,
}

enum ReadOutcome {
    Stopped,
    Lost(RelayError),
}

struct Worker {
    source: Arc<dyn StreamSource>,
    config: StreamConfig,
    links: ConnectionLinks,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        info!(url = self.config.url(), "Stream connection started");
        let mut retrying = false;
        let mut attempt = 0u32;

        loop {
            self.transition(ConnectionState::Connecting);

            let timeout = self.config.socket_timeout();
            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                opened = tokio::time::timeout(timeout, self.source.connect(&self.config)) => opened,
            };
            let opened = opened.unwrap_or_else(|_| Err(RelayError::timeout("stream open", timeout)));

            match opened {
                Ok(mut session) => {
                    let advertised = session.average_rate().filter(|rate| rate.is_valid());
                    let rate = FrameRate::resolve(advertised);
                    match advertised {
                        Some(rate) => info!("Stream frame rate set to {} fps", rate),
                        None => info!("Stream frame rate not available, using default {} fps", rate),
                    }

                    self.links.backoff.reset();
                    retrying = false;
                    attempt = 0;

                    self.transition(ConnectionState::Connected);
                    self.links.handler.on_connected(rate);
                    self.links.events.emit(RelayEvent::ConnectionEstablished { rate });
                    info!(url = self.config.url(), "Connected to stream");

                    let outcome = self.pump(session.as_mut()).await;
                    session.close().await;
                    match outcome {
                        ReadOutcome::Stopped => break,
                        ReadOutcome::Lost(e) => warn!("Stream error: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Failed to open stream: {}", e);
                    if retrying {
                        let next = self.links.backoff.record_failure();
                        debug!("Next reconnection attempt in {:?}", next);
                    }
                }
            }

            // Relay must be on placeholder before anyone sees the loss
            if !retrying {
                self.links.handler.on_lost();
            }
            self.transition(ConnectionState::Reconnecting);
            if !retrying {
                self.links.events.emit(RelayEvent::ConnectionLost);
                retrying = true;
            }

            attempt = attempt.saturating_add(1);
            let wait = self.links.backoff.current();
            info!(attempt, "Attempting to reconnect in {:?}", wait);
            self.links.events.emit(RelayEvent::ReconnectAttempt { wait, attempt });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Reconnection stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.transition(ConnectionState::Disconnected);
        info!(url = self.config.url(), "Stream connection stopped");
    }

    /// Read, decode and forward frames until the stream fails or stop is requested
    async fn pump(&self, session: &mut dyn SourceSession) -> ReadOutcome {
        let timeout = self.config.socket_timeout();
        let mut frames = 0u64;

        let lost = loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ReadOutcome::Stopped,
                read = tokio::time::timeout(timeout, session.read_packet()) => read,
            };

            let packet = match read {
                Err(_) => break RelayError::timeout("packet read", timeout),
                Ok(Err(e)) => break e,
                Ok(Ok(None)) => break RelayError::StreamEnded,
                Ok(Ok(Some(packet))) => packet,
            };

            if packet.dts.is_none() {
                trace!("Skipping packet without decode timestamp");
                continue;
            }

            let decoded = match session.decode(&packet) {
                Ok(decoded) => decoded,
                Err(e) => break e,
            };

            for frame in decoded {
                if self.cancel.is_cancelled() {
                    return ReadOutcome::Stopped;
                }
                let Some(frame) = frame else {
                    trace!("Skipping null decoder output");
                    continue;
                };
                frames += 1;
                self.links.events.frame_ingested(frame.clone());
                self.links.relay.submit(frame);
            }
        };

        info!("Stream lost after {} frames", frames);
        ReadOutcome::Lost(lost)
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.links.status.send_replace(next);
        if previous == next {
            return;
        }
        if !previous.can_transition_to(next) {
            warn!("Unexpected connection transition {} -> {}", previous, next);
        }
        debug!("Connection state {} -> {}", previous, next);
        self.links.events.emit(RelayEvent::StatusChanged(next));
    }
}

/// Handle to a running stream connection
///
/// Dropping the handle requests stop; call [`StreamConnection::stop`] to also
/// wait for the task to finish.
pub struct StreamConnection {
    url: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    status: Arc<watch::Sender<ConnectionState>>,
}

impl StreamConnection {
    /// Spawn the connection task. It starts connecting immediately.
    pub fn spawn(
        source: Arc<dyn StreamSource>,
        config: StreamConfig,
        links: ConnectionLinks,
    ) -> Self {
        let cancel = CancellationToken::new();
        let url = config.url().to_string();
        let status = Arc::clone(&links.status);

        let worker = Worker { source, config, links, cancel: cancel.clone() };
        let task = tokio::spawn(worker.run());

        Self { url, cancel, task: Some(task), status }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Stop the connection and wait for its task
    ///
    /// Safe in any state. Aborts any pending connect, read or backoff sleep and
    /// closes the open session. No further attempt starts once this returns.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Stream connection task ended abnormally: {}", e);
            }
        }
        self.status.send_if_modified(|state| {
            let changed = *state != ConnectionState::Disconnected;
            *state = ConnectionState::Disconnected;
            changed
        });
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        debug!(url = %self.url, "Dropping stream connection");
        self.cancel.cancel();
    }
}
