//! Sink driver: drains the relay into the output device at the configured pace

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::events::{EventBus, RelayEvent};
use crate::output::{OutputBackend, OutputDevice};
use crate::relay::FrameRelay;
use crate::types::{Frame, FrameRate};
use crate::{RelayError, Result};

/// Floor on the delivery period
const MIN_PERIOD: Duration = Duration::from_millis(1);

struct OpenDevice {
    device: Box<dyn OutputDevice>,
    width: u32,
    height: u32,
    rate: FrameRate,
}

struct SinkShared {
    relay: Arc<FrameRelay>,
    backend: Arc<dyn OutputBackend>,
    events: EventBus,
    take_timeout: Duration,
    device: Mutex<Option<OpenDevice>>,
    /// `None` until initialized; the delivery loop waits on this
    pacing: watch::Sender<Option<FrameRate>>,
    delivered: AtomicU64,
    failures: AtomicU64,
}

impl SinkShared {
    fn lock_device(&self) -> MutexGuard<'_, Option<OpenDevice>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, frame: Frame) {
        let rgb = frame.to_rgb();
        let mut guard = self.lock_device();
        let Some(open) = guard.as_mut() else {
            trace!("Output device closed, dropping frame");
            return;
        };

        match open.device.send(&rgb) {
            Ok(()) => {
                drop(guard);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                trace!("Frame sent to output device");
                self.events.frame_delivered(rgb);
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(failures, "Failed to send frame to output device: {}", e);
            }
        }
    }

    fn close_device(&self) {
        if let Some(mut open) = self.lock_device().take() {
            info!(device = open.device.name(), "Closing output device");
            open.device.close();
        }
    }
}

impl Drop for SinkShared {
    fn drop(&mut self) {
        self.close_device();
    }
}

/// Owns the output device and the delivery loop
pub struct SinkDriver {
    shared: Arc<SinkShared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SinkDriver {
    pub fn new(
        relay: Arc<FrameRelay>,
        backend: Arc<dyn OutputBackend>,
        events: EventBus,
        take_timeout: Duration,
    ) -> Self {
        let (pacing, _) = watch::channel(None);
        let shared = Arc::new(SinkShared {
            relay,
            backend,
            events,
            take_timeout,
            device: Mutex::new(None),
            pacing,
            delivered: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });
        Self { shared, cancel: CancellationToken::new(), task: Mutex::new(None) }
    }

    /// Open the output device, or re-pace an already open one
    ///
    /// The device is opened exactly once. Later calls leave the device alone
    /// (its parameters are fixed) but switch the delivery pacing to `rate`.
    /// An open failure is fatal for this sink and is reported as
    /// [`RelayError::SinkOpen`] plus a [`RelayEvent::SinkFailed`] event.
    pub fn initialize(&self, width: u32, height: u32, rate: FrameRate) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RelayError::sink_open_failed("sink driver has been stopped"));
        }
        if !rate.is_valid() {
            warn!("Frame rate {} out of range, pacing at {}", rate, FrameRate::DEFAULT);
        }
        let rate = FrameRate::resolve(Some(rate));

        let mut guard = self.shared.lock_device();
        if let Some(open) = guard.as_ref() {
            if (open.width, open.height) != (width, height) || open.rate != rate {
                warn!(
                    device = open.device.name(),
                    "Output device already open at {}x{} {} fps; cannot change to {}x{} {} fps",
                    open.width,
                    open.height,
                    open.rate,
                    width,
                    height,
                    rate
                );
            }
            drop(guard);
            self.set_pacing(rate);
            return Ok(());
        }

        match self.shared.backend.open(width, height, rate) {
            Ok(device) => {
                info!(
                    device = device.name(),
                    width,
                    height,
                    fps = rate.fps(),
                    "Output device opened"
                );
                *guard = Some(OpenDevice { device, width, height, rate });
                drop(guard);
                self.set_pacing(rate);
                Ok(())
            }
            Err(e) => {
                error!("Failed to open output device: {}", e);
                self.shared.events.emit(RelayEvent::SinkFailed { reason: e.to_string() });
                Err(match e {
                    e @ RelayError::SinkOpen { .. } => e,
                    other => RelayError::SinkOpen {
                        reason: other.to_string(),
                        source: Some(Box::new(other)),
                    },
                })
            }
        }
    }

    fn set_pacing(&self, rate: FrameRate) {
        let previous = self.shared.pacing.send_replace(Some(rate));
        if previous != Some(rate) {
            info!("Sink frame rate set to {} ({:.2} fps)", rate, rate.fps());
        }
    }

    /// Spawn the delivery loop. Calling this twice has no effect.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(Self::run(shared, cancel)));
    }

    async fn run(shared: Arc<SinkShared>, cancel: CancellationToken) {
        info!("Sink driver started");
        let mut pacing_rx = shared.pacing.subscribe();
        let mut pacer: Option<(FrameRate, Interval)> = None;

        loop {
            let current = *pacing_rx.borrow_and_update();
            let Some(rate) = current else {
                // Not initialized yet
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = pacing_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            if pacer.as_ref().map(|(r, _)| *r) != Some(rate) {
                debug!("Pacing delivery at {}", rate);
                pacer = Some((rate, Self::pacer(rate)));
            }

            let taken = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                taken = shared.relay.take(shared.take_timeout) => taken,
            };
            let Some(frame) = taken else {
                trace!("No frame within take timeout");
                continue;
            };

            shared.deliver(frame);

            if let Some((_, interval)) = pacer.as_mut() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
            }
        }

        info!(
            delivered = shared.delivered.load(Ordering::Relaxed),
            failures = shared.failures.load(Ordering::Relaxed),
            "Sink driver stopped"
        );
    }

    fn pacer(rate: FrameRate) -> Interval {
        let period = rate.interval().max(MIN_PERIOD);
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// Stop the loop, wait for it, and close the device. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Sink driver task ended abnormally: {}", e);
            }
        }
        self.shared.close_device();
        self.shared.pacing.send_replace(None);
    }

    /// Current delivery pacing, once initialized
    pub fn frame_rate(&self) -> Option<FrameRate> {
        *self.shared.pacing.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock_device().is_some()
    }

    pub fn is_running(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn delivered_count(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    pub fn failed_deliveries(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }
}

impl Drop for SinkDriver {
    fn drop(&mut self) {
        debug!("Dropping sink driver");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayMode;
    use crate::test_utils::RecordingBackend;
    use crate::types::PixelFormat;

    fn sink_with(backend: &RecordingBackend) -> (Arc<FrameRelay>, SinkDriver, EventBus) {
        let relay = Arc::new(FrameRelay::new(8, 16));
        let events = EventBus::new();
        let sink = SinkDriver::new(
            Arc::clone(&relay),
            Arc::new(backend.clone()),
            events.clone(),
            Duration::from_secs(1),
        );
        (relay, sink, events)
    }

    #[tokio::test(start_paused = true)]
    async fn device_is_opened_once_and_repaced() {
        let backend = RecordingBackend::new();
        let (_relay, sink, _events) = sink_with(&backend);

        sink.initialize(8, 16, FrameRate::DEFAULT).unwrap();
        sink.initialize(8, 16, FrameRate::new(30, 1)).unwrap();

        assert_eq!(backend.opened(), vec![(8, 16, FrameRate::DEFAULT)]);
        assert_eq!(sink.frame_rate(), Some(FrameRate::new(30, 1)));
        assert!(sink.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_is_fatal_and_reported() {
        let backend = RecordingBackend::failing_open();
        let (_relay, sink, events) = sink_with(&backend);
        let mut rx = events.subscribe();

        let err = sink.initialize(8, 16, FrameRate::DEFAULT).unwrap_err();
        assert!(matches!(err, RelayError::SinkOpen { .. }));
        assert!(!err.is_retryable());
        assert!(!sink.is_open());
        assert!(matches!(rx.recv().await.unwrap(), RelayEvent::SinkFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn absurd_rate_keeps_sink_delivering() {
        let backend = RecordingBackend::new();
        let (_relay, sink, _events) = sink_with(&backend);
        sink.initialize(8, 16, FrameRate::DEFAULT).unwrap();
        sink.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let before = sink.delivered_count();

        sink.initialize(8, 16, FrameRate::new(u32::MAX, 1)).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(sink.is_running());
        assert_eq!(sink.frame_rate(), Some(FrameRate::DEFAULT));
        assert!(sink.delivered_count() >= before + 9, "{} -> {}", before, sink.delivered_count());
        sink.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn uninitialized_sink_delivers_nothing() {
        let backend = RecordingBackend::new();
        let (_relay, sink, _events) = sink_with(&backend);
        sink.start();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.delivered_count(), 0);
        sink.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn placeholders_are_paced_to_frame_rate() {
        let backend = RecordingBackend::new();
        let (relay, sink, _events) = sink_with(&backend);
        sink.initialize(8, 16, FrameRate::new(25, 1)).unwrap();
        sink.start();

        tokio::time::sleep(Duration::from_millis(1010)).await;
        sink.stop().await;

        let delivered = backend.delivered();
        assert!((25..=27).contains(&delivered.len()), "delivered {} frames", delivered.len());
        assert!(delivered.iter().all(|f| f.same_buffer(relay.placeholder())));
        assert!(backend.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn bgr_frames_are_converted_before_delivery() {
        let backend = RecordingBackend::new();
        let (relay, sink, events) = sink_with(&backend);
        let mut frames = events.subscribe_frames();
        sink.initialize(8, 16, FrameRate::DEFAULT).unwrap();
        relay.set_mode(RelayMode::Live);
        sink.start();

        relay.submit(Frame::solid(2, 2, PixelFormat::Bgr24, [1, 2, 3]));
        let delivered = frames.recv().await.unwrap();
        sink.stop().await;

        assert_eq!(delivered.frame().format(), PixelFormat::Rgb24);
        assert_eq!(delivered.frame().pixel(0, 0), Some([3, 2, 1]));
        assert_eq!(backend.delivered()[0].pixel(1, 1), Some([3, 2, 1]));
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_errors_do_not_stop_the_loop() {
        let backend = RecordingBackend::new();
        backend.fail_next_sends(3);
        let (_relay, sink, _events) = sink_with(&backend);
        sink.initialize(8, 16, FrameRate::DEFAULT).unwrap();
        sink.start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.failed_deliveries(), 3);
        assert!(sink.delivered_count() > 0);
        assert!(sink.is_running());
        sink.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_blocks_reinitialization() {
        let backend = RecordingBackend::new();
        let (_relay, sink, _events) = sink_with(&backend);
        sink.initialize(8, 16, FrameRate::DEFAULT).unwrap();
        sink.start();

        sink.stop().await;
        sink.stop().await;

        assert!(!sink.is_open());
        assert!(!sink.is_running());
        assert_eq!(sink.frame_rate(), None);
        assert!(sink.initialize(8, 16, FrameRate::DEFAULT).is_err());
    }
}
