//! Public API behaviour of the relay engine

use std::sync::{Arc, Mutex};
use std::time::Duration;

use camrelay::{
    Backoff, ConnectionState, Frame, FrameRate, FrameRelay, Orchestrator, OutputBackend,
    OutputDevice, PixelFormat, PlaceholderGenerator, RelayConfig, RelayError, RelayEvent, RelayMode,
    Resolution, SourceSession, StreamConfig, StreamSource,
};
use proptest::prelude::*;

/// Source that never answers
struct DeadSource;

#[async_trait::async_trait]
impl StreamSource for DeadSource {
    async fn connect(&self, config: &StreamConfig) -> camrelay::Result<Box<dyn SourceSession>> {
        Err(RelayError::source_failed(format!("{}: no route to host", config.url())))
    }
}

#[derive(Clone, Default)]
struct CountingBackend {
    sent: Arc<Mutex<Vec<Frame>>>,
}

struct CountingDevice {
    sent: Arc<Mutex<Vec<Frame>>>,
}

impl OutputBackend for CountingBackend {
    fn open(&self, _: u32, _: u32, _: FrameRate) -> camrelay::Result<Box<dyn OutputDevice>> {
        Ok(Box::new(CountingDevice { sent: Arc::clone(&self.sent) }))
    }
}

impl OutputDevice for CountingDevice {
    fn name(&self) -> &str {
        "counting"
    }

    fn send(&mut self, frame: &Frame) -> camrelay::Result<()> {
        self.sent.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn close(&mut self) {}
}

fn live(value: u8) -> Frame {
    Frame::solid(2, 2, PixelFormat::Bgr24, [value, 0, 0])
}

#[test]
fn placeholder_layout_at_default_resolution() {
    let frame = PlaceholderGenerator::generate(1920, 1080);
    assert_eq!(frame.data().len(), 1920 * 1080 * 3);
    // 1080 / 8 = 135 rows per band
    assert_eq!(frame.pixel(0, 0), Some([255, 255, 255]));
    assert_eq!(frame.pixel(1919, 134), Some([255, 255, 255]));
    assert_eq!(frame.pixel(0, 135), Some([255, 255, 0]));
    assert_eq!(frame.pixel(960, 6 * 135), Some([0, 0, 255]));
    assert_eq!(frame.pixel(0, 1079), Some([0, 0, 0]));
}

#[test]
fn frame_layout_is_validated() {
    let err = Frame::new(4, 4, PixelFormat::Rgb24, vec![0; 10]).unwrap_err();
    assert!(matches!(err, RelayError::FrameLayout { expected: 48, actual: 10, .. }));
}

#[tokio::test(start_paused = true)]
async fn relay_take_times_out_without_live_frames() {
    let relay = FrameRelay::new(8, 8);
    relay.set_mode(RelayMode::Live);
    assert_eq!(relay.take(Duration::from_secs(1)).await, None);
}

#[tokio::test(start_paused = true)]
async fn engine_shows_placeholder_when_source_is_dead() {
    let backend = CountingBackend::default();
    let config = RelayConfig { placeholder: Resolution { width: 32, height: 16 }, ..Default::default() };
    let engine = Orchestrator::new(Arc::new(DeadSource), Arc::new(backend.clone()), config).unwrap();
    let mut events = engine.subscribe();

    engine.start("rtsp://10.0.0.9/cam").await.unwrap();
    loop {
        if events.recv().await.unwrap() == RelayEvent::ConnectionLost {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(engine.status(), ConnectionState::Reconnecting);
    let sent = backend.sent.lock().unwrap().clone();
    assert!(sent.len() >= 10);
    assert!(sent.iter().all(|f| f == &PlaceholderGenerator::generate(32, 16)));

    engine.stop().await;
    assert_eq!(engine.status(), ConnectionState::Disconnected);
}

#[test]
fn invalid_config_is_rejected() {
    let config = RelayConfig { initial_backoff_ms: 5_000, max_backoff_ms: 1_000, ..Default::default() };
    let result = Orchestrator::new(Arc::new(DeadSource), Arc::new(CountingBackend::default()), config);
    assert!(matches!(result, Err(RelayError::Config { .. })));
}

proptest! {
    #[test]
    fn prop_live_relay_yields_latest(values in prop::collection::vec(any::<u8>(), 1..32)) {
        let relay = FrameRelay::new(8, 8);
        relay.set_mode(RelayMode::Live);
        for value in &values {
            relay.submit(live(*value));
        }
        let last = *values.last().unwrap();
        prop_assert_eq!(relay.try_take(), Some(live(last)));
        prop_assert_eq!(relay.try_take(), None);
    }

    #[test]
    fn prop_placeholder_relay_ignores_submissions(values in prop::collection::vec(any::<u8>(), 0..16)) {
        let relay = FrameRelay::new(8, 8);
        for value in values {
            prop_assert!(!relay.submit(live(value)));
            prop_assert!(!relay.has_pending());
        }
        let taken = relay.try_take();
        prop_assert_eq!(taken.as_ref(), Some(relay.placeholder()));
    }

    #[test]
    fn prop_placeholder_is_deterministic(width in 1u32..64, height in 0u32..64) {
        prop_assert_eq!(
            PlaceholderGenerator::generate(width, height),
            PlaceholderGenerator::generate(width, height)
        );
    }

    #[test]
    fn prop_backoff_sequence(failures in 0u32..20) {
        let mut backoff = Backoff::default();
        let mut expected = 1u64;
        for _ in 0..failures {
            expected = (expected * 2).min(32);
            prop_assert_eq!(backoff.record_failure(), Duration::from_secs(expected));
        }
        backoff.reset();
        prop_assert_eq!(backoff.current(), Duration::from_secs(1));
    }
}
