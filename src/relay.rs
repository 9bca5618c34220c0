//! Single-slot frame hand-off between ingestion and the sink
//!
//! The relay holds at most one pending frame. A new live frame replaces an
//! un-taken one (drop-oldest), so the sink always gets the freshest picture and
//! never works through a backlog. In placeholder mode live frames are rejected
//! and `take` yields the colour-bar placeholder instead.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::placeholder::PlaceholderGenerator;
use crate::types::Frame;

/// Which frames the relay hands to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// No live source; `take` yields the placeholder and `submit` is a no-op.
    #[default]
    Placeholder,
    /// Live frames are accepted and delivered.
    Live,
}

/// Counters for relay traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Live frames accepted into the slot
    pub submitted: u64,
    /// Accepted frames replaced before the sink took them
    pub dropped: u64,
    /// Frames refused because the relay was in placeholder mode
    pub rejected: u64,
    /// Frames handed to the sink, placeholders included
    pub taken: u64,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Frame>,
    mode: RelayMode,
    stats: RelayStats,
}

/// Bounded single-slot relay with drop-oldest backpressure
#[derive(Debug)]
pub struct FrameRelay {
    slot: Mutex<Slot>,
    available: Notify,
    placeholder: Frame,
}

impl FrameRelay {
    /// Create a relay in placeholder mode with a colour-bar frame of the given size
    pub fn new(placeholder_width: u32, placeholder_height: u32) -> Self {
        Self::with_placeholder(PlaceholderGenerator::generate(placeholder_width, placeholder_height))
    }

    /// Create a relay with a caller-supplied placeholder frame
    pub fn with_placeholder(placeholder: Frame) -> Self {
        Self { slot: Mutex::new(Slot::default()), available: Notify::new(), placeholder }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a live frame
    ///
    /// Returns `true` if the frame was accepted. A pending frame that the sink has
    /// not taken yet is discarded.
    pub fn submit(&self, frame: Frame) -> bool {
        {
            let mut slot = self.lock();
            if slot.mode == RelayMode::Placeholder {
                slot.stats.rejected += 1;
                trace!("Relay in placeholder mode, live frame ignored");
                return false;
            }
            if slot.pending.replace(frame).is_some() {
                slot.stats.dropped += 1;
                trace!("Replaced un-taken frame in relay");
            }
            slot.stats.submitted += 1;
        }
        self.available.notify_one();
        true
    }

    /// Wait up to `timeout` for a frame
    ///
    /// Returns `None` on timeout. In placeholder mode the placeholder is returned
    /// immediately.
    pub async fn take(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking the slot so a submit in between is not missed
            notified.as_mut().enable();

            if let Some(frame) = self.try_take() {
                return Some(frame);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Take a frame without waiting
    pub fn try_take(&self) -> Option<Frame> {
        let mut slot = self.lock();
        let frame = match slot.mode {
            RelayMode::Placeholder => Some(self.placeholder.clone()),
            RelayMode::Live => slot.pending.take(),
        };
        if frame.is_some() {
            slot.stats.taken += 1;
        }
        frame
    }

    /// Switch acceptance mode
    ///
    /// Entering placeholder mode discards any pending live frame so it cannot
    /// surface after the source is gone.
    pub fn set_mode(&self, mode: RelayMode) {
        {
            let mut slot = self.lock();
            if slot.mode == mode {
                return;
            }
            slot.mode = mode;
            if mode == RelayMode::Placeholder && slot.pending.take().is_some() {
                slot.stats.dropped += 1;
            }
        }
        debug!(?mode, "Relay mode changed");
        self.available.notify_one();
    }

    pub fn mode(&self) -> RelayMode {
        self.lock().mode
    }

    /// Whether a live frame is waiting to be taken
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Pending live frame, if any, without taking it
    pub fn peek(&self) -> Option<Frame> {
        self.lock().pending.clone()
    }

    pub fn stats(&self) -> RelayStats {
        self.lock().stats
    }

    /// The frame delivered while in placeholder mode
    pub fn placeholder(&self) -> &Frame {
        &self.placeholder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn live_frame(value: u8) -> Frame {
        Frame::solid(4, 4, PixelFormat::Rgb24, [value, value, value])
    }

    #[test]
    fn starts_in_placeholder_mode() {
        let relay = FrameRelay::new(8, 16);
        assert_eq!(relay.mode(), RelayMode::Placeholder);
        let frame = relay.try_take().expect("placeholder is always available");
        assert!(frame.same_buffer(relay.placeholder()));
    }

    #[test]
    fn submit_in_placeholder_mode_is_a_noop() {
        let relay = FrameRelay::new(8, 16);
        assert!(!relay.submit(live_frame(1)));
        assert!(!relay.has_pending());
        assert_eq!(relay.stats().rejected, 1);
    }

    #[test]
    fn newest_frame_wins() {
        let relay = FrameRelay::new(8, 16);
        relay.set_mode(RelayMode::Live);
        relay.submit(live_frame(1));
        relay.submit(live_frame(2));
        relay.submit(live_frame(3));

        assert_eq!(relay.try_take(), Some(live_frame(3)));
        assert_eq!(relay.try_take(), None);

        let stats = relay.stats();
        assert_eq!(stats.submitted, 3);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.taken, 1);
    }

    #[test]
    fn entering_placeholder_mode_discards_pending_frame() {
        let relay = FrameRelay::new(8, 16);
        relay.set_mode(RelayMode::Live);
        relay.submit(live_frame(9));
        relay.set_mode(RelayMode::Placeholder);
        relay.set_mode(RelayMode::Live);

        assert_eq!(relay.try_take(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn take_times_out_when_live_and_empty() {
        let relay = FrameRelay::new(8, 16);
        relay.set_mode(RelayMode::Live);

        let started = Instant::now();
        assert_eq!(relay.take(Duration::from_secs(1)).await, None);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn take_wakes_on_submit() {
        let relay = Arc::new(FrameRelay::new(8, 16));
        relay.set_mode(RelayMode::Live);

        let producer = Arc::clone(&relay);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            producer.submit(live_frame(42));
        });

        let started = Instant::now();
        let frame = relay.take(Duration::from_secs(1)).await;
        assert_eq!(frame, Some(live_frame(42)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn take_wakes_on_mode_change() {
        let relay = Arc::new(FrameRelay::new(8, 16));
        relay.set_mode(RelayMode::Live);

        let switcher = Arc::clone(&relay);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            switcher.set_mode(RelayMode::Placeholder);
        });

        let frame = relay.take(Duration::from_secs(5)).await.expect("placeholder after switch");
        assert!(frame.same_buffer(relay.placeholder()));
    }

    proptest! {
        #[test]
        fn prop_take_returns_most_recent_submission(values in prop::collection::vec(any::<u8>(), 1..50)) {
            let relay = FrameRelay::new(8, 16);
            relay.set_mode(RelayMode::Live);
            for &value in &values {
                relay.submit(live_frame(value));
            }
            let last = *values.last().unwrap();
            prop_assert_eq!(relay.try_take(), Some(live_frame(last)));
            prop_assert_eq!(relay.try_take(), None);
            prop_assert_eq!(relay.stats().dropped, values.len() as u64 - 1);
        }

        #[test]
        fn prop_placeholder_mode_leaves_slot_unchanged(values in prop::collection::vec(any::<u8>(), 0..50)) {
            let relay = FrameRelay::new(8, 16);
            for value in values {
                prop_assert!(!relay.submit(live_frame(value)));
            }
            prop_assert_eq!(relay.peek(), None);
            prop_assert_eq!(relay.stats().submitted, 0);
        }
    }
}
