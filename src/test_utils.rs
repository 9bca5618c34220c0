//! Scripted stream sources and recording output devices for tests
//!
//! [`ScriptedSource`] plays back a queue of connection outcomes so reconnection
//! behaviour can be driven deterministically, and tracks how many sessions are
//! open at any moment. [`RecordingBackend`] captures everything the sink sends.

#![cfg(any(test, feature = "test-utils"))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::StreamConfig;
use crate::output::{OutputBackend, OutputDevice};
use crate::source::{Packet, SourceSession, StreamSource};
use crate::types::{Frame, FrameRate, PixelFormat};
use crate::{RelayError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Small solid RGB frame whose colour identifies it
pub fn marker_frame(value: u8) -> Frame {
    Frame::solid(4, 4, PixelFormat::Rgb24, [value, value, value])
}

/// One step of a scripted session
#[derive(Debug, Clone)]
pub enum SessionStep {
    /// A packet that decodes into these results
    Packet { dts: Option<i64>, frames: Vec<Option<Frame>> },
    /// A packet the decoder rejects
    DecodeError,
    /// The transport fails on read
    ReadError,
}

/// What happens once the scripted steps run out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// `read_packet` returns `Ok(None)`
    Eof,
    /// `read_packet` never returns
    Hang,
}

/// Script for one accepted connection
#[derive(Debug, Clone)]
pub struct SessionScript {
    rate: Option<FrameRate>,
    steps: VecDeque<SessionStep>,
    end: SessionEnd,
}

impl SessionScript {
    pub fn new(rate: Option<FrameRate>) -> Self {
        Self { rate, steps: VecDeque::new(), end: SessionEnd::Hang }
    }

    /// One packet per frame, each with a valid timestamp
    pub fn frames(mut self, frames: impl IntoIterator<Item = Frame>) -> Self {
        for frame in frames {
            let dts = self.steps.len() as i64;
            self.steps.push_back(SessionStep::Packet { dts: Some(dts), frames: vec![Some(frame)] });
        }
        self
    }

    pub fn step(mut self, step: SessionStep) -> Self {
        self.steps.push_back(step);
        self
    }

    pub fn then(mut self, end: SessionEnd) -> Self {
        self.end = end;
        self
    }
}

#[derive(Debug, Clone)]
enum ConnectScript {
    Refuse(String),
    Stall,
    Accept(SessionScript),
}

#[derive(Debug, Default)]
struct SourceState {
    script: VecDeque<ConnectScript>,
    seen_options: Vec<Vec<(String, String)>>,
}

/// Stream source that plays back a script of connection outcomes
///
/// Once the script is exhausted every connect is refused.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
    attempts: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self, reason: &str) -> &Self {
        lock(&self.state).script.push_back(ConnectScript::Refuse(reason.to_string()));
        self
    }

    /// Next connect never completes
    pub fn stall(&self) -> &Self {
        lock(&self.state).script.push_back(ConnectScript::Stall);
        self
    }

    pub fn accept(&self, session: SessionScript) -> &Self {
        lock(&self.state).script.push_back(ConnectScript::Accept(session));
        self
    }

    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed or dropped
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Options passed to each connect, in order
    pub fn seen_options(&self) -> Vec<Vec<(String, String)>> {
        lock(&self.state).seen_options.clone()
    }
}

#[async_trait::async_trait]
impl StreamSource for ScriptedSource {
    async fn connect(&self, config: &StreamConfig) -> Result<Box<dyn SourceSession>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut state = lock(&self.state);
            state.seen_options.push(config.options());
            state.script.pop_front()
        };

        match next {
            None => Err(RelayError::source_failed(format!("{}: connection refused", config.url()))),
            Some(ConnectScript::Refuse(reason)) => Err(RelayError::source_failed(reason)),
            Some(ConnectScript::Stall) => futures::future::pending().await,
            Some(ConnectScript::Accept(script)) => {
                self.open_sessions.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(ScriptedSession {
                    script,
                    decoded: None,
                    open_sessions: Arc::clone(&self.open_sessions),
                    closed: false,
                }))
            }
        }
    }
}

struct ScriptedSession {
    script: SessionScript,
    decoded: Option<Result<Vec<Option<Frame>>>>,
    open_sessions: Arc<AtomicUsize>,
    closed: bool,
}

impl ScriptedSession {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl SourceSession for ScriptedSession {
    fn average_rate(&self) -> Option<FrameRate> {
        self.script.rate
    }

    async fn read_packet(&mut self) -> Result<Option<Packet>> {
        match self.script.steps.pop_front() {
            Some(SessionStep::Packet { dts, frames }) => {
                self.decoded = Some(Ok(frames));
                Ok(Some(Packet::new(dts, 0, vec![0u8; 16])))
            }
            Some(SessionStep::DecodeError) => {
                self.decoded = Some(Err(RelayError::source_failed("invalid data found when decoding")));
                Ok(Some(Packet::new(Some(0), 0, vec![0u8; 16])))
            }
            Some(SessionStep::ReadError) => Err(RelayError::source_failed("connection reset by peer")),
            None => match self.script.end {
                SessionEnd::Eof => Ok(None),
                SessionEnd::Hang => futures::future::pending().await,
            },
        }
    }

    fn decode(&mut self, _packet: &Packet) -> Result<Vec<Option<Frame>>> {
        self.decoded.take().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Default)]
struct BackendState {
    opened: Vec<(u32, u32, FrameRate)>,
    delivered: Vec<Frame>,
    closed: bool,
    fail_open: bool,
    fail_sends: u32,
}

/// Output backend that records every open and every frame sent
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<BackendState>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose `open` always fails
    pub fn failing_open() -> Self {
        let backend = Self::default();
        lock(&backend.state).fail_open = true;
        backend
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&self, count: u32) {
        lock(&self.state).fail_sends = count;
    }

    pub fn opened(&self) -> Vec<(u32, u32, FrameRate)> {
        lock(&self.state).opened.clone()
    }

    pub fn delivered(&self) -> Vec<Frame> {
        lock(&self.state).delivered.clone()
    }

    pub fn closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl OutputBackend for RecordingBackend {
    fn open(&self, width: u32, height: u32, rate: FrameRate) -> Result<Box<dyn OutputDevice>> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(RelayError::sink_open_failed("no virtual camera device found"));
        }
        state.opened.push((width, height, rate));
        state.closed = false;
        Ok(Box::new(RecordingDevice { state: Arc::clone(&self.state) }))
    }
}

struct RecordingDevice {
    state: Arc<Mutex<BackendState>>,
}

impl OutputDevice for RecordingDevice {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(RelayError::delivery_failed("device rejected frame"));
        }
        state.delivered.push(frame.clone());
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.state).closed = true;
    }
}
