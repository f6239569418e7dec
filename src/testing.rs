//! Fakes for the host seams, shared by unit tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;

use crate::audio::buffer::AudioFrame;
use crate::audio::capture::FrameCallback;
use crate::audio::codec::InboundAudioChunk;
use crate::audio::scheduler::{AudioSink, Clock, PlaybackId};
use crate::audio::{AudioHost, OutputContext};
use crate::config::AudioConfig;
use crate::error::{ParleyError, Result};
use crate::guard::Release;
use crate::net::{Connector, TransportLink, TransportPeer};

/// Manually advanced timeline clock.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    now: Rc<Cell<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

#[derive(Debug, Default)]
struct SinkState {
    started: Vec<(PlaybackId, Duration)>,
    stopped: Vec<PlaybackId>,
    finished: Vec<PlaybackId>,
    fail_next: Option<String>,
}

/// Sink that records every call. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Rc<RefCell<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<(PlaybackId, Duration)> {
        self.state.borrow().started.clone()
    }

    pub fn stopped(&self) -> Vec<PlaybackId> {
        self.state.borrow().stopped.clone()
    }

    /// Mark `id` as played out; the next `drain_finished` reports it.
    pub fn finish(&self, id: PlaybackId) {
        self.state.borrow_mut().finished.push(id);
    }

    pub fn fail_next(&self, message: &str) {
        self.state.borrow_mut().fail_next = Some(message.to_string());
    }
}

impl AudioSink for RecordingSink {
    fn play_at(&mut self, id: PlaybackId, _chunk: &InboundAudioChunk, start_at: Duration) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(message) = state.fail_next.take() {
            return Err(ParleyError::Playback(message));
        }
        state.started.push((id, start_at));
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        self.state.borrow_mut().stopped.push(id);
    }

    fn drain_finished(&mut self) -> Vec<PlaybackId> {
        std::mem::take(&mut self.state.borrow_mut().finished)
    }
}

#[derive(Default)]
struct HostState {
    outputs_opened: usize,
    outputs_released: usize,
    captures_opened: usize,
    captures_released: usize,
    fail_output: Option<String>,
    fail_capture: Option<String>,
    fail_release: bool,
    on_frame: Option<FrameCallback>,
    sequence: u64,
    releases: Vec<&'static str>,
}

/// Audio host with counters for every acquisition and release.
#[derive(Clone, Default)]
pub struct FakeHost {
    pub clock: FakeClock,
    pub sink: RecordingSink,
    state: Rc<RefCell<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_output(&self, message: &str) {
        self.state.borrow_mut().fail_output = Some(message.to_string());
    }

    pub fn fail_capture(&self, message: &str) {
        self.state.borrow_mut().fail_capture = Some(message.to_string());
    }

    /// Make every release report an error after doing its work.
    pub fn fail_releases(&self) {
        self.state.borrow_mut().fail_release = true;
    }

    pub fn outputs_opened(&self) -> usize {
        self.state.borrow().outputs_opened
    }

    pub fn outputs_released(&self) -> usize {
        self.state.borrow().outputs_released
    }

    pub fn captures_opened(&self) -> usize {
        self.state.borrow().captures_opened
    }

    pub fn captures_released(&self) -> usize {
        self.state.borrow().captures_released
    }

    /// Device releases in the order they ran.
    pub fn releases(&self) -> Vec<&'static str> {
        self.state.borrow().releases.clone()
    }

    /// Deliver one captured frame, as the capture worker would. Returns
    /// false when no capture is open.
    pub fn push_frame(&self, samples: Vec<f32>, sample_rate: u32) -> bool {
        let mut state = self.state.borrow_mut();
        let sequence = state.sequence;
        let Some(on_frame) = state.on_frame.as_mut() else {
            return false;
        };
        on_frame(AudioFrame {
            sequence,
            samples,
            sample_rate,
            captured_at: Utc::now(),
        });
        state.sequence += 1;
        true
    }
}

impl AudioHost for FakeHost {
    type Clock = FakeClock;
    type Sink = RecordingSink;

    fn open_output(&mut self, _config: &AudioConfig) -> Result<OutputContext<FakeClock, RecordingSink>> {
        let mut state = self.state.borrow_mut();
        if let Some(message) = state.fail_output.take() {
            return Err(ParleyError::Acquisition(message));
        }
        state.outputs_opened += 1;

        let shared = Rc::clone(&self.state);
        let release: Release = Box::new(move || {
            let mut state = shared.borrow_mut();
            state.outputs_released += 1;
            state.releases.push("playback");
            if state.fail_release {
                return Err(ParleyError::Release("output close failed".to_string()));
            }
            Ok(())
        });

        Ok(OutputContext {
            clock: self.clock.clone(),
            sink: self.sink.clone(),
            release,
        })
    }

    fn open_capture(&mut self, _config: &AudioConfig, on_frame: FrameCallback) -> Result<Release> {
        let mut state = self.state.borrow_mut();
        if let Some(message) = state.fail_capture.take() {
            return Err(ParleyError::Acquisition(message));
        }
        state.captures_opened += 1;
        state.on_frame = Some(on_frame);

        let shared = Rc::clone(&self.state);
        Ok(Box::new(move || {
            let mut state = shared.borrow_mut();
            state.captures_released += 1;
            state.releases.push("capture");
            state.on_frame = None;
            if state.fail_release {
                return Err(ParleyError::Release("microphone release failed".to_string()));
            }
            Ok(())
        }))
    }
}

#[derive(Default)]
struct ConnectorState {
    connects: usize,
    fail_next: Option<String>,
    peer: Option<TransportPeer>,
}

/// Connector whose remote end is held by the test.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Rc<RefCell<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, message: &str) {
        self.state.borrow_mut().fail_next = Some(message.to_string());
    }

    pub fn connects(&self) -> usize {
        self.state.borrow().connects
    }

    /// The remote end of the most recent connection.
    pub fn take_peer(&self) -> TransportPeer {
        self.state
            .borrow_mut()
            .peer
            .take()
            .unwrap_or_else(|| panic!("no connection was made"))
    }
}

impl Connector for FakeConnector {
    async fn connect(&self) -> Result<TransportLink> {
        let mut state = self.state.borrow_mut();
        if let Some(message) = state.fail_next.take() {
            return Err(ParleyError::Acquisition(message));
        }
        state.connects += 1;
        let (link, peer) = TransportLink::pair(8);
        state.peer = Some(peer);
        Ok(link)
    }
}
