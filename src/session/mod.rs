pub mod status;

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;

use crate::audio::AudioHost;
use crate::audio::buffer::AudioFrame;
use crate::audio::capture::FrameCallback;
use crate::audio::codec::InboundAudioChunk;
use crate::audio::scheduler::PlaybackScheduler;
use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::guard::ResourceGuard;
use crate::net::protocol::{ClientMessage, ServerMessage};
use crate::net::{Connector, TransportCommand, TransportEvent};
use crate::transcript::{SessionTranscript, Speaker, TranscriptTurn};

use self::status::{SessionState, SessionStatus, StatusSink};

/// How often the loop reaps finished playback and checks the watchdog.
const TICK: Duration = Duration::from_millis(50);

/// Everything held between a successful `start` and the end of the session.
struct ActiveSession<K, S> {
    scheduler: PlaybackScheduler<K, S>,
    commands: mpsc::Sender<TransportCommand>,
    events: mpsc::Receiver<TransportEvent>,
    frames: mpsc::Receiver<AudioFrame>,
    guard: ResourceGuard,
}

enum Step {
    Transport(Option<TransportEvent>),
    Frame(Option<AudioFrame>),
    Tick,
    Shutdown,
}

/// A duplex voice conversation with a remote model.
///
/// Microphone frames stream out while the remote's audio replies are laid
/// on the playback timeline and its transcript fragments are assembled
/// into turns. All state is mutated from one task; captured frames and
/// transport events reach it over channels.
pub struct VoiceSession<H: AudioHost, C> {
    host: H,
    connector: C,
    config: Config,
    status: Box<dyn StatusSink>,
    state: SessionState,
    transcript: SessionTranscript,
    active: Option<ActiveSession<H::Clock, H::Sink>>,
    watchdog: Option<Duration>,
    last_inbound_at: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
}

impl<H: AudioHost, C: Connector> VoiceSession<H, C> {
    pub fn new(host: H, connector: C, config: Config, status: Box<dyn StatusSink>) -> Self {
        Self {
            host,
            connector,
            config,
            status,
            state: SessionState::Idle,
            transcript: SessionTranscript::new(),
            active: None,
            watchdog: None,
            last_inbound_at: None,
            started_at: None,
        }
    }

    /// Acquire playback, capture and the remote channel, in that order.
    ///
    /// On failure everything acquired so far is released, the error is
    /// reported once and the session is back to `Idle`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(ParleyError::Other(format!(
                "session cannot start while {:?}",
                self.state
            )));
        }

        self.transcript.clear();
        self.set_state(SessionState::Connecting);

        match self.acquire().await {
            Ok(active) => {
                self.active = Some(active);
                self.started_at = Some(Utc::now());
                self.last_inbound_at = Some(Instant::now());
                tracing::info!("session resources acquired, waiting for remote");
                Ok(())
            }
            Err(e) => {
                tracing::error!("session start failed: {e}");
                self.status.report(&SessionStatus::Error(e.to_string()));
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    async fn acquire(&mut self) -> Result<ActiveSession<H::Clock, H::Sink>> {
        // Dropping the guard on an early return releases what was acquired.
        let mut guard = ResourceGuard::new();

        let output = self.host.open_output(&self.config.audio)?;
        guard.guard("playback", output.release);
        let scheduler = PlaybackScheduler::new(output.clock, output.sink);

        let (frame_tx, frames) = mpsc::channel(self.config.audio.capture_queue.max(1));
        let on_frame: FrameCallback = Box::new(move |frame: AudioFrame| {
            if let Err(TrySendError::Full(frame)) = frame_tx.try_send(frame) {
                tracing::warn!("session loop behind, dropping frame {}", frame.sequence);
            }
        });
        let capture = self.host.open_capture(&self.config.audio, on_frame)?;
        guard.guard("capture", capture);

        let link = self.connector.connect().await?;
        let close = link.commands.clone();
        guard.guard(
            "transport",
            Box::new(move || match close.try_send(TransportCommand::Close) {
                Ok(()) | Err(TrySendError::Closed(_)) => Ok(()),
                Err(TrySendError::Full(_)) => Err(ParleyError::Release(
                    "transport queue full, dropping link without close".to_string(),
                )),
            }),
        );

        Ok(ActiveSession {
            scheduler,
            commands: link.commands,
            events: link.events,
            frames,
            guard,
        })
    }

    /// Tear everything down and return to `Idle`. Safe to call in any
    /// state, any number of times.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        self.set_state(SessionState::Closing);
        active.scheduler.shutdown();
        let released = active.guard.release_all();
        drop(active);

        tracing::info!("session closed, released {released} resource(s)");
        self.set_state(SessionState::Idle);
    }

    /// Drive the session until it returns to `Idle`, either through the
    /// remote ending it or `shutdown` resolving.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let Some(active) = self.active.as_mut() else {
                break;
            };

            let step = tokio::select! {
                event = active.events.recv() => Step::Transport(event),
                frame = active.frames.recv() => Step::Frame(frame),
                _ = ticker.tick() => Step::Tick,
                () = &mut shutdown => Step::Shutdown,
            };

            match step {
                Step::Transport(Some(event)) => self.handle_transport_event(event),
                Step::Transport(None) => self.handle_transport_event(TransportEvent::Closed(None)),
                Step::Frame(Some(frame)) => self.handle_frame(&frame),
                Step::Frame(None) => {
                    self.fail(ParleyError::Acquisition("capture stream ended".to_string()));
                }
                Step::Tick => self.tick(),
                Step::Shutdown => {
                    tracing::info!("shutdown requested");
                    self.stop();
                }
            }
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                if self.state == SessionState::Connecting {
                    self.set_state(SessionState::Streaming);
                } else {
                    tracing::debug!("ignoring open while {:?}", self.state);
                }
            }
            TransportEvent::Message(text) => {
                self.last_inbound_at = Some(Instant::now());
                if self.state == SessionState::Streaming {
                    self.handle_message(&text);
                } else {
                    tracing::debug!("ignoring message while {:?}", self.state);
                }
            }
            TransportEvent::Error(msg) => {
                if self.active.is_some() {
                    self.fail(ParleyError::Transport(msg));
                }
            }
            TransportEvent::Closed(reason) => {
                if self.active.is_some() {
                    let msg = reason.map_or_else(
                        || "remote closed the session".to_string(),
                        |r| format!("remote closed the session: {r}"),
                    );
                    self.fail(ParleyError::Transport(msg));
                }
            }
        }
    }

    fn handle_message(&mut self, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("dropping message: {e}");
                return;
            }
        };

        if let Some(fragment) = &message.input_transcript_fragment {
            self.transcript.append(Speaker::User, fragment);
        }
        if let Some(fragment) = &message.output_transcript_fragment {
            self.transcript.append(Speaker::Model, fragment);
        }

        if message.turn_complete() {
            for turn in self.transcript.seal() {
                tracing::debug!("sealed {} turn ({} chars)", turn.speaker, turn.text.len());
                self.status.turn_sealed(&turn);
            }
        }

        if message.interrupted()
            && let Some(active) = self.active.as_mut()
        {
            active.scheduler.interrupt();
        }

        match message.audio_chunk(self.config.audio.output_sample_rate) {
            Ok(Some(chunk)) => self.play(&chunk),
            Ok(None) => {}
            Err(e) => tracing::warn!("dropping audio chunk: {e}"),
        }
    }

    fn play(&mut self, chunk: &InboundAudioChunk) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match active.scheduler.schedule(chunk) {
            Ok(_) => {}
            Err(ParleyError::Codec(msg)) => tracing::warn!("dropping audio chunk: {msg}"),
            Err(e) => {
                tracing::warn!("{e}");
                self.status.report(&SessionStatus::Warning(e.to_string()));
            }
        }
    }

    /// Encode and send one captured frame. Frames are only sent while
    /// streaming; a full outbound queue drops the frame.
    pub fn handle_frame(&mut self, frame: &AudioFrame) {
        if self.state != SessionState::Streaming {
            tracing::trace!("dropping frame {} while {:?}", frame.sequence, self.state);
            return;
        }
        let Some(active) = self.active.as_ref() else {
            return;
        };

        let json = match ClientMessage::audio(&frame.samples, frame.sample_rate).to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("dropping frame {}: {e}", frame.sequence);
                return;
            }
        };

        match active.commands.try_send(TransportCommand::Send(json)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("outbound queue full, dropping frame {}", frame.sequence);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("transport gone, dropping frame {}", frame.sequence);
            }
        }
    }

    /// Forget finished playback and enforce the watchdog, if one is set.
    pub fn tick(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.scheduler.reap();

        if let Some(limit) = self.watchdog
            && let Some(last) = self.last_inbound_at
            && last.elapsed() >= limit
        {
            self.fail(ParleyError::Transport(format!(
                "no message from remote for {:.1}s",
                limit.as_secs_f64()
            )));
        }
    }

    /// Fail the session after `limit` without any inbound message. Off
    /// unless set.
    pub fn set_watchdog(&mut self, limit: Option<Duration>) {
        self.watchdog = limit;
    }

    fn fail(&mut self, err: ParleyError) {
        tracing::error!("session failed: {err}");
        self.status.report(&SessionStatus::Error(err.to_string()));
        self.stop();
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        tracing::info!("session {:?} -> {state:?}", self.state);
        self.state = state;

        let status = match state {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Connecting => SessionStatus::Connecting,
            SessionState::Streaming => SessionStatus::Streaming,
            SessionState::Closing => SessionStatus::Closing,
        };
        self.status.report(&status);
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn transcript(&self) -> &SessionTranscript {
        &self.transcript
    }

    #[must_use]
    pub fn current_turn(&self, speaker: Speaker) -> Option<TranscriptTurn> {
        self.transcript.current_turn(speaker)
    }

    #[must_use]
    pub const fn last_inbound_at(&self) -> Option<Instant> {
        self.last_inbound_at
    }

    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Chunks queued or playing right now.
    #[must_use]
    pub fn active_playback(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.scheduler.active_len())
    }

    /// Resources still held, in acquisition order.
    #[must_use]
    pub fn held_resources(&self) -> Vec<&'static str> {
        self.active
            .as_ref()
            .map_or_else(Vec::new, |a| a.guard.pending())
    }
}
