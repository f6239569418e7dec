use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, unbounded};

use super::codec::InboundAudioChunk;
use super::device;
use super::resample::Resampler;
use super::scheduler::{AudioSink, Clock, PlaybackId};
use crate::config::AudioConfig;
use crate::error::{ParleyError, Result};

/// Timeline position derived from the frames the output device has rendered.
#[derive(Debug, Clone)]
pub struct DeviceClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl DeviceClock {
    fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl Clock for DeviceClock {
    fn now(&self) -> Duration {
        frames_to_duration(self.frames_rendered(), self.sample_rate)
    }
}

fn frames_to_duration(frames: u64, rate: u32) -> Duration {
    Duration::from_nanos(frames.saturating_mul(1_000_000_000) / u64::from(rate))
}

fn duration_to_frames(at: Duration, rate: u32) -> u64 {
    (at.as_nanos() * u128::from(rate) / 1_000_000_000) as u64
}

enum Command {
    Play(Voice),
    Stop(PlaybackId),
}

struct Voice {
    id: PlaybackId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }

    fn sample_at(&self, frame: u64) -> Option<f32> {
        let offset = frame.checked_sub(self.start_frame)?;
        self.samples.get(offset as usize).copied()
    }
}

/// Renders scheduled voices into device buffers. Lives inside the output
/// callback; talks to the rest of the engine only through channels.
struct Mixer {
    voices: Vec<Voice>,
    commands: Receiver<Command>,
    finished: Sender<PlaybackId>,
    frames: Arc<AtomicU64>,
    channels: usize,
}

impl Mixer {
    fn render(&mut self, data: &mut [f32]) {
        let base = self.frames.load(Ordering::Acquire);

        for command in self.commands.try_iter() {
            match command {
                Command::Play(mut voice) => {
                    // A slot that already passed starts at the next rendered frame.
                    // The scheduler's cursor is not told, so the voice queued
                    // behind this one may overlap its tail by at most one
                    // device buffer.
                    voice.start_frame = voice.start_frame.max(base);
                    self.voices.push(voice);
                }
                Command::Stop(id) => self.voices.retain(|v| v.id != id),
            }
        }

        let mut rendered = 0u64;
        for (i, frame) in data.chunks_exact_mut(self.channels).enumerate() {
            let t = base + i as u64;
            let mixed: f32 = self.voices.iter().filter_map(|v| v.sample_at(t)).sum();
            frame.fill(mixed.clamp(-1.0, 1.0));
            rendered += 1;
        }

        let end = base + rendered;
        self.frames.store(end, Ordering::Release);

        let finished = &self.finished;
        self.voices.retain(|v| {
            if v.end_frame() <= end {
                let _ = finished.send(v.id);
                false
            } else {
                true
            }
        });
    }
}

/// Engine-side handle to the output stream.
pub struct CpalSink {
    commands: Sender<Command>,
    finished: Receiver<PlaybackId>,
    device_rate: u32,
}

impl AudioSink for CpalSink {
    fn play_at(
        &mut self,
        id: PlaybackId,
        chunk: &InboundAudioChunk,
        start_at: Duration,
    ) -> Result<()> {
        let samples = if chunk.sample_rate == self.device_rate {
            chunk.samples.clone()
        } else {
            Resampler::new(chunk.sample_rate, 1, self.device_rate)?.process_all(&chunk.samples)?
        };

        let voice = Voice {
            id,
            start_frame: duration_to_frames(start_at, self.device_rate),
            samples,
        };

        self.commands
            .send(Command::Play(voice))
            .map_err(|_| ParleyError::Playback("output stream is closed".to_string()))
    }

    fn stop(&mut self, id: PlaybackId) {
        if self.commands.send(Command::Stop(id)).is_err() {
            tracing::debug!("stop for {id} after output stream closed");
        }
    }

    fn drain_finished(&mut self) -> Vec<PlaybackId> {
        self.finished.try_iter().collect()
    }
}

/// An open output stream plus the clock and sink that drive it.
pub struct PlaybackOutput {
    pub stream: Stream,
    pub clock: DeviceClock,
    pub sink: CpalSink,
}

/// Open the configured output device and start it rendering silence.
pub fn open_output(config: &AudioConfig) -> Result<PlaybackOutput> {
    let device = device::output_device(config.output_device.as_deref())?;

    let supported = device.default_output_config().map_err(|e| {
        ParleyError::Acquisition(format!("failed to get default output config: {e}"))
    })?;

    let sample_rate = supported.sample_rate();
    let channels = supported.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let (command_tx, command_rx) = unbounded::<Command>();
    let (finished_tx, finished_rx) = unbounded::<PlaybackId>();
    let clock = DeviceClock::new(sample_rate);

    let mut mixer = Mixer {
        voices: Vec::new(),
        commands: command_rx,
        finished: finished_tx,
        frames: Arc::clone(&clock.frames),
        channels: usize::from(channels.max(1)),
    };

    let err_fn = |err: cpal::StreamError| {
        tracing::error!("output stream error: {err}");
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| mixer.render(data),
            err_fn,
            None,
        )
        .map_err(|e| ParleyError::Acquisition(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| ParleyError::Acquisition(format!("failed to start output stream: {e}")))?;

    tracing::debug!("output stream open: rate={sample_rate}, channels={channels}");

    Ok(PlaybackOutput {
        stream,
        clock,
        sink: CpalSink {
            commands: command_tx,
            finished: finished_rx,
            device_rate: sample_rate,
        },
    })
}
