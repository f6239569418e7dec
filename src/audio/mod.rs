pub mod buffer;
pub mod capture;
pub mod codec;
pub mod device;
pub mod playback;
pub mod resample;
pub mod scheduler;

use cpal::traits::StreamTrait;

use crate::config::AudioConfig;
use crate::error::{ParleyError, Result};
use crate::guard::Release;

use self::capture::{CaptureStream, FrameCallback};
use self::playback::{CpalSink, DeviceClock};
use self::scheduler::{AudioSink, Clock};

/// An opened output context: the timeline clock, the sink that plays on
/// it, and the release that closes the underlying device stream.
pub struct OutputContext<C, S> {
    pub clock: C,
    pub sink: S,
    pub release: Release,
}

/// Host audio capabilities a voice session acquires on start.
pub trait AudioHost {
    type Clock: Clock;
    type Sink: AudioSink;

    /// Open the output-rate context used for playback.
    fn open_output(
        &mut self,
        config: &AudioConfig,
    ) -> Result<OutputContext<Self::Clock, Self::Sink>>;

    /// Start the microphone tap. Frames flow to `on_frame` until the
    /// returned release runs.
    fn open_capture(&mut self, config: &AudioConfig, on_frame: FrameCallback) -> Result<Release>;
}

/// Audio host backed by the system's default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalHost;

impl AudioHost for CpalHost {
    type Clock = DeviceClock;
    type Sink = CpalSink;

    fn open_output(&mut self, config: &AudioConfig) -> Result<OutputContext<DeviceClock, CpalSink>> {
        let output = playback::open_output(config)?;
        let stream = output.stream;

        Ok(OutputContext {
            clock: output.clock,
            sink: output.sink,
            release: Box::new(move || {
                let paused = stream
                    .pause()
                    .map_err(|e| ParleyError::Release(format!("failed to pause output stream: {e}")));
                drop(stream);
                paused
            }),
        })
    }

    fn open_capture(&mut self, config: &AudioConfig, on_frame: FrameCallback) -> Result<Release> {
        let mut capture = CaptureStream::start(config, on_frame)?;
        Ok(Box::new(move || capture.stop()))
    }
}
