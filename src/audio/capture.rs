use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

use super::buffer::{AudioFrame, FrameAccumulator};
use super::device;
use super::resample::Resampler;
use crate::config::AudioConfig;
use crate::error::{ParleyError, Result};

/// Receives every completed capture frame, in capture order. Must not block.
pub type FrameCallback = Box<dyn FnMut(AudioFrame) + Send>;

const WORKER_POLL: Duration = Duration::from_millis(100);

/// Microphone tap that emits fixed-size mono frames at the capture rate.
///
/// The cpal callback only copies device buffers into a bounded channel; a
/// worker thread resamples them, cuts frames, and hands each one to the
/// frame callback.
pub struct CaptureStream {
    stream: Option<Stream>,
    worker: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl CaptureStream {
    pub fn start(config: &AudioConfig, on_frame: FrameCallback) -> Result<Self> {
        let device = device::input_device(config.input_device.as_deref())?;

        let supported = device.default_input_config().map_err(|e| {
            ParleyError::Acquisition(format!("failed to get default input config: {e}"))
        })?;

        let sample_rate = supported.sample_rate();
        let channels = supported.channels();

        let stream_config = StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        // Bounded channel; try_send in the audio callback so it never blocks
        let (tx, rx) = bounded::<Vec<f32>>(config.capture_queue);

        let err_fn = |err: cpal::StreamError| {
            tracing::error!("input stream error: {err}");
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if tx.try_send(data.to_vec()).is_err() {
                        tracing::trace!("capture queue full, dropping device buffer");
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| ParleyError::Acquisition(format!("failed to build input stream: {e}")))?;

        let capture_rate = config.capture_sample_rate;
        let accumulator = FrameAccumulator::new(config.block_size, capture_rate);
        let running = Arc::new(AtomicBool::new(true));

        let worker_running = Arc::clone(&running);
        let worker = std::thread::Builder::new()
            .name("parley-capture".to_string())
            .spawn(move || {
                let resampler = match Resampler::new(sample_rate, channels, capture_rate) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!("failed to create capture resampler: {e}");
                        return;
                    }
                };
                run_tap(&rx, &worker_running, resampler, accumulator, on_frame);
            })
            .map_err(|e| ParleyError::Acquisition(format!("failed to spawn capture worker: {e}")))?;

        let mut capture = Self {
            stream: Some(stream),
            worker: Some(worker),
            running,
        };

        if let Some(stream) = capture.stream.as_ref()
            && let Err(e) = stream.play()
        {
            let _ = capture.stop();
            return Err(ParleyError::Acquisition(format!(
                "failed to start input stream: {e}"
            )));
        }

        tracing::debug!(
            "capture started: device_rate={sample_rate}, channels={channels}, block={} @ {}Hz",
            config.block_size,
            config.capture_sample_rate
        );

        Ok(capture)
    }

    /// Disconnect the tap and wait for the worker to drain. Safe to call
    /// more than once.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        let paused = match self.stream.take() {
            Some(stream) => stream
                .pause()
                .map_err(|e| ParleyError::Release(format!("failed to pause input stream: {e}"))),
            None => Ok(()),
        };

        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("capture worker panicked");
        }

        paused
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("{e}");
        }
    }
}

fn run_tap(
    raw_rx: &Receiver<Vec<f32>>,
    running: &AtomicBool,
    mut resampler: Resampler,
    mut accumulator: FrameAccumulator,
    mut on_frame: FrameCallback,
) {
    while running.load(Ordering::SeqCst) {
        let raw = match raw_rx.recv_timeout(WORKER_POLL) {
            Ok(raw) => raw,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mono = match resampler.process(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("resample error: {e}");
                continue;
            }
        };

        for frame in accumulator.feed(&mono) {
            on_frame(frame);
        }
    }

    tracing::debug!(
        "capture worker exiting after {} frame(s)",
        accumulator.frames_emitted()
    );
}
