use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::audioadapter::Adapter;
use rubato::{Fft, FixedSync, Resampler as RubatoResampler};

use crate::error::{ParleyError, Result};

const CHUNK_SIZE: usize = 1024;

/// Resamples multi-channel audio to mono f32 at a target rate.
pub struct Resampler {
    inner: Option<Fft<f32>>,
    channels: u16,
    source_rate: u32,
    target_rate: u32,
    input_buf: Vec<f32>,
}

impl Resampler {
    pub fn new(source_rate: u32, channels: u16, target_rate: u32) -> Result<Self> {
        let needs_resample = source_rate != target_rate;

        let inner = if needs_resample {
            Some(
                Fft::new(
                    source_rate as usize,
                    target_rate as usize,
                    CHUNK_SIZE,
                    2, // sub_chunks
                    1, // output is always mono
                    FixedSync::Input,
                )
                .map_err(|e| ParleyError::Resample(format!("failed to create resampler: {e}")))?,
            )
        } else {
            None
        };

        Ok(Self {
            inner,
            channels,
            source_rate,
            target_rate,
            input_buf: Vec::new(),
        })
    }

    /// Process interleaved multi-channel samples into mono at the target rate.
    ///
    /// Input that does not fill a whole resampler chunk is held until the
    /// next call.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let mono = super::codec::downmix(interleaved, self.channels);

        if self.inner.is_none() {
            return Ok(mono);
        }

        self.input_buf.extend_from_slice(&mono);
        self.drain_full_chunks()
    }

    /// Resample a complete, self-contained buffer. The resampler's output
    /// delay is skipped and the tail is flushed with silence, so sample 0 of
    /// the result lines up with sample 0 of the input and the output length
    /// is exactly the rate-converted length.
    pub fn process_all(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let mono = super::codec::downmix(interleaved, self.channels);
        let (delay, frames_needed) = match &self.inner {
            Some(resampler) => (resampler.output_delay(), resampler.input_frames_next()),
            None => return Ok(mono),
        };
        if mono.is_empty() {
            return Ok(mono);
        }

        let expected = (mono.len() as u64 * u64::from(self.target_rate)
            / u64::from(self.source_rate)) as usize;

        self.input_buf.extend_from_slice(&mono);
        let remainder = self.input_buf.len() % frames_needed;
        if remainder != 0 {
            self.input_buf
                .resize(self.input_buf.len() + frames_needed - remainder, 0.0);
        }

        let mut output = self.drain_full_chunks()?;
        while output.len() < delay + expected {
            self.input_buf.resize(frames_needed, 0.0);
            let flushed = self.drain_full_chunks()?;
            if flushed.is_empty() {
                break;
            }
            output.extend(flushed);
        }

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);
        Ok(output)
    }

    fn drain_full_chunks(&mut self) -> Result<Vec<f32>> {
        let Some(ref mut resampler) = self.inner else {
            return Ok(std::mem::take(&mut self.input_buf));
        };

        let mut output = Vec::new();
        let frames_needed = resampler.input_frames_next();

        while self.input_buf.len() >= frames_needed {
            let chunk: Vec<f32> = self.input_buf.drain(..frames_needed).collect();
            // Wrap as 1-channel sequential buffer for rubato 1.0
            let input_data = vec![chunk];
            let input_buf = SequentialSliceOfVecs::new(&input_data, 1, frames_needed)
                .map_err(|e| ParleyError::Resample(format!("buffer error: {e}")))?;
            let result = resampler
                .process(&input_buf, 0, None)
                .map_err(|e| ParleyError::Resample(format!("resample error: {e}")))?;
            let out_frames = result.frames();
            for frame in 0..out_frames {
                output.push(result.read_sample(0, frame).unwrap_or(0.0));
            }
        }

        Ok(output)
    }

    #[must_use]
    pub const fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_same_rate_mono() {
        let mut r = Resampler::new(16000, 1, 16000).unwrap_or_else(|e| panic!("{e}"));
        let input: Vec<f32> = (0..1600).map(|i| (i as f32 / 1600.0).sin()).collect();
        let output = r.process(&input).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output, input);
    }

    #[test]
    fn stereo_to_mono() {
        let mut r = Resampler::new(16000, 2, 16000).unwrap_or_else(|e| panic!("{e}"));
        // Interleaved stereo: [L, R, L, R, ...]
        let input: Vec<f32> = (0..3200).map(|i| i as f32 / 3200.0).collect();
        let output = r.process(&input).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output.len(), 1600); // mono frames
    }

    #[test]
    fn process_all_trims_to_converted_length() {
        let mut r = Resampler::new(24000, 1, 48000).unwrap_or_else(|e| panic!("{e}"));
        let input = vec![0.25f32; 1500];
        let output = r.process_all(&input).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output.len(), 3000);
        assert_eq!(r.target_rate(), 48000);
    }

    #[test]
    fn process_all_is_aligned_with_input() {
        let mut r = Resampler::new(24000, 1, 48000).unwrap_or_else(|e| panic!("{e}"));
        let output = r.process_all(&[0.5f32; 1200]).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output.len(), 2400);

        let lead_silence = output.iter().take_while(|s| s.abs() < 0.01).count();
        assert_eq!(lead_silence, 0, "chunk starts with {lead_silence} silent frames");
        assert!(output[0] > 0.1, "first frame {}", output[0]);

        // Clear of the edge ringing, both ends carry the full signal.
        let len = output.len();
        for &i in &[32, len / 2, len - 33] {
            assert!((output[i] - 0.5).abs() < 0.05, "frame {i} is {}", output[i]);
        }
        assert!(output[len - 1] > 0.1, "last frame {}", output[len - 1]);
    }

    #[test]
    fn process_all_passthrough_keeps_length() {
        let mut r = Resampler::new(24000, 2, 24000).unwrap_or_else(|e| panic!("{e}"));
        let output = r.process_all(&[0.5; 20]).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output.len(), 10);
    }
}
