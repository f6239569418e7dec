use chrono::{DateTime, Utc};

/// A fixed-length block of mono capture samples.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub sequence: u64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub captured_at: DateTime<Utc>,
}

impl AudioFrame {
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Cuts a continuous mono sample stream into fixed-size frames.
///
/// Samples that do not fill a whole frame are carried over to the next
/// `feed`; a trailing partial block is discarded on shutdown.
pub struct FrameAccumulator {
    buffer: Vec<f32>,
    block_size: usize,
    sample_rate: u32,
    next_sequence: u64,
    block_start: DateTime<Utc>,
}

impl FrameAccumulator {
    #[must_use]
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(block_size),
            block_size,
            sample_rate,
            next_sequence: 0,
            block_start: Utc::now(),
        }
    }

    /// Feed samples and return any complete frames, oldest first.
    pub fn feed(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        if self.buffer.is_empty() {
            self.block_start = Utc::now();
        }

        self.buffer.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.buffer.len() >= self.block_size {
            let block: Vec<f32> = self.buffer.drain(..self.block_size).collect();
            frames.push(AudioFrame {
                sequence: self.next_sequence,
                samples: block,
                sample_rate: self.sample_rate,
                captured_at: self.block_start,
            });
            self.next_sequence += 1;
            self.block_start = Utc::now();
        }

        frames
    }

    /// Samples waiting for the next frame boundary.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub const fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }
}
