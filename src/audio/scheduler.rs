use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::codec::InboundAudioChunk;
use crate::error::{ParleyError, Result};

/// Source of the current position on the playback timeline.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Identifies one scheduled chunk for its whole life on the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackId(pub u64);

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An output device that can start a buffer at a given timeline position
/// and stop it again.
pub trait AudioSink {
    /// Queue `chunk` to begin at `start_at` on the sink's clock.
    fn play_at(&mut self, id: PlaybackId, chunk: &InboundAudioChunk, start_at: Duration)
    -> Result<()>;

    /// Stop `id` immediately, whether it is waiting or already audible.
    fn stop(&mut self, id: PlaybackId);

    /// Ids whose playback ran to the end since the last call.
    fn drain_finished(&mut self) -> Vec<PlaybackId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPlayback {
    pub id: PlaybackId,
    pub start_at: Duration,
    pub duration: Duration,
}

impl ScheduledPlayback {
    #[must_use]
    pub fn end_at(&self) -> Duration {
        self.start_at + self.duration
    }
}

/// Places inbound chunks back to back on a virtual timeline.
///
/// Each chunk starts at `max(cursor, now)`, so early arrivals queue up
/// seamlessly behind the one playing and late arrivals play immediately
/// instead of being scheduled in the past. Cancellation stops everything in
/// flight and pulls the cursor back to the present.
pub struct PlaybackScheduler<C, S> {
    clock: C,
    sink: S,
    cursor: Duration,
    active: BTreeMap<PlaybackId, ScheduledPlayback>,
    next_id: u64,
}

impl<C: Clock, S: AudioSink> PlaybackScheduler<C, S> {
    pub const fn new(clock: C, sink: S) -> Self {
        Self {
            clock,
            sink,
            cursor: Duration::ZERO,
            active: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Schedule a chunk after everything already queued.
    ///
    /// Empty chunks and sink failures leave the cursor untouched.
    pub fn schedule(&mut self, chunk: &InboundAudioChunk) -> Result<ScheduledPlayback> {
        if chunk.is_empty() || chunk.sample_rate == 0 {
            return Err(ParleyError::Codec("empty audio chunk".to_string()));
        }

        let start_at = self.cursor.max(self.clock.now());
        let id = PlaybackId(self.next_id);
        self.next_id += 1;

        self.sink.play_at(id, chunk, start_at)?;

        let scheduled = ScheduledPlayback {
            id,
            start_at,
            duration: chunk.duration(),
        };
        self.cursor = scheduled.end_at();
        self.active.insert(id, scheduled);

        tracing::debug!(
            "scheduled {id} at {:.3}s for {:.3}s ({} active)",
            start_at.as_secs_f64(),
            scheduled.duration.as_secs_f64(),
            self.active.len()
        );

        Ok(scheduled)
    }

    /// Forget chunks the sink reports as played out. The cursor already
    /// accounts for them.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        for id in self.sink.drain_finished() {
            if self.active.remove(&id).is_some() {
                reaped += 1;
            }
        }
        reaped
    }

    /// Barge-in: hard-stop everything pending or playing and restart the
    /// timeline at the present.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        for id in std::mem::take(&mut self.active).into_keys() {
            self.sink.stop(id);
        }
        // Completions raced with the stop are stale now.
        let _ = self.sink.drain_finished();
        self.cursor = self.clock.now();

        if stopped > 0 {
            tracing::info!("interrupted playback, stopped {stopped} chunk(s)");
        }
        stopped
    }

    /// Teardown path; identical to an interruption and safe to repeat.
    pub fn shutdown(&mut self) {
        self.interrupt();
    }

    #[must_use]
    pub const fn cursor(&self) -> Duration {
        self.cursor
    }

    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// True when nothing is queued or audible.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }
}
