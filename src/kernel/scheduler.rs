use std::collections::BTreeSet;

use tracing::debug;

use super::devices::{AudioSink, SourceId};
use crate::codec::PlaybackBuffer;

/// Gapless, ordered playback of inbound audio.
///
/// `next_start_time` is the playback clock: the end of the last enqueued
/// buffer. Every buffer starts at `max(next_start_time, sink.now)` and pushes
/// the clock forward by its own duration, so buffers never overlap and start
/// times never go backwards.
pub struct PlaybackScheduler<S: AudioSink + ?Sized = dyn AudioSink> {
    next_start_time: f64,
    pending: BTreeSet<SourceId>,
    sink: Box<S>,
}

impl<S: AudioSink + ?Sized> PlaybackScheduler<S> {
    pub fn new(sink: Box<S>) -> Self {
        Self {
            next_start_time: 0.0,
            pending: BTreeSet::new(),
            sink,
        }
    }

    /// Schedules `buffer` and returns its start time on the output clock.
    pub fn enqueue(&mut self, buffer: PlaybackBuffer) -> f64 {
        self.reap();

        let now = self.sink.current_time();
        let start = self.next_start_time.max(now);
        let duration = buffer.duration();

        let id = self.sink.schedule(buffer, start);
        self.next_start_time = start + duration;
        self.pending.insert(id);

        debug!(source = id, start, duration, "playback scheduled");
        start
    }

    /// Barge-in: silence everything queued and restart the clock.
    /// Returns how many sources were cut; already finished ones don't count.
    pub fn interrupt(&mut self) -> usize {
        self.reap();
        let cut = self.pending.len();
        for id in std::mem::take(&mut self.pending) {
            self.sink.stop_source(id);
        }
        self.next_start_time = 0.0;
        cut
    }

    /// Drops naturally finished sources from the pending set.
    pub fn reap(&mut self) {
        for id in self.sink.take_finished() {
            self.pending.remove(&id);
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Sources scheduled and not yet finished or stopped.
    pub fn pending(&mut self) -> usize {
        self.reap();
        self.pending.len()
    }

    pub fn current_time(&self) -> f64 {
        self.sink.current_time()
    }

    /// Stops all sources and closes the output graph. Idempotent.
    pub fn close(&mut self) {
        self.interrupt();
        self.sink.close();
    }
}
