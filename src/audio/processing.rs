use std::thread::JoinHandle;
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer};
use ringbuf::HeapCons;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::resample::StreamResampler;
use crate::codec::encode_frame;
use crate::error::{LiveError, Result};
use crate::services::live::OutboundQueue;

const READ_CHUNK: usize = 1024;
const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Cuts a continuous sample stream into fixed-size frames. Leftovers wait
/// for the next push.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

/// Microphone ring buffer -> 16 kHz frames -> outbound queue.
pub struct CapturePipeline {
    consumer: HeapCons<f32>,
    resampler: StreamResampler,
    frames: FrameAssembler,
    outbound: OutboundQueue,
    cancel: CancellationToken,
    source_rate: u32,
}

impl CapturePipeline {
    pub fn new(
        consumer: HeapCons<f32>,
        source_rate: u32,
        target_rate: u32,
        frame_size: usize,
        outbound: OutboundQueue,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            consumer,
            resampler: StreamResampler::new(source_rate, target_rate)?,
            frames: FrameAssembler::new(frame_size),
            outbound,
            cancel,
            source_rate,
        })
    }

    /// Moves the loop onto its own OS thread.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("capture-pipeline".into())
            .spawn(move || self.run())
            .map_err(|e| LiveError::DeviceAccess(e.to_string()))
    }

    /// Blocks until cancelled or the outbound queue closes.
    pub fn run(mut self) {
        info!(
            "capture pipeline started: {}Hz, resampling={}",
            self.source_rate,
            !self.resampler.is_passthrough()
        );

        // Samples captured before the session opened are stale.
        let stale = self.consumer.occupied_len();
        self.consumer.skip(stale);

        let mut chunk = vec![0.0f32; READ_CHUNK];
        let mut sent: u64 = 0;
        while !self.cancel.is_cancelled() && !self.outbound.is_closed() {
            let read = self.consumer.pop_slice(&mut chunk);
            if read == 0 {
                std::thread::sleep(IDLE_SLEEP);
                continue;
            }
            sent += self.drain(&chunk[..read]);
        }
        debug!(frames = sent, "capture pipeline stopped");
    }

    /// Pushes every completed frame; returns how many went out.
    fn drain(&mut self, samples: &[f32]) -> u64 {
        let resampled = self.resampler.process(samples);
        let mut sent = 0;
        for frame in self.frames.push(&resampled) {
            self.outbound.push(encode_frame(&frame));
            sent += 1;
        }
        sent
    }
}
