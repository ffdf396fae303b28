use std::collections::VecDeque;

use rubato::{FftFixedIn, Resampler};
use tracing::warn;

use crate::error::{LiveError, Result};

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

fn build(from: u32, to: u32, channels: usize) -> Result<FftFixedIn<f32>> {
    FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK, SUB_CHUNKS, channels)
        .map_err(|e| LiveError::Config(format!("resampler {}Hz -> {}Hz: {}", from, to, e)))
}

/// Continuous mono resampling for the capture path. Pass-through when the
/// rates already match.
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(from: u32, to: u32) -> Result<Self> {
        let inner = if from == to { None } else { Some(build(from, to, 1)?) };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.inner.as_mut() else {
            return input.to_vec();
        };

        self.pending.extend_from_slice(input);
        let mut out = Vec::new();
        loop {
            let need = resampler.input_frames_next();
            if self.pending.len() < need {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..need).collect();
            match resampler.process(&[chunk], None) {
                Ok(mut wave) => out.append(&mut wave[0]),
                Err(e) => {
                    warn!("capture resample failed: {}", e);
                    break;
                }
            }
        }
        out
    }
}

/// One-shot mono resampling of a whole block, delay compensated and trimmed
/// to `len * to / from` samples.
pub fn resample_block(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let mut resampler = build(from, to, 1)?;
    let expected = (input.len() as u64 * to as u64 / from as u64) as usize;
    let delay = resampler.output_delay();

    let mut out: Vec<f32> = Vec::with_capacity(expected + delay);
    let mut pos = 0;
    while out.len() < expected + delay {
        let need = resampler.input_frames_next();
        let mut chunk = vec![0.0f32; need];
        if pos < input.len() {
            let take = need.min(input.len() - pos);
            chunk[..take].copy_from_slice(&input[pos..pos + take]);
            pos += take;
        }
        let mut wave = resampler
            .process(&[chunk], None)
            .map_err(|e| LiveError::Config(format!("resample failed: {}", e)))?;
        out.append(&mut wave[0]);
    }

    Ok(out[delay..delay + expected].to_vec())
}

/// Converts a pull-driven interleaved stream between rates.
///
/// Sits between the mixer and the output device: one resampler sees the
/// whole mixed stream, so buffer boundaries never land on a filter edge.
pub struct OutputResampler {
    inner: FftFixedIn<f32>,
    channels: usize,
    block: Vec<f32>,
    ready: VecDeque<f32>,
}

impl OutputResampler {
    pub fn new(from: u32, to: u32, channels: u16) -> Result<Self> {
        let channels = channels.max(1) as usize;
        Ok(Self {
            inner: build(from, to, channels)?,
            channels,
            block: Vec::new(),
            ready: VecDeque::new(),
        })
    }

    /// Fills `out` with interleaved output, asking `source` for as many
    /// interleaved input blocks as that takes. Silence on failure.
    pub fn fill(&mut self, out: &mut [f32], mut source: impl FnMut(&mut [f32])) {
        while self.ready.len() < out.len() {
            let frames = self.inner.input_frames_next();
            self.block.clear();
            self.block.resize(frames * self.channels, 0.0);
            source(&mut self.block);

            let planar: Vec<Vec<f32>> = (0..self.channels)
                .map(|ch| self.block.iter().skip(ch).step_by(self.channels).copied().collect())
                .collect();
            let wave = match self.inner.process(&planar, None) {
                Ok(wave) => wave,
                Err(e) => {
                    warn!("output resample failed: {}", e);
                    break;
                }
            };
            let produced = wave.first().map_or(0, Vec::len);
            for frame in 0..produced {
                self.ready.extend(wave.iter().map(|channel| channel[frame]));
            }
        }
        for sample in out.iter_mut() {
            *sample = self.ready.pop_front().unwrap_or(0.0);
        }
    }
}
