use super::transport::EncodedBlob;
use crate::error::{LiveError, Result};

/// Descriptor attached to every outbound microphone frame.
pub const INPUT_MIME: &str = "audio/pcm;rate=16000";

const SCALE: f32 = 32768.0;

pub fn pcm_mime(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Float samples -> 16-bit LE PCM -> base64, tagged as 16 kHz input.
///
/// Samples are scaled by 32768 and truncated. Values outside [-1.0, 1.0)
/// wrap around like a plain integer store would; they are not clamped.
pub fn encode_frame(samples: &[f32]) -> EncodedBlob {
    EncodedBlob::new(&samples_to_pcm(samples), INPUT_MIME)
}

pub fn samples_to_pcm(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // f32 -> i32 truncates toward zero, i32 -> i16 wraps.
        let value = (sample * SCALE) as i32 as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// A decoded block of output audio, one float vector per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl PlaybackBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Length in seconds on the output clock.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Interleaves into `out_channels`, duplicating or folding as needed.
    pub fn interleaved(&self, out_channels: usize) -> Vec<f32> {
        let frames = self.frames();
        let src = self.channel_count().max(1);
        let mut out = Vec::with_capacity(frames * out_channels);
        for i in 0..frames {
            if src == out_channels {
                for ch in &self.channels {
                    out.push(ch[i]);
                }
            } else {
                let mixed: f32 =
                    self.channels.iter().map(|ch| ch[i]).sum::<f32>() / src as f32;
                out.extend(std::iter::repeat(mixed).take(out_channels));
            }
        }
        out
    }
}

/// 16-bit LE PCM -> de-interleaved floats in [-1.0, 1.0).
pub fn decode_frame(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<PlaybackBuffer> {
    let stride = 2 * channel_count as usize;
    if channel_count == 0 || bytes.len() % stride != 0 {
        return Err(LiveError::MalformedAudio {
            len: bytes.len(),
            channels: channel_count,
        });
    }

    let frames = bytes.len() / stride;
    let mut channels = vec![Vec::with_capacity(frames); channel_count as usize];
    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        channels[i % channel_count as usize].push(sample as f32 / SCALE);
    }

    Ok(PlaybackBuffer {
        sample_rate,
        channels,
    })
}
