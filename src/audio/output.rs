use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, warn};

use super::resample::{resample_block, OutputResampler};
use crate::codec::PlaybackBuffer;
use crate::error::{LiveError, Result};
use crate::kernel::devices::{AudioSink, SourceId};

struct Voice {
    id: SourceId,
    start_frame: u64,
    /// Interleaved at the mixer's channel count.
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self, channels: usize) -> u64 {
        self.start_frame + (self.samples.len() / channels) as u64
    }
}

/// Sample-accurate mixer driven by the output callback.
///
/// The clock is the number of frames rendered so far, so `current_time`
/// only advances while the device is pulling audio.
pub struct Mixer {
    sample_rate: u32,
    channels: usize,
    frames_rendered: u64,
    next_id: SourceId,
    voices: Vec<Voice>,
    finished: Vec<SourceId>,
}

impl Mixer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1) as usize,
            frames_rendered: 0,
            next_id: 1,
            voices: Vec::new(),
            finished: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// `samples` must already be interleaved at the mixer's layout.
    pub fn add(&mut self, samples: Vec<f32>, start_time: f64) -> SourceId {
        let id = self.next_id;
        self.next_id += 1;
        let start_frame = (start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
        id
    }

    pub fn stop(&mut self, id: SourceId) {
        self.voices.retain(|v| v.id != id);
    }

    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Fills one interleaved output block and advances the clock.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = self.channels;
        let frames = (out.len() / channels) as u64;
        let block_start = self.frames_rendered;
        let block_end = block_start + frames;

        for voice in &self.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame(channels).min(block_end);
            for frame in from..to {
                let src = ((frame - voice.start_frame) as usize) * channels;
                let dst = ((frame - block_start) as usize) * channels;
                for ch in 0..channels {
                    out[dst + ch] += voice.samples[src + ch];
                }
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.frames_rendered = block_end;
        let finished = &mut self.finished;
        self.voices.retain(|v| {
            if v.end_frame(channels) <= block_end {
                finished.push(v.id);
                false
            } else {
                true
            }
        });
    }

    pub fn take_finished(&mut self) -> Vec<SourceId> {
        std::mem::take(&mut self.finished)
    }
}

/// Default output device behind a shared [`Mixer`].
pub struct DeviceSink {
    mixer: Arc<Mutex<Mixer>>,
    live: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceSink {
    /// Mixes at `preferred_rate`. The device runs at that rate when it can,
    /// else at its default rate behind a streaming [`OutputResampler`].
    pub fn open(preferred_rate: u32, channels: u16) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<Mutex<Mixer>>>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let live = Arc::new(AtomicBool::new(false));

        let thread_live = live.clone();
        let thread = std::thread::Builder::new()
            .name("speaker".into())
            .spawn(move || {
                let (stream, mixer) = match build_output_stream(preferred_rate, channels) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                thread_live.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(mixer));

                let _ = stop_rx.recv();
                drop(stream);
                thread_live.store(false, Ordering::SeqCst);
                info!("speaker released");
            })
            .map_err(|e| LiveError::DeviceAccess(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(mixer)) => Ok(Self {
                mixer,
                live,
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(LiveError::DeviceAccess("speaker thread exited early".into()))
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn mixer(&self) -> std::sync::MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioSink for DeviceSink {
    fn current_time(&self) -> f64 {
        self.mixer().current_time()
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_time: f64) -> SourceId {
        let (rate, channels) = {
            let mixer = self.mixer();
            (mixer.sample_rate(), mixer.channels())
        };
        // Only buffers tagged with a rate other than the mixing rate.
        let converted = if buffer.sample_rate == rate {
            buffer
        } else {
            let mut resampled = Vec::with_capacity(buffer.channel_count());
            for channel in &buffer.channels {
                match resample_block(channel, buffer.sample_rate, rate) {
                    Ok(samples) => resampled.push(samples),
                    Err(e) => {
                        warn!("playback resample failed: {}", e);
                        resampled.push(Vec::new());
                    }
                }
            }
            PlaybackBuffer {
                sample_rate: rate,
                channels: resampled,
            }
        };
        let samples = converted.interleaved(channels as usize);
        self.mixer().add(samples, start_time)
    }

    fn stop_source(&mut self, id: SourceId) {
        self.mixer().stop(id);
    }

    fn take_finished(&mut self) -> Vec<SourceId> {
        self.mixer().take_finished()
    }

    fn close(&mut self) {
        let Some(stop) = self.stop_tx.take() else {
            return;
        };
        let _ = stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Output callback state: the shared mixer, plus a rate converter when the
/// device does not run at the mixing rate.
struct Renderer {
    mixer: Arc<Mutex<Mixer>>,
    resampler: Option<OutputResampler>,
}

impl Renderer {
    fn new(mixer: Arc<Mutex<Mixer>>, mix_rate: u32, device_rate: u32, channels: u16) -> Result<Self> {
        let resampler = if mix_rate == device_rate {
            None
        } else {
            Some(OutputResampler::new(mix_rate, device_rate, channels)?)
        };
        Ok(Self { mixer, resampler })
    }

    fn render(&mut self, out: &mut [f32]) {
        let mixer = &self.mixer;
        match self.resampler.as_mut() {
            None => mixer.lock().unwrap_or_else(PoisonError::into_inner).render(out),
            Some(resampler) => resampler.fill(out, |block| {
                mixer.lock().unwrap_or_else(PoisonError::into_inner).render(block)
            }),
        }
    }
}

fn device_error(e: impl std::fmt::Display) -> LiveError {
    LiveError::DeviceAccess(e.to_string())
}

fn build_output_stream(
    preferred_rate: u32,
    channels: u16,
) -> Result<(cpal::Stream, Arc<Mutex<Mixer>>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| LiveError::DeviceAccess("no output device available".into()))?;

    info!("audio output device: {}", device.name().unwrap_or_default());

    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(device_error)?
        .collect();
    let selected = ranges
        .iter()
        .filter(|range| {
            matches!(
                range.sample_format(),
                cpal::SampleFormat::F32 | cpal::SampleFormat::I16
            ) && range.min_sample_rate().0 <= preferred_rate
                && range.max_sample_rate().0 >= preferred_rate
        })
        .min_by_key(|range| {
            (
                range.channels() != channels,
                range.sample_format() != cpal::SampleFormat::F32,
            )
        })
        .map(|range| range.clone().with_sample_rate(cpal::SampleRate(preferred_rate)));
    let config = match selected {
        Some(config) => config,
        None => device.default_output_config().map_err(device_error)?,
    };
    let device_rate = config.sample_rate().0;
    info!(
        "audio output config: rate={}Hz channels={} mixing at {}Hz",
        device_rate,
        config.channels(),
        preferred_rate
    );

    let mixer = Arc::new(Mutex::new(Mixer::new(preferred_rate, config.channels())));
    let renderer = Renderer::new(mixer.clone(), preferred_rate, device_rate, config.channels())?;
    let err_fn = |err| error!("output stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let mut renderer = renderer;
            device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &_| renderer.render(data),
                err_fn,
                None,
            )
        }
        cpal::SampleFormat::I16 => {
            let mut renderer = renderer;
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config.into(),
                move |data: &mut [i16], _: &_| {
                    scratch.resize(data.len(), 0.0);
                    renderer.render(&mut scratch);
                    for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                        *out = (s * i16::MAX as f32) as i16;
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(LiveError::DeviceAccess(format!(
                "unsupported output sample format {:?}",
                other
            )))
        }
    }
    .map_err(device_error)?;

    stream.play().map_err(device_error)?;
    Ok((stream, mixer))
}
