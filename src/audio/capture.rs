use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use tracing::{error, info};

use crate::error::{LiveError, Result};
use crate::kernel::devices::MicrophoneTrack;

/// Default input device, down-mixed to mono and pushed into a ring buffer.
///
/// cpal streams are not `Send`, so the stream is built, played and dropped
/// on a dedicated thread. Dropping the capture stops it.
pub struct MicrophoneCapture {
    sample_rate: u32,
    live: Arc<AtomicBool>,
    stop_tx: Mutex<Option<Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MicrophoneCapture {
    pub fn open(preferred_rate: u32, producer: HeapProd<f32>) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let live = Arc::new(AtomicBool::new(false));

        let thread_live = live.clone();
        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let (stream, rate) = match build_input_stream(preferred_rate, producer) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                thread_live.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(rate));

                // Parks until stopped or the owner is gone.
                let _ = stop_rx.recv();
                drop(stream);
                thread_live.store(false, Ordering::SeqCst);
                info!("microphone released");
            })
            .map_err(|e| LiveError::DeviceAccess(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(Self {
                sample_rate,
                live,
                stop_tx: Mutex::new(Some(stop_tx)),
                thread: Mutex::new(Some(thread)),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(LiveError::DeviceAccess("capture thread exited early".into()))
            }
        }
    }
}

impl MicrophoneTrack for MicrophoneCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&self) {
        let stop = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(stop) = stop else {
            return;
        };
        let _ = stop.send(());
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn device_error(e: impl std::fmt::Display) -> LiveError {
    LiveError::DeviceAccess(e.to_string())
}

fn build_input_stream(
    preferred_rate: u32,
    mut producer: HeapProd<f32>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| LiveError::DeviceAccess("no input device available".into()))?;

    info!("audio input device: {}", device.name().unwrap_or_default());

    // Prefer the wire rate so the resampler stays out of the way.
    let mut selected = None;
    for range in device.supported_input_configs().map_err(device_error)? {
        let usable = matches!(
            range.sample_format(),
            cpal::SampleFormat::F32 | cpal::SampleFormat::I16
        );
        if usable
            && range.min_sample_rate().0 <= preferred_rate
            && range.max_sample_rate().0 >= preferred_rate
        {
            selected = Some(range.with_sample_rate(cpal::SampleRate(preferred_rate)));
            break;
        }
    }

    let config = match selected {
        Some(config) => config,
        None => device.default_input_config().map_err(device_error)?,
    };
    let rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    info!("audio input config: rate={}Hz channels={}", rate, channels);

    let err_fn = |err| error!("input stream error: {}", err);
    let mut mono: Vec<f32> = Vec::new();

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &_| {
                downmix(data, channels, &mut mono, |s| s);
                producer.push_slice(&mono);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _: &_| {
                downmix(data, channels, &mut mono, |s| s as f32 / 32768.0);
                producer.push_slice(&mono);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(LiveError::DeviceAccess(format!(
                "unsupported input sample format {:?}",
                other
            )))
        }
    }
    .map_err(device_error)?;

    stream.play().map_err(device_error)?;
    Ok((stream, rate))
}

/// Averages interleaved frames into `out`. A full ring buffer drops the
/// tail of the callback.
fn downmix<T: Copy>(data: &[T], channels: usize, out: &mut Vec<f32>, to_f32: impl Fn(T) -> f32) {
    out.clear();
    let channels = channels.max(1);
    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
        out.push(sum / frame.len() as f32);
    }
}
