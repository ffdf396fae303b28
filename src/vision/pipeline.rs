use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, RgbImage};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::EncodedBlob;
use crate::error::{LiveError, Result};
use crate::kernel::devices::VideoTrack;
use crate::services::live::OutboundQueue;

pub const JPEG_MIME: &str = "image/jpeg";

/// RGB still -> JPEG -> base64 blob. `max_dimension` bounds the longest
/// edge; smaller frames are left alone.
pub fn encode_still(frame: &RgbImage, quality: u8, max_dimension: Option<u32>) -> Result<EncodedBlob> {
    let resized;
    let frame = match max_dimension {
        Some(max) if frame.width() > max || frame.height() > max => {
            let (w, h) = fit_within(frame.width(), frame.height(), max);
            resized = image::imageops::resize(frame, w, h, FilterType::Triangle);
            &resized
        }
        _ => frame,
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
        .map_err(|e| LiveError::Protocol(format!("jpeg encode failed: {}", e)))?;
    Ok(EncodedBlob::new(&jpeg, JPEG_MIME))
}

fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let max = max.max(1);
    if width >= height {
        let h = (height as u64 * max as u64 / width.max(1) as u64).max(1) as u32;
        (max, h)
    } else {
        let w = (width as u64 * max as u64 / height.max(1) as u64).max(1) as u32;
        (w, max)
    }
}

/// Periodically samples the camera's current frame onto the outbound queue.
///
/// At most one encode is in flight; a tick that lands while the previous
/// frame is still encoding is skipped rather than queued.
pub struct FrameSampler {
    track: Arc<dyn VideoTrack>,
    outbound: OutboundQueue,
    interval: Duration,
    quality: u8,
    max_dimension: Option<u32>,
    cancel: CancellationToken,
}

/// Running sampler. Dropping it does not stop the task; cancel the token.
pub struct SamplerHandle {
    task: JoinHandle<()>,
    skipped: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
}

impl SamplerHandle {
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl FrameSampler {
    pub fn new(
        track: Arc<dyn VideoTrack>,
        outbound: OutboundQueue,
        interval: Duration,
        quality: u8,
        max_dimension: Option<u32>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            track,
            outbound,
            interval,
            quality,
            max_dimension,
            cancel,
        }
    }

    pub fn spawn(self) -> SamplerHandle {
        let skipped = Arc::new(AtomicU64::new(0));
        let sent = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(self.run(skipped.clone(), sent.clone()));
        SamplerHandle {
            task,
            skipped,
            sent,
        }
    }

    async fn run(self, skipped: Arc<AtomicU64>, sent: Arc<AtomicU64>) {
        info!("frame sampler started: every {:?}", self.interval);

        let in_flight = Arc::new(AtomicBool::new(false));
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.outbound.is_closed() || !self.track.is_live() {
                break;
            }
            // No frame yet: the camera is still warming up.
            let Some(frame) = self.track.latest_frame() else {
                continue;
            };
            if in_flight.swap(true, Ordering::AcqRel) {
                skipped.fetch_add(1, Ordering::Relaxed);
                debug!("frame tick skipped, encode still running");
                continue;
            }

            let outbound = self.outbound.clone();
            let in_flight = in_flight.clone();
            let sent = sent.clone();
            let cancel = self.cancel.clone();
            let (quality, max_dimension) = (self.quality, self.max_dimension);
            tokio::task::spawn_blocking(move || {
                match encode_still(&frame, quality, max_dimension) {
                    Ok(blob) if !cancel.is_cancelled() => {
                        outbound.push(blob);
                        sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("dropping camera frame: {}", e),
                }
                in_flight.store(false, Ordering::Release);
            });
        }
        debug!(sent = sent.load(Ordering::Relaxed), "frame sampler stopped");
    }
}
