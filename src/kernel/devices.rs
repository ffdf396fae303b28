//! Platform device collaborators.
//!
//! The reactor only talks to devices through these traits. The cpal/nokhwa
//! backed implementations live in `audio` and `vision`; tests plug in fakes.
//! Every `stop`/`close` must be safe to call more than once.

use image::RgbImage;
use ringbuf::HeapProd;

use crate::codec::PlaybackBuffer;
use crate::error::Result;
use crate::kernel::event::FacingMode;

pub type SourceId = u64;

/// A live microphone feeding mono f32 samples into a ring buffer.
pub trait MicrophoneTrack: Send {
    /// Rate of the samples actually written, which may differ from the
    /// rate that was asked for.
    fn sample_rate(&self) -> u32;
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// A live camera. The sampler reads whatever frame is current.
pub trait VideoTrack: Send + Sync {
    fn latest_frame(&self) -> Option<RgbImage>;
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// Output audio graph with its own clock.
pub trait AudioSink: Send {
    /// Output clock position in seconds.
    fn current_time(&self) -> f64;
    /// Starts `buffer` at `start_time` on the output clock.
    fn schedule(&mut self, buffer: PlaybackBuffer, start_time: f64) -> SourceId;
    /// Stops a scheduled or playing source. Unknown ids are ignored.
    fn stop_source(&mut self, id: SourceId);
    /// Sources that reached their natural end since the last call.
    fn take_finished(&mut self) -> Vec<SourceId>;
    fn close(&mut self);
}

/// The platform's device-capture capability.
pub trait MediaDevices: Send + Sync {
    fn open_microphone(
        &self,
        preferred_rate: u32,
        producer: HeapProd<f32>,
    ) -> Result<Box<dyn MicrophoneTrack>>;

    fn open_camera(&self, facing: FacingMode) -> Result<Box<dyn VideoTrack>>;

    fn open_speaker(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn AudioSink>>;
}
