//! Host-backed [`MediaDevices`]: cpal for audio, nokhwa for the camera when
//! built with the `camera` feature.

use ringbuf::HeapProd;

use crate::audio::{DeviceSink, MicrophoneCapture};
use crate::config::LiveConfig;
use crate::error::Result;
use crate::kernel::devices::{AudioSink, MediaDevices, MicrophoneTrack, VideoTrack};
use crate::kernel::event::FacingMode;

#[derive(Debug, Clone)]
pub struct SystemDevices {
    camera_user_index: u32,
    camera_environment_index: u32,
}

impl SystemDevices {
    pub fn from_config(config: &LiveConfig) -> Self {
        Self {
            camera_user_index: config.camera_index(FacingMode::User),
            camera_environment_index: config.camera_index(FacingMode::Environment),
        }
    }

    fn camera_index(&self, facing: FacingMode) -> u32 {
        match facing {
            FacingMode::User => self.camera_user_index,
            FacingMode::Environment => self.camera_environment_index,
        }
    }
}

impl MediaDevices for SystemDevices {
    fn open_microphone(
        &self,
        preferred_rate: u32,
        producer: HeapProd<f32>,
    ) -> Result<Box<dyn MicrophoneTrack>> {
        Ok(Box::new(MicrophoneCapture::open(preferred_rate, producer)?))
    }

    #[cfg(feature = "camera")]
    fn open_camera(&self, facing: FacingMode) -> Result<Box<dyn VideoTrack>> {
        let camera = crate::vision::CameraCapture::open(self.camera_index(facing))?;
        Ok(Box::new(camera))
    }

    #[cfg(not(feature = "camera"))]
    fn open_camera(&self, facing: FacingMode) -> Result<Box<dyn VideoTrack>> {
        Err(crate::error::LiveError::DeviceAccess(format!(
            "camera {} unavailable: built without the `camera` feature",
            self.camera_index(facing)
        )))
    }

    fn open_speaker(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(DeviceSink::open(sample_rate, channels)?))
    }
}
