#[cfg(feature = "camera")]
pub mod camera;
pub mod pipeline;

#[cfg(feature = "camera")]
pub use camera::CameraCapture;
pub use pipeline::{encode_still, FrameSampler, SamplerHandle, JPEG_MIME};
