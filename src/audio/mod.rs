pub mod capture;
pub mod output;
pub mod processing;
pub mod resample;

pub use capture::MicrophoneCapture;
pub use output::{DeviceSink, Mixer};
pub use processing::{CapturePipeline, FrameAssembler};
pub use resample::{resample_block, OutputResampler, StreamResampler};
