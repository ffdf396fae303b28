//! Wire formats for the realtime stream.
//!
//! `pcm` knows about audio samples, `transport` only about bytes and text.

pub mod pcm;
pub mod transport;

pub use pcm::{decode_frame, encode_frame, PlaybackBuffer, INPUT_MIME};
pub use transport::EncodedBlob;
