//! Session telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer. The reactor never reads it
//! back to make a decision.
//!
//! # PRIVACY INVARIANT
//! Events carry counts, durations and state names only. Never audio, image
//! data or transcription text.

pub mod event;
pub mod metrics;
pub mod recorder;
