use std::time::Duration;
use thiserror::Error;

use crate::kernel::event::LiveMode;

/// Everything that can end (or degrade) a live session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LiveError {
    /// Microphone or camera could not be opened. Terminal, never retried.
    #[error("device access denied: {0}")]
    DeviceAccess(String),

    /// Transport failed to open, or failed during an established session.
    #[error("connection error: {0}")]
    Connection(String),

    /// Inbound PCM whose byte length does not fit the channel layout.
    #[error("malformed audio: {len} bytes do not split into 16-bit frames of {channels} channel(s)")]
    MalformedAudio { len: usize, channels: u16 },

    #[error("API key not configured")]
    MissingCredentials,

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Remote sent something that does not follow the streaming protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LiveError {
    /// Text shown next to the toggle when a session ends in `Error`.
    pub fn user_message(&self, mode: LiveMode) -> String {
        match self {
            LiveError::DeviceAccess(_) => match mode {
                LiveMode::Voice => {
                    "Microphone access denied. Please allow it in your browser settings.".to_string()
                }
                LiveMode::Camera(_) => "Camera/Mic access denied.".to_string(),
            },
            LiveError::Connection(_) => "Connection error. Please try again.".to_string(),
            LiveError::MissingCredentials => self.to_string(),
            other => match mode {
                LiveMode::Voice => other.to_string(),
                LiveMode::Camera(_) => "Failed to start session.".to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, LiveError>;
