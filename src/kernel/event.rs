use crate::codec::EncodedBlob;

/// Which camera the Live view asks the platform for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacingMode {
    User,
    Environment,
}

impl FacingMode {
    pub fn flipped(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" | "rear" => Ok(FacingMode::Environment),
            other => Err(format!("unknown facing mode '{}'", other)),
        }
    }
}

/// Voice is audio-only; Camera adds the frame sampler and transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveMode {
    Voice,
    Camera(FacingMode),
}

impl LiveMode {
    pub fn facing(&self) -> Option<FacingMode> {
        match self {
            LiveMode::Voice => None,
            LiveMode::Camera(facing) => Some(*facing),
        }
    }
}

/// Inbound traffic from the remote session, already split into one
/// variant per concern. Order of arrival is order of dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    /// Base64 PCM exactly as received, tagged with its mime descriptor.
    AudioChunk(EncodedBlob),
    /// Model turn cut short by new user input (barge-in).
    Interrupted,
    TurnComplete,
    /// Incremental output transcription text.
    Transcription(String),
    Error(String),
    Closed(Option<String>),
}

/// UI-facing actions. All of them are funnelled into the reactor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start(LiveMode),
    Stop,
    /// Toggle semantics of the original single button.
    Toggle(LiveMode),
    SwitchCamera,
    Shutdown,
}
