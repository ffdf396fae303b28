use serde::Serialize;

/// Status of the single start/stop toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum LiveState {
    Idle,
    Connecting,
    Active,
    /// Carries the user-facing message.
    Error(String),
}

impl LiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveState::Idle => "idle",
            LiveState::Connecting => "connecting",
            LiveState::Active => "active",
            LiveState::Error(_) => "error",
        }
    }

    /// `start` is only honoured from here. Anything else ignores it.
    pub fn accepts_start(&self) -> bool {
        matches!(self, LiveState::Idle | LiveState::Error(_))
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, LiveState::Connecting | LiveState::Active)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            LiveState::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Strict state delta. The reactor mutates `LiveState` only through these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateDelta {
    Connect,
    Opened,
    Failed(String),
    Stopped,
}

impl LiveState {
    /// Applies `delta`, returning the new state, or `None` when the
    /// transition is not part of the machine (the caller ignores it).
    pub fn apply(&self, delta: &StateDelta) -> Option<LiveState> {
        use LiveState::*;
        match (self, delta) {
            (Idle | Error(_), StateDelta::Connect) => Some(Connecting),
            // Camera switch reconnects from Active.
            (Active, StateDelta::Connect) => Some(Connecting),
            (Connecting, StateDelta::Opened) => Some(Active),
            (Connecting | Active, StateDelta::Failed(msg)) => Some(Error(msg.clone())),
            (_, StateDelta::Stopped) => Some(Idle),
            _ => None,
        }
    }
}
