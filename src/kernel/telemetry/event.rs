use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TelemetryEvent {
    StateTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Start request to `setupComplete`.
    Connected {
        latency_ms: u64,
    },

    /// Outbound totals, recorded once per session at teardown.
    Outbound {
        kind: MediaKind,
        sent: u64,
    },

    /// Frames evicted by the drop-oldest queue.
    OutboundDropped {
        count: u64,
    },

    /// Video ticks skipped because the previous encode was still running.
    FramesSkipped {
        count: u64,
    },

    PlaybackScheduled {
        lead_ms: u64,
    },

    Interruption {
        cut_sources: usize,
    },

    MalformedAudio,

    TurnComplete,

    SessionSummary {
        duration_ms: u64,
        interruptions: u64,
        turns: u64,
        dropped_frames: u64,
    },
}
