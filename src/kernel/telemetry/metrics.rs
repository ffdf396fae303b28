use std::collections::VecDeque;

use super::event::{MediaKind, TelemetryEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub transitions: u64,
    pub connect_stats: ConnectStats,
    pub outbound_stats: OutboundStats,
    pub playback_stats: PlaybackStats,
    pub turns: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectStats {
    pub count: u64,
    pub total_latency_ms: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundStats {
    pub audio_sent: u64,
    pub video_sent: u64,
    pub dropped: u64,
    pub skipped_frames: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStats {
    pub scheduled: u64,
    pub max_lead_ms: u64,
    pub interruptions: u64,
    pub cut_sources: u64,
    pub malformed: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    for event in events {
        match event {
            TelemetryEvent::StateTransition { .. } => snap.transitions += 1,
            TelemetryEvent::Connected { latency_ms } => {
                snap.connect_stats.count += 1;
                snap.connect_stats.total_latency_ms += latency_ms;
                if *latency_ms > snap.connect_stats.max_latency_ms {
                    snap.connect_stats.max_latency_ms = *latency_ms;
                }
            }
            TelemetryEvent::Outbound { kind, sent } => match kind {
                MediaKind::Audio => snap.outbound_stats.audio_sent += sent,
                MediaKind::Video => snap.outbound_stats.video_sent += sent,
            },
            TelemetryEvent::OutboundDropped { count } => snap.outbound_stats.dropped += count,
            TelemetryEvent::FramesSkipped { count } => snap.outbound_stats.skipped_frames += count,
            TelemetryEvent::PlaybackScheduled { lead_ms } => {
                snap.playback_stats.scheduled += 1;
                if *lead_ms > snap.playback_stats.max_lead_ms {
                    snap.playback_stats.max_lead_ms = *lead_ms;
                }
            }
            TelemetryEvent::Interruption { cut_sources } => {
                snap.playback_stats.interruptions += 1;
                snap.playback_stats.cut_sources += *cut_sources as u64;
            }
            TelemetryEvent::MalformedAudio => snap.playback_stats.malformed += 1,
            TelemetryEvent::TurnComplete => snap.turns += 1,
            TelemetryEvent::SessionSummary { .. } => {}
        }
    }

    if snap.connect_stats.count > 0 {
        snap.connect_stats.avg_latency_ms =
            snap.connect_stats.total_latency_ms as f64 / snap.connect_stats.count as f64;
    }

    snap
}
