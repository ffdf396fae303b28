use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use ringbuf::traits::Split;
use ringbuf::{HeapCons, HeapRb};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Span};
use uuid::Uuid;

use super::cancel::CancellationRegistry;
use super::devices::{MediaDevices, MicrophoneTrack, VideoTrack};
use super::event::{Command, LiveMode, SessionEvent};
use super::scheduler::PlaybackScheduler;
use super::state::{LiveState, StateDelta};
use super::telemetry::event::{MediaKind, TelemetryEvent};
use super::telemetry::metrics::TelemetrySnapshot;
use super::telemetry::recorder::TelemetryRecorder;
use crate::audio::CapturePipeline;
use crate::codec::transport::pcm_rate;
use crate::codec::{decode_frame, EncodedBlob};
use crate::config::LiveConfig;
use crate::error::{LiveError, Result};
use crate::services::live::{Connector, SessionHandle, SessionSetup};
use crate::vision::{FrameSampler, SamplerHandle};

/// Microphone ring buffer, in samples. Several seconds at any common rate.
const RING_CAPACITY: usize = 1 << 18;

type ConnectResult = Result<(SessionHandle, mpsc::Receiver<SessionEvent>)>;

enum Internal {
    Connected { epoch: u64, result: ConnectResult },
}

/// Everything one session owns. Each slot is released at most once.
struct SessionResources {
    mode: LiveMode,
    started_at: Instant,
    microphone: Option<Box<dyn MicrophoneTrack>>,
    consumer: Option<HeapCons<f32>>,
    camera: Option<Arc<dyn VideoTrack>>,
    playback: Option<PlaybackScheduler>,
    handle: Option<SessionHandle>,
    events: Option<mpsc::Receiver<SessionEvent>>,
    pipeline: Option<JoinHandle<()>>,
    sampler: Option<SamplerHandle>,
    media_cancel: CancellationToken,
    transcript: String,
}

impl SessionResources {
    fn new(mode: LiveMode) -> Self {
        Self {
            mode,
            started_at: Instant::now(),
            microphone: None,
            consumer: None,
            camera: None,
            playback: None,
            handle: None,
            events: None,
            pipeline: None,
            sampler: None,
            media_cancel: CancellationToken::new(),
            transcript: String::new(),
        }
    }

    /// Session first, then devices, then the output graph. Safe on a
    /// partially acquired set.
    fn release(&mut self) {
        self.media_cancel.cancel();

        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        self.events = None;

        if let Some(pipeline) = self.pipeline.take() {
            if pipeline.join().is_err() {
                warn!("capture pipeline panicked");
            }
        }
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
        self.consumer = None;

        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
        if let Some(microphone) = self.microphone.take() {
            microphone.stop();
        }
        if let Some(mut playback) = self.playback.take() {
            playback.close();
        }
        self.transcript.clear();
    }
}

/// Session Lifecycle Manager.
///
/// Owns the state machine and every per-session resource. All mutation
/// happens on the task that drives [`SessionController::run`] (or `step`
/// in tests): UI commands, connect results and server events are funnelled
/// into one dispatch loop, and `LiveState` only changes through
/// [`StateDelta`]s.
pub struct SessionController {
    config: LiveConfig,
    connector: Arc<dyn Connector>,
    devices: Arc<dyn MediaDevices>,

    state: LiveState,
    mode: Option<LiveMode>,
    registry: CancellationRegistry,
    resources: Option<SessionResources>,

    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    status_tx: watch::Sender<LiveState>,
    transcript_tx: watch::Sender<String>,

    telemetry: TelemetryRecorder,
    span: Span,
}

impl SessionController {
    pub fn new(
        config: LiveConfig,
        connector: Arc<dyn Connector>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(LiveState::Idle);
        let (transcript_tx, _) = watch::channel(String::new());
        Self {
            config,
            connector,
            devices,
            state: LiveState::Idle,
            mode: None,
            registry: CancellationRegistry::new(),
            resources: None,
            internal_tx,
            internal_rx,
            status_tx,
            transcript_tx,
            telemetry: TelemetryRecorder::new(),
            span: Span::none(),
        }
    }

    pub fn state(&self) -> &LiveState {
        &self.state
    }

    pub fn mode(&self) -> Option<LiveMode> {
        self.mode
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.status_tx.subscribe()
    }

    /// Camera mode only ever publishes text here.
    pub fn transcript(&self) -> watch::Receiver<String> {
        self.transcript_tx.subscribe()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Scheduled-but-unfinished playback sources of the live session.
    pub fn pending_playback(&mut self) -> usize {
        self.resources
            .as_mut()
            .and_then(|r| r.playback.as_mut())
            .map_or(0, |playback| playback.pending())
    }

    /// Ignored unless `Idle` or `Error`.
    pub fn start(&mut self, mode: LiveMode) {
        if !self.state.accepts_start() {
            debug!(state = self.state.as_str(), "start ignored");
            return;
        }
        self.begin(mode);
    }

    /// Single cancellation entry point. Safe in every state, including
    /// mid-connect.
    pub fn stop(&mut self) {
        let _guard = self.span.clone().entered();
        self.registry.cancel();
        self.teardown();
        if self.state != LiveState::Idle {
            self.transition(StateDelta::Stopped);
        }
        self.transcript_tx.send_replace(String::new());
    }

    /// Flips the camera of an active camera session by rebuilding it.
    pub fn switch_camera(&mut self) {
        let Some(LiveMode::Camera(facing)) = self.mode else {
            return;
        };
        if self.state != LiveState::Active {
            debug!(state = self.state.as_str(), "camera switch ignored");
            return;
        }
        {
            let _guard = self.span.clone().entered();
            info!(from = ?facing, to = ?facing.flipped(), "switching camera");
            self.registry.cancel();
            self.teardown();
        }
        self.begin(LiveMode::Camera(facing.flipped()));
    }

    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(mode) => self.start(mode),
            Command::Stop | Command::Shutdown => self.stop(),
            Command::Toggle(mode) => {
                if self.state.is_busy() {
                    self.stop();
                } else {
                    self.start(mode);
                }
            }
            Command::SwitchCamera => self.switch_camera(),
        }
    }

    /// Waits for one connect result or server event and dispatches it.
    pub async fn step(&mut self) {
        tokio::select! {
            Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
            event = next_session_event(&mut self.resources) => self.handle_session_event(event),
        }
    }

    /// Dispatch loop. Returns after `Shutdown` or when every command sender
    /// is gone; the session is stopped either way.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("session controller started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                event = next_session_event(&mut self.resources) => self.handle_session_event(event),
            }
        }
        self.stop();
        info!("session controller stopped");
    }

    fn begin(&mut self, mode: LiveMode) {
        self.span = info_span!("session", id = %Uuid::new_v4(), mode = ?mode);
        let _guard = self.span.clone().entered();

        self.telemetry = TelemetryRecorder::new();
        self.mode = Some(mode);
        self.transcript_tx.send_replace(String::new());
        self.transition(StateDelta::Connect);

        let mut resources = SessionResources::new(mode);
        if let Err(e) = off_worker(|| self.acquire(&mut resources)) {
            off_worker(|| resources.release());
            self.fail(e);
            return;
        }
        self.resources = Some(resources);

        let attempt = self.registry.begin();
        let setup = SessionSetup {
            model: self.config.model.clone(),
            voice_name: self.config.voice_name.clone(),
            system_instruction: self.config.system_instruction(mode).to_string(),
            transcribe_output: self.config.wants_transcription(mode),
            outbound_capacity: self.config.outbound_capacity,
        };
        let connector = self.connector.clone();
        let tx = self.internal_tx.clone();
        let timeout = self.config.connect_timeout();

        tokio::spawn(async move {
            let result = tokio::select! {
                // Dropping the pending open tears down a half-open socket.
                _ = attempt.token.cancelled() => return,
                opened = tokio::time::timeout(timeout, connector.open(setup)) => {
                    opened.unwrap_or(Err(LiveError::ConnectTimeout(timeout)))
                }
            };
            let _ = tx.send(Internal::Connected {
                epoch: attempt.epoch,
                result,
            });
        });
        info!(epoch = attempt.epoch, "connecting");
    }

    fn acquire(&self, resources: &mut SessionResources) -> Result<()> {
        let (producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();
        resources.microphone = Some(
            self.devices
                .open_microphone(self.config.input_sample_rate, producer)?,
        );
        resources.consumer = Some(consumer);

        if let Some(facing) = resources.mode.facing() {
            resources.camera = Some(Arc::from(self.devices.open_camera(facing)?));
        }

        let sink = self
            .devices
            .open_speaker(self.config.output_sample_rate, self.config.output_channels)?;
        resources.playback = Some(PlaybackScheduler::new(sink));
        Ok(())
    }

    fn handle_internal(&mut self, internal: Internal) {
        let _guard = self.span.clone().entered();
        match internal {
            Internal::Connected { epoch, result } => {
                if !self.registry.is_current(epoch) || self.state != LiveState::Connecting {
                    // Dropping the handle closes the late session.
                    info!(epoch, "discarding stale connect result");
                    return;
                }
                match result {
                    Ok((handle, events)) => {
                        if let Err(e) = self.wire(handle, events) {
                            self.registry.cancel();
                            self.teardown();
                            self.fail(e);
                            return;
                        }
                        self.transition(StateDelta::Opened);
                    }
                    Err(e) => {
                        self.registry.cancel();
                        self.teardown();
                        self.fail(e);
                    }
                }
            }
        }
    }

    /// Connects capture to the session's send side and the session's
    /// receive side to playback.
    fn wire(&mut self, handle: SessionHandle, events: mpsc::Receiver<SessionEvent>) -> Result<()> {
        let Some(resources) = self.resources.as_mut() else {
            return Err(LiveError::Connection("session resources missing".into()));
        };

        let latency_ms = resources.started_at.elapsed().as_millis() as u64;
        self.telemetry.record(TelemetryEvent::Connected { latency_ms });
        info!(session = %handle.id(), latency_ms, "session open");

        let outbound = handle.outbound();
        resources.handle = Some(handle);
        resources.events = Some(events);

        let source_rate = resources
            .microphone
            .as_ref()
            .map_or(self.config.input_sample_rate, |m| m.sample_rate());
        if let Some(consumer) = resources.consumer.take() {
            let pipeline = CapturePipeline::new(
                consumer,
                source_rate,
                self.config.input_sample_rate,
                self.config.frame_size,
                outbound.clone(),
                resources.media_cancel.clone(),
            )?;
            resources.pipeline = Some(pipeline.spawn()?);
        }

        if let Some(camera) = resources.camera.clone() {
            let sampler = FrameSampler::new(
                camera,
                outbound,
                self.config.frame_interval(),
                self.config.jpeg_quality,
                self.config.max_frame_dimension,
                resources.media_cancel.clone(),
            );
            resources.sampler = Some(sampler.spawn());
        }
        Ok(())
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        let _guard = self.span.clone().entered();
        match event {
            SessionEvent::Opened => debug!("server acknowledged setup"),
            SessionEvent::AudioChunk(blob) => self.play(blob),
            SessionEvent::Interrupted => {
                let Some(playback) = self.resources.as_mut().and_then(|r| r.playback.as_mut())
                else {
                    return;
                };
                let cut_sources = playback.interrupt();
                info!(cut_sources, "model turn interrupted");
                self.telemetry
                    .record(TelemetryEvent::Interruption { cut_sources });
            }
            SessionEvent::Transcription(text) => {
                let Some(resources) = self.resources.as_mut() else {
                    return;
                };
                resources.transcript.push_str(&text);
                self.transcript_tx.send_replace(resources.transcript.clone());
            }
            SessionEvent::TurnComplete => {
                // The shown text stays until the next turn starts writing.
                if let Some(resources) = self.resources.as_mut() {
                    resources.transcript.clear();
                }
                self.telemetry.record(TelemetryEvent::TurnComplete);
            }
            SessionEvent::Error(message) => {
                warn!("session error: {}", message);
                self.registry.cancel();
                self.teardown();
                self.fail(LiveError::Connection(message));
            }
            SessionEvent::Closed(reason) => {
                info!(reason = reason.as_deref().unwrap_or(""), "session closed by server");
                drop(_guard);
                self.stop();
            }
        }
    }

    fn play(&mut self, blob: EncodedBlob) {
        let Some(playback) = self.resources.as_mut().and_then(|r| r.playback.as_mut()) else {
            return;
        };
        let rate = pcm_rate(&blob.mime_type).unwrap_or(self.config.output_sample_rate);
        let decoded = blob.bytes().and_then(|bytes| decode_frame(&bytes, rate, 1));
        match decoded {
            Ok(buffer) if buffer.is_empty() => {}
            Ok(buffer) => {
                let now = playback.current_time();
                let start = playback.enqueue(buffer);
                let lead_ms = ((start - now).max(0.0) * 1000.0) as u64;
                self.telemetry
                    .record(TelemetryEvent::PlaybackScheduled { lead_ms });
            }
            Err(e) => {
                warn!("skipping inbound audio: {}", e);
                self.telemetry.record(TelemetryEvent::MalformedAudio);
            }
        }
    }

    fn teardown(&mut self) {
        let Some(mut resources) = self.resources.take() else {
            return;
        };

        if let Some(handle) = resources.handle.as_ref() {
            let stats = handle.stats();
            self.telemetry.record(TelemetryEvent::Outbound {
                kind: MediaKind::Audio,
                sent: stats.audio_delivered,
            });
            self.telemetry.record(TelemetryEvent::Outbound {
                kind: MediaKind::Video,
                sent: stats.video_delivered,
            });
            if stats.dropped > 0 {
                warn!(dropped = stats.dropped, "outbound frames dropped under load");
                self.telemetry
                    .record(TelemetryEvent::OutboundDropped { count: stats.dropped });
            }
        }
        if let Some(sampler) = resources.sampler.as_ref() {
            let count = sampler.skipped();
            if count > 0 {
                self.telemetry.record(TelemetryEvent::FramesSkipped { count });
            }
        }

        off_worker(|| resources.release());

        let duration_ms = resources.started_at.elapsed().as_millis() as u64;
        let summary = self.telemetry.aggregate_session(duration_ms);
        info!(?summary, "session released");
    }

    fn fail(&mut self, error: LiveError) {
        let mode = self.mode.unwrap_or(LiveMode::Voice);
        error!("session failed: {}", error);
        self.transition(StateDelta::Failed(error.user_message(mode)));
    }

    fn transition(&mut self, delta: StateDelta) {
        match self.state.apply(&delta) {
            Some(next) => {
                let from = self.state.as_str();
                let to = next.as_str();
                info!(from, to, "state transition");
                self.telemetry
                    .record(TelemetryEvent::StateTransition { from, to });
                self.state = next;
                self.status_tx.send_replace(self.state.clone());
            }
            None => debug!(?delta, state = self.state.as_str(), "transition ignored"),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.registry.cancel();
        if let Some(mut resources) = self.resources.take() {
            off_worker(|| resources.release());
        }
    }
}

/// Device opens and thread joins block. On a multi-threaded runtime the
/// worker hands its other tasks off while `f` runs.
fn off_worker<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Pends forever while no session is wired. A receiver that ends without a
/// `Closed` is reported as one.
async fn next_session_event(resources: &mut Option<SessionResources>) -> SessionEvent {
    match resources.as_mut().and_then(|r| r.events.as_mut()) {
        Some(events) => events.recv().await.unwrap_or(SessionEvent::Closed(None)),
        None => std::future::pending().await,
    }
}
