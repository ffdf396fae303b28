#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use ringbuf::traits::Producer;
use ringbuf::HeapProd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use solo_live::codec::PlaybackBuffer;
use solo_live::error::{LiveError, Result};
use solo_live::kernel::devices::{AudioSink, MediaDevices, MicrophoneTrack, SourceId, VideoTrack};
use solo_live::kernel::event::{FacingMode, SessionEvent};
use solo_live::services::live::{Connector, OutboundQueue, SessionHandle, SessionSetup};
use solo_live::LiveConfig;

pub fn test_config() -> LiveConfig {
    LiveConfig {
        api_key: "test-key".to_string(),
        ..LiveConfig::default()
    }
}

// ---------------------------------------------------------------- sink

#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled {
    pub id: SourceId,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub now: f64,
    pub next_id: SourceId,
    pub scheduled: Vec<Scheduled>,
    pub stopped: Vec<SourceId>,
    pub finished: Vec<SourceId>,
    pub closed: bool,
}

/// Output graph with a hand-driven clock.
pub struct FakeSink {
    pub log: Arc<Mutex<SinkLog>>,
}

impl FakeSink {
    pub fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        (
            Self { log: log.clone() },
            log,
        )
    }
}

pub fn set_now(log: &Arc<Mutex<SinkLog>>, now: f64) {
    log.lock().unwrap().now = now;
}

/// Marks every scheduled source that ends by `now` as finished.
pub fn finish_until(log: &Arc<Mutex<SinkLog>>, now: f64) {
    let mut log = log.lock().unwrap();
    log.now = now;
    let done: Vec<SourceId> = log
        .scheduled
        .iter()
        .filter(|s| s.start + s.duration <= now)
        .map(|s| s.id)
        .collect();
    for id in done {
        if !log.finished.contains(&id) && !log.stopped.contains(&id) {
            log.finished.push(id);
        }
    }
}

impl AudioSink for FakeSink {
    fn current_time(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_time: f64) -> SourceId {
        let mut log = self.log.lock().unwrap();
        log.next_id += 1;
        let id = log.next_id;
        log.scheduled.push(Scheduled {
            id,
            start: start_time,
            duration: buffer.duration(),
        });
        id
    }

    fn stop_source(&mut self, id: SourceId) {
        self.log.lock().unwrap().stopped.push(id);
    }

    fn take_finished(&mut self) -> Vec<SourceId> {
        std::mem::take(&mut self.log.lock().unwrap().finished)
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed = true;
    }
}

// ------------------------------------------------------------- devices

#[derive(Debug, Default)]
pub struct DeviceCounters {
    pub microphones_open: AtomicUsize,
    pub cameras_open: AtomicUsize,
    pub speakers_open: AtomicUsize,
    pub microphones_opened: AtomicUsize,
    pub cameras_opened: AtomicUsize,
}

impl DeviceCounters {
    pub fn open_total(&self) -> usize {
        self.microphones_open.load(Ordering::SeqCst)
            + self.cameras_open.load(Ordering::SeqCst)
            + self.speakers_open.load(Ordering::SeqCst)
    }
}

struct FakeMic {
    rate: u32,
    live: AtomicBool,
    counters: Arc<DeviceCounters>,
}

impl MicrophoneTrack for FakeMic {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.counters.microphones_open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct FakeCamera {
    live: AtomicBool,
    counters: Arc<DeviceCounters>,
    frame: RgbImage,
}

impl VideoTrack for FakeCamera {
    fn latest_frame(&self) -> Option<RgbImage> {
        Some(self.frame.clone())
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.counters.cameras_open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Counts every live track and output graph so leaks show up as non-zero.
#[derive(Default)]
pub struct FakeDevices {
    pub counters: Arc<DeviceCounters>,
    pub deny_microphone: AtomicBool,
    pub deny_camera: AtomicBool,
    pub facings: Mutex<Vec<FacingMode>>,
    pub sinks: Mutex<Vec<Arc<Mutex<SinkLog>>>>,
    pub producer: Mutex<Option<HeapProd<f32>>>,
    /// Simulated driver latency for opening the microphone.
    pub microphone_delay: Mutex<Duration>,
}

impl FakeDevices {
    pub fn last_sink(&self) -> Arc<Mutex<SinkLog>> {
        self.sinks.lock().unwrap().last().cloned().expect("no sink opened")
    }

    /// Writes into the most recently opened microphone.
    pub fn speak(&self, samples: &[f32]) -> usize {
        match self.producer.lock().unwrap().as_mut() {
            Some(producer) => producer.push_slice(samples),
            None => 0,
        }
    }
}

impl MediaDevices for FakeDevices {
    fn open_microphone(
        &self,
        preferred_rate: u32,
        producer: HeapProd<f32>,
    ) -> Result<Box<dyn MicrophoneTrack>> {
        let delay = *self.microphone_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(LiveError::DeviceAccess("NotAllowedError".into()));
        }
        *self.producer.lock().unwrap() = Some(producer);
        self.counters.microphones_open.fetch_add(1, Ordering::SeqCst);
        self.counters.microphones_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMic {
            rate: preferred_rate,
            live: AtomicBool::new(true),
            counters: self.counters.clone(),
        }))
    }

    fn open_camera(&self, facing: FacingMode) -> Result<Box<dyn VideoTrack>> {
        if self.deny_camera.load(Ordering::SeqCst) {
            return Err(LiveError::DeviceAccess("NotAllowedError".into()));
        }
        self.facings.lock().unwrap().push(facing);
        self.counters.cameras_open.fetch_add(1, Ordering::SeqCst);
        self.counters.cameras_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCamera {
            live: AtomicBool::new(true),
            counters: self.counters.clone(),
            frame: RgbImage::from_pixel(32, 24, image::Rgb([200, 40, 40])),
        }))
    }

    fn open_speaker(&self, _sample_rate: u32, _channels: u16) -> Result<Box<dyn AudioSink>> {
        let (sink, log) = FakeSink::new();
        self.counters.speakers_open.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().unwrap().push(log.clone());
        Ok(Box::new(CountedSink {
            inner: sink,
            counters: self.counters.clone(),
        }))
    }
}

struct CountedSink {
    inner: FakeSink,
    counters: Arc<DeviceCounters>,
}

impl AudioSink for CountedSink {
    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_time: f64) -> SourceId {
        self.inner.schedule(buffer, start_time)
    }

    fn stop_source(&mut self, id: SourceId) {
        self.inner.stop_source(id)
    }

    fn take_finished(&mut self) -> Vec<SourceId> {
        self.inner.take_finished()
    }

    fn close(&mut self) {
        let was_open = !self.inner.log.lock().unwrap().closed;
        self.inner.close();
        if was_open {
            self.counters.speakers_open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ----------------------------------------------------------- connector

#[derive(Debug, Clone)]
pub enum Behavior {
    Accept,
    Reject(LiveError),
    Hang,
}

#[derive(Clone)]
pub struct FakeSession {
    pub setup: SessionSetup,
    pub events: mpsc::Sender<SessionEvent>,
    pub outbound: OutboundQueue,
    pub shutdown: CancellationToken,
}

pub struct FakeConnector {
    pub opens: AtomicUsize,
    pub behavior: Mutex<Behavior>,
    pub sessions: Mutex<Vec<FakeSession>>,
}

impl FakeConnector {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            opens: AtomicUsize::new(0),
            behavior: Mutex::new(behavior),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn session(&self, index: usize) -> FakeSession {
        self.sessions.lock().unwrap()[index].clone()
    }

    pub fn last_session(&self) -> FakeSession {
        self.sessions.lock().unwrap().last().cloned().expect("no session opened")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        setup: SessionSetup,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Reject(e) => Err(e),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Behavior::Accept => {
                let outbound = OutboundQueue::new(setup.outbound_capacity);
                let shutdown = CancellationToken::new();
                let (tx, rx) = mpsc::channel(64);
                let _ = tx.send(SessionEvent::Opened).await;
                self.sessions.lock().unwrap().push(FakeSession {
                    setup,
                    events: tx,
                    outbound: outbound.clone(),
                    shutdown: shutdown.clone(),
                });
                Ok((SessionHandle::new(outbound, shutdown), rx))
            }
        }
    }
}

/// Runs `step` with a deadline so a missing event fails instead of hanging.
pub async fn step(controller: &mut solo_live::SessionController) {
    tokio::time::timeout(Duration::from_secs(5), controller.step())
        .await
        .expect("controller step timed out");
}
