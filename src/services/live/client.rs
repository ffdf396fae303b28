use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerMessage, Setup};
use super::queue::{OutboundQueue, QueueStats};
use crate::codec::EncodedBlob;
use crate::config::LiveConfig;
use crate::error::{LiveError, Result};
use crate::kernel::event::SessionEvent;

const EVENT_CHANNEL: usize = 256;

/// Everything the remote end needs to open one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub transcribe_output: bool,
    pub outbound_capacity: usize,
}

/// Opens remote streaming sessions.
///
/// A successful `open` has completed the handshake: the returned receiver
/// yields `Opened` first, then server traffic in arrival order, and ends
/// with `Closed` or `Error`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        setup: SessionSetup,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)>;
}

/// One logical connection. Never reused; `close` is final and idempotent.
pub struct SessionHandle {
    id: Uuid,
    outbound: OutboundQueue,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn new(outbound: OutboundQueue, shutdown: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound,
            shutdown,
            tasks: Vec::new(),
        }
    }

    fn with_tasks(mut self, tasks: Vec<JoinHandle<()>>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Fire-and-forget. Returns `true` if an older frame was evicted.
    pub fn send_realtime_input(&self, blob: EncodedBlob) -> bool {
        self.outbound.push(blob)
    }

    /// Producer side of the outbound queue, for the capture thread and
    /// the frame sampler.
    pub fn outbound(&self) -> OutboundQueue {
        self.outbound.clone()
    }

    pub fn stats(&self) -> QueueStats {
        self.outbound.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn close(&mut self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        debug!(session = %self.id, "closing session handle");
        self.shutdown.cancel();
        self.outbound.close();
        // The writer sends a Close frame on its way out; nothing to await.
        self.tasks.clear();
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// WebSocket client for the BidiGenerateContent endpoint.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    endpoint: String,
    api_key: String,
}

impl GeminiConnector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &LiveConfig) -> Self {
        Self::new(config.endpoint.clone(), config.api_key.clone())
    }

    fn url(&self) -> Result<Url> {
        Url::parse_with_params(&self.endpoint, &[("key", self.api_key.as_str())])
            .map_err(|e| LiveError::Config(format!("invalid endpoint: {}", e)))
    }
}

#[async_trait]
impl Connector for GeminiConnector {
    async fn open(
        &self,
        setup: SessionSetup,
    ) -> Result<(SessionHandle, mpsc::Receiver<SessionEvent>)> {
        if self.api_key.trim().is_empty() {
            return Err(LiveError::MissingCredentials);
        }

        let url = self.url()?;
        // rustls needs a process-wide provider; a second install is a no-op error.
        let _ = rustls::crypto::ring::default_provider().install_default();
        info!(model = %setup.model, "connecting live session");

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| LiveError::Connection(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let hello = ClientMessage::Setup(Setup::new(
            &setup.model,
            &setup.voice_name,
            &setup.system_instruction,
            setup.transcribe_output,
        ));
        let payload =
            serde_json::to_string(&hello).map_err(|e| LiveError::Protocol(e.to_string()))?;
        sink.send(Message::text(payload))
            .await
            .map_err(|e| LiveError::Connection(e.to_string()))?;

        // Handshake: nothing else is meaningful before setupComplete.
        loop {
            match stream.next().await {
                Some(Ok(message)) => {
                    if let Some(parsed) = parse_frame(&message)? {
                        if parsed.is_setup_complete() {
                            break;
                        }
                    } else if let Message::Close(frame) = message {
                        let reason = frame.map(|f| f.reason.as_str().to_string()).unwrap_or_default();
                        return Err(LiveError::Connection(format!(
                            "closed during setup: {}",
                            reason
                        )));
                    }
                }
                Some(Err(e)) => return Err(LiveError::Connection(e.to_string())),
                None => {
                    return Err(LiveError::Connection("stream ended during setup".into()));
                }
            }
        }

        let outbound = OutboundQueue::new(setup.outbound_capacity);
        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL);
        let _ = events_tx.send(SessionEvent::Opened).await;

        let writer = {
            let outbound = outbound.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let blob = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        blob = outbound.pop() => match blob {
                            Some(blob) => blob,
                            None => break,
                        },
                    };
                    let frame = match serde_json::to_string(&ClientMessage::media(blob)) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("dropping unserializable frame: {}", e);
                            continue;
                        }
                    };
                    match sink.send(Message::text(frame)).await {
                        Ok(()) => {}
                        Err(tungstenite::Error::ConnectionClosed)
                        | Err(tungstenite::Error::AlreadyClosed) => break,
                        // No retry: the frame is lost.
                        Err(e) => debug!("frame send failed: {}", e),
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
            })
        };

        let reader = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        next = stream.next() => next,
                    };
                    let events = match next {
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame.map(|f| f.reason.as_str().to_string());
                            let _ = events_tx.send(SessionEvent::Closed(reason)).await;
                            break;
                        }
                        Some(Ok(message)) => match parse_frame(&message) {
                            Ok(Some(parsed)) => {
                                if let Some(go_away) = &parsed.go_away {
                                    warn!(time_left = ?go_away.time_left, "server announced disconnect");
                                }
                                parsed.into_events()
                            }
                            Ok(None) => continue,
                            Err(e) => {
                                warn!("skipping unreadable server frame: {}", e);
                                continue;
                            }
                        },
                        Some(Err(e)) => {
                            let _ = events_tx.send(SessionEvent::Error(e.to_string())).await;
                            break;
                        }
                        None => {
                            let _ = events_tx.send(SessionEvent::Closed(None)).await;
                            break;
                        }
                    };
                    for event in events {
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            })
        };

        let handle = SessionHandle::new(outbound, shutdown).with_tasks(vec![writer, reader]);
        info!(session = %handle.id(), "live session open");
        Ok((handle, events_rx))
    }
}

/// `Ok(None)` for frames that carry no JSON (ping, pong, close).
fn parse_frame(message: &Message) -> Result<Option<ServerMessage>> {
    let parsed = match message {
        Message::Text(text) => serde_json::from_str(text.as_str()),
        Message::Binary(bytes) => serde_json::from_slice(bytes),
        _ => return Ok(None),
    };
    parsed
        .map(Some)
        .map_err(|e| LiveError::Protocol(format!("bad server frame: {}", e)))
}
