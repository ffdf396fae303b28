//! Remote streaming session: wire types, outbound queue, WebSocket client.

pub mod client;
pub mod protocol;
pub mod queue;

pub use client::{Connector, GeminiConnector, SessionHandle, SessionSetup};
pub use queue::{OutboundQueue, QueueStats};
