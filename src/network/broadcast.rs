//! Broadcast Sinks
//!
//! Fire-and-forget publication of [`ServerMessage`]s to the participants
//! of a match. Publishing never blocks and never fails the caller.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::network::protocol::ServerMessage;

/// Destination for outbound match messages.
pub trait BroadcastSink: Send + Sync {
    /// Publish a message to everyone in match `code`.
    fn publish(&self, code: &str, message: ServerMessage);
}

/// A message addressed to one match.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Match join code.
    pub code: String,
    /// Payload.
    pub message: ServerMessage,
}

// =============================================================================
// CHANNEL SINK
// =============================================================================

/// Fans messages out over a tokio broadcast channel. Transports
/// subscribe and filter by match code.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: broadcast::Sender<Envelope>,
}

impl ChannelSink {
    /// Create a sink buffering at most `capacity` messages per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every published message.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Current number of receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl BroadcastSink for ChannelSink {
    fn publish(&self, code: &str, message: ServerMessage) {
        let kind = message.kind();
        let envelope = Envelope {
            code: code.to_string(),
            message,
        };
        if self.sender.send(envelope).is_err() {
            debug!("No subscribers for {} in match {}", kind, code);
        }
    }
}

// =============================================================================
// LOG SINK
// =============================================================================

/// Writes every message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl BroadcastSink for LogSink {
    fn publish(&self, code: &str, message: ServerMessage) {
        match message.to_json() {
            Ok(json) => info!(target: "shipwreck::broadcast", "[{}] {}", code, json),
            Err(e) => warn!("Failed to encode {} for match {}: {}", message.kind(), code, e),
        }
    }
}
