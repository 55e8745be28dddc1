//! Actuation sink

use crate::pipeline::AcceptedPacket;
use async_trait::async_trait;
use tokio::sync::mpsc;
use vouch_core::{Result, VouchError};

/// Consumer of accepted broadcasts
#[async_trait]
pub trait ActuationSink: Send + Sync {
    /// Act upon an accepted broadcast
    async fn deliver(&self, accepted: AcceptedPacket) -> Result<()>;
}

/// Forwards accepted broadcasts over a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<AcceptedPacket>,
}

impl ChannelSink {
    /// Sink and the receiver it feeds
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AcceptedPacket>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ActuationSink for ChannelSink {
    async fn deliver(&self, accepted: AcceptedPacket) -> Result<()> {
        self.sender
            .send(accepted)
            .map_err(|_| VouchError::internal("Actuation receiver dropped"))
    }
}
