//! Packet transport

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::trace;
use vouch_core::{PublicKey, Result, VouchError};

/// Broadcast medium shared by every node
#[async_trait]
pub trait PacketTransport: Send + Sync {
    /// Send an encoded packet to every connected peer
    async fn publish(&self, bytes: Vec<u8>) -> Result<()>;
}

/// In-process transport connecting nodes in tests and demos.
///
/// Each transport owns an inbox; `publish` copies the payload into the inbox
/// of every connected peer but never into its own.
#[derive(Clone)]
pub struct MemoryTransport {
    node: PublicKey,
    peers: Arc<RwLock<HashMap<PublicKey, mpsc::UnboundedSender<Vec<u8>>>>>,
    inbox: mpsc::UnboundedSender<Vec<u8>>,
}

impl MemoryTransport {
    /// Transport for `node` and the receiving end of its inbox
    pub fn new(node: PublicKey) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (inbox, receiver) = mpsc::unbounded_channel();
        let transport = Self {
            node,
            peers: Arc::new(RwLock::new(HashMap::new())),
            inbox,
        };
        (transport, receiver)
    }

    /// Node this transport belongs to
    pub fn node(&self) -> PublicKey {
        self.node
    }

    /// Connect two transports in both directions
    pub async fn connect_transports(first: &Self, second: &Self) {
        first
            .peers
            .write()
            .await
            .insert(second.node, second.inbox.clone());
        second
            .peers
            .write()
            .await
            .insert(first.node, first.inbox.clone());
    }

    /// Connect every pair of transports
    pub async fn connect_all(transports: &[&Self]) {
        for (i, first) in transports.iter().enumerate() {
            for second in &transports[i + 1..] {
                Self::connect_transports(first, second).await;
            }
        }
    }

    /// Stop sending to `peer`
    pub async fn disconnect(&self, peer: &PublicKey) {
        self.peers.write().await.remove(peer);
    }

    /// Number of connected peers
    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }
}

#[async_trait]
impl PacketTransport for MemoryTransport {
    async fn publish(&self, bytes: Vec<u8>) -> Result<()> {
        let mut closed = Vec::new();
        let mut delivered = 0usize;
        {
            let peers = self.peers.read().await;
            for (peer, sender) in peers.iter() {
                if sender.send(bytes.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*peer);
                }
            }
        }

        if !closed.is_empty() {
            let mut peers = self.peers.write().await;
            for peer in &closed {
                peers.remove(peer);
            }
        }

        trace!(from = %self.node.short(), delivered, "Published packet");
        if delivered == 0 && !closed.is_empty() {
            return Err(VouchError::network(format!(
                "All {} peers disconnected",
                closed.len()
            )));
        }
        Ok(())
    }
}
