//! Node runtime
//!
//! Drives a [`TrustPipeline`] from a single task: inbound packets, sensing
//! events and aggregation deadlines are multiplexed with `tokio::select!`,
//! and the resulting effects are executed against the transport and the
//! actuation sink. Effect failures are logged and never stop the loop.

use crate::effects::{ActuationSink, KeyProvider, PacketTransport};
use crate::pipeline::{EffectCommand, PipelineStats, TrustPipeline};
use crate::registry::SensingEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vouch_core::{encode_wire, BroadcastEvent, PhysicalClock, Result, SignedPacket, TrustConfig};

/// A running node: pipeline plus the effects it drives
pub struct NodeRuntime<T, A, C> {
    pipeline: TrustPipeline,
    transport: T,
    sink: A,
    clock: C,
}

impl<T, A, C> NodeRuntime<T, A, C>
where
    T: PacketTransport,
    A: ActuationSink,
    C: PhysicalClock,
{
    /// Wrap an existing pipeline
    pub fn new(pipeline: TrustPipeline, transport: T, sink: A, clock: C) -> Self {
        Self {
            pipeline,
            transport,
            sink,
            clock,
        }
    }

    /// Load the node identity and build the pipeline.
    ///
    /// A missing or unreadable identity is the only fatal startup error.
    pub fn start(
        keys: &dyn KeyProvider,
        config: TrustConfig,
        transport: T,
        sink: A,
        clock: C,
    ) -> Result<Self> {
        let identity = keys.load()?;
        let pipeline = TrustPipeline::new(identity, config)?;
        info!(node = %pipeline.public_key().short(), "Node started");
        Ok(Self::new(pipeline, transport, sink, clock))
    }

    /// The driven pipeline
    pub fn pipeline(&self) -> &TrustPipeline {
        &self.pipeline
    }

    /// Sign and publish a broadcast of this node's own
    pub async fn broadcast(&mut self, event: BroadcastEvent) -> Result<SignedPacket> {
        let packet = self.pipeline.originate(event, self.clock.now_ms())?;
        self.transport.publish(encode_wire(&packet)?).await?;
        Ok(packet)
    }

    /// Process inputs until both channels close.
    ///
    /// Groups still open when the inputs close are abandoned.
    pub async fn run(
        mut self,
        mut packets: mpsc::UnboundedReceiver<Vec<u8>>,
        mut sensing: mpsc::UnboundedReceiver<SensingEvent>,
    ) -> PipelineStats {
        let mut packets_open = true;
        let mut sensing_open = true;

        while packets_open || sensing_open {
            let now = self.clock.now_ms();
            let effects = self.pipeline.tick(now);
            self.execute(effects).await;

            let wait = self
                .pipeline
                .next_deadline()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)));
            let timer = async move {
                match wait {
                    Some(wait) => tokio::time::sleep(wait).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                bytes = packets.recv(), if packets_open => match bytes {
                    Some(bytes) => {
                        let effects = self.pipeline.handle_wire(&bytes, self.clock.now_ms());
                        self.execute(effects).await;
                    }
                    None => {
                        debug!("Packet channel closed");
                        packets_open = false;
                    }
                },
                event = sensing.recv(), if sensing_open => match event {
                    Some(event) => {
                        if let Err(e) = self.pipeline.record_sensing(&event, self.clock.now_ms()) {
                            debug!(error = %e, "Dropping malformed sensing event");
                        }
                    }
                    None => {
                        debug!("Sensing channel closed");
                        sensing_open = false;
                    }
                },
                _ = timer => {}
            }
        }

        info!(
            pending = self.pipeline.aggregator().len(),
            accepted = self.pipeline.stats().accepted,
            "Node stopped"
        );
        self.pipeline.stats().clone()
    }

    async fn execute(&mut self, effects: Vec<EffectCommand>) {
        for effect in effects {
            match effect {
                EffectCommand::Publish { packet } => {
                    let bytes = match encode_wire(&packet) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            warn!(error = %e, "Failed to encode packet");
                            continue;
                        }
                    };
                    if let Err(e) = self.transport.publish(bytes).await {
                        warn!(error = %e, "Failed to publish packet");
                    }
                }
                EffectCommand::Deliver { accepted } => {
                    let key = accepted.key.clone();
                    if let Err(e) = self.sink.deliver(accepted).await {
                        warn!(%key, error = %e, "Failed to deliver accepted broadcast");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{ChannelSink, MemoryTransport, StaticKeyProvider};
    use async_trait::async_trait;
    use vouch_core::{Location, NodeIdentity, SystemClock, VouchError};

    struct FailingTransport;

    #[async_trait]
    impl PacketTransport for FailingTransport {
        async fn publish(&self, _bytes: Vec<u8>) -> Result<()> {
            Err(VouchError::network("link down"))
        }
    }

    struct FailingKeys;

    impl KeyProvider for FailingKeys {
        fn load(&self) -> Result<NodeIdentity> {
            Err(VouchError::identity("no key"))
        }
    }

    #[test]
    fn test_start_propagates_key_errors() {
        let (transport, _rx) = MemoryTransport::new(NodeIdentity::generate().public_key());
        let (sink, _deliveries) = ChannelSink::new();
        let result = NodeRuntime::start(
            &FailingKeys,
            TrustConfig::testing(),
            transport,
            sink,
            SystemClock,
        );
        assert!(matches!(result, Err(VouchError::Identity { .. })));
    }

    #[tokio::test]
    async fn test_run_returns_when_inputs_close() {
        let identity = NodeIdentity::from_seed(&[1u8; 32]);
        let (transport, _rx) = MemoryTransport::new(identity.public_key());
        let (sink, _deliveries) = ChannelSink::new();
        let runtime = NodeRuntime::start(
            &StaticKeyProvider::new(identity),
            TrustConfig::testing(),
            transport,
            sink,
            SystemClock,
        )
        .unwrap();

        let (packets_tx, packets_rx) = mpsc::unbounded_channel();
        let (sensing_tx, sensing_rx) = mpsc::unbounded_channel();
        packets_tx.send(b"garbage".to_vec()).unwrap();
        sensing_tx
            .send(SensingEvent::new(
                NodeIdentity::from_seed(&[2u8; 32]).public_key(),
                Location::Left,
            ))
            .unwrap();
        drop(packets_tx);
        drop(sensing_tx);

        let stats = runtime.run(packets_rx, sensing_rx).await;
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.sensed, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_stop_loop() {
        let relay = NodeIdentity::from_seed(&[1u8; 32]);
        let broadcaster = NodeIdentity::from_seed(&[2u8; 32]);
        let pipeline = TrustPipeline::new(relay, TrustConfig::testing()).unwrap();
        let (sink, _deliveries) = ChannelSink::new();
        let runtime = NodeRuntime::new(pipeline, FailingTransport, sink, SystemClock);

        let (packets_tx, packets_rx) = mpsc::unbounded_channel();
        let (sensing_tx, sensing_rx) = mpsc::unbounded_channel();
        sensing_tx
            .send(SensingEvent::new(broadcaster.public_key(), Location::Center))
            .unwrap();
        drop(sensing_tx);

        let task = tokio::spawn(runtime.run(packets_rx, sensing_rx));
        // Let the sensing event land before the packet it corroborates.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let packet = vouch_core::Packet::Broadcast {
            source: vouch_core::PacketSource::new(
                broadcaster.public_key(),
                SystemClock.now_ms(),
            ),
            event: BroadcastEvent::Stop,
        };
        let signed = SignedPacket::sign(packet, &broadcaster).unwrap();
        packets_tx.send(encode_wire(&signed).unwrap()).unwrap();
        packets_tx.send(b"{}".to_vec()).unwrap();
        drop(packets_tx);

        let stats = task.await.unwrap();
        assert_eq!(stats.relayed, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.received, 2);
    }
}
