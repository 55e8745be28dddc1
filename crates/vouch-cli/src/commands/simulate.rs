//! In-process network simulation
//!
//! One broadcaster, `relays` relay nodes that all sense the broadcaster, and
//! a receiver that senses only the first `sensed` relays and never the
//! broadcaster. Shows whether the receiver accepts the broadcast through
//! relays alone.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use vouch_core::{BroadcastEvent, Location, NodeIdentity, SystemClock, TrustConfig};
use vouch_trust::{
    AcceptedPacket, ChannelSink, MemoryTransport, NodeRuntime, SensingEvent, StaticKeyProvider,
};

/// Simulate a broadcast relayed to an out-of-sight receiver
#[derive(Args)]
pub struct SimulateCommand {
    /// Relay nodes that sense the broadcaster
    #[arg(long, default_value = "2")]
    pub relays: usize,

    /// Relays the receiver has sensed
    #[arg(long, default_value = "2")]
    pub sensed: usize,

    /// Movement command carried by the broadcast
    #[arg(long, default_value = "forward")]
    pub command: String,
}

struct SimNode {
    identity: NodeIdentity,
    runtime: NodeRuntime<MemoryTransport, ChannelSink, SystemClock>,
    transport: MemoryTransport,
    inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    sensing: mpsc::UnboundedSender<SensingEvent>,
    sensing_rx: mpsc::UnboundedReceiver<SensingEvent>,
    deliveries: mpsc::UnboundedReceiver<AcceptedPacket>,
}

impl SimNode {
    fn new(config: &TrustConfig) -> Result<Self> {
        let identity = NodeIdentity::generate();
        let (transport, inbox) = MemoryTransport::new(identity.public_key());
        let (sink, deliveries) = ChannelSink::new();
        let (sensing, sensing_rx) = mpsc::unbounded_channel();
        let runtime = NodeRuntime::start(
            &StaticKeyProvider::new(identity.clone()),
            config.clone(),
            transport.clone(),
            sink,
            SystemClock,
        )?;

        Ok(Self {
            identity,
            runtime,
            transport,
            inbox,
            sensing,
            sensing_rx,
            deliveries,
        })
    }

    fn sense(&self, peer: &NodeIdentity, location: Location) -> Result<()> {
        self.sensing
            .send(SensingEvent::new(peer.public_key(), location))
            .context("Node stopped")
    }
}

/// Longest time a group can stay open under `config`
fn settle_time(config: &TrustConfig) -> Duration {
    let retries = u64::from(config.max_num_retries) * config.retry_delay_ms;
    Duration::from_millis(config.aggregation_window_ms() + retries + 500)
}

/// Run the simulation and print the receiver's verdict
pub async fn handle_simulate_command(cmd: SimulateCommand, config: TrustConfig) -> Result<()> {
    if cmd.sensed > cmd.relays {
        bail!("--sensed ({}) exceeds --relays ({})", cmd.sensed, cmd.relays);
    }

    let broadcaster = SimNode::new(&config)?;
    let relays = (0..cmd.relays)
        .map(|_| SimNode::new(&config))
        .collect::<Result<Vec<_>>>()?;
    let mut receiver = SimNode::new(&config)?;

    let mut transports = vec![&broadcaster.transport, &receiver.transport];
    transports.extend(relays.iter().map(|relay| &relay.transport));
    MemoryTransport::connect_all(&transports).await;

    let locations = [Location::Left, Location::Center, Location::Right];
    for (i, relay) in relays.iter().enumerate() {
        let location = locations[i % locations.len()];
        relay.sense(&broadcaster.identity, location)?;
        if i < cmd.sensed {
            receiver.sense(&relay.identity, location)?;
        }
    }

    let SimNode {
        runtime: mut origin,
        inbox: _broadcaster_inbox,
        ..
    } = broadcaster;
    let mut tasks = Vec::new();
    for relay in relays {
        tasks.push(tokio::spawn(relay.runtime.run(relay.inbox, relay.sensing_rx)));
    }
    let receiver_key = receiver.identity.public_key();
    tasks.push(tokio::spawn(
        receiver.runtime.run(receiver.inbox, receiver.sensing_rx),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = origin
        .broadcast(BroadcastEvent::Movement {
            command: cmd.command,
        })
        .await?;
    info!(id = %sent.source().id, relays = cmd.relays, sensed = cmd.sensed, "Broadcast sent");

    let verdict = tokio::time::timeout(settle_time(&config), receiver.deliveries.recv()).await;
    for task in &tasks {
        task.abort();
    }

    match verdict {
        Ok(Some(accepted)) => {
            println!(
                "receiver {} ACCEPTED: score {:.2}, {} confirmations, positions {:?}",
                receiver_key.short(),
                accepted.confidence.score,
                accepted.confidence.confirmations,
                accepted.position_chains
            );
        }
        _ => println!("receiver {} did not accept the broadcast", receiver_key.short()),
    }
    Ok(())
}
