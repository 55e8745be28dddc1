//! Wire packet inspection

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use vouch_core::{
    decode_wire, Location, PacketSource, PhysicalClock, PublicKey, SystemClock, Timestamp,
    TrustConfig,
};
use vouch_trust::{ChainError, ChainResolver};

/// Decode a wire packet and report on its chain
#[derive(Args)]
pub struct InspectCommand {
    /// File holding one JSON-encoded signed packet
    pub file: PathBuf,

    /// Evaluate expiration at this time (ms since epoch) instead of now
    #[arg(long)]
    pub now: Option<Timestamp>,
}

/// What a node would learn from a packet before aggregation
#[derive(Debug)]
pub struct Inspection {
    /// Hops from the root, root included
    pub depth: u32,
    /// Root broadcast source
    pub root: PacketSource,
    /// Hop signers, outermost first
    pub signers: Vec<PublicKey>,
    /// Relay locations, outermost first
    pub positions: Vec<Location>,
    /// Chain verification result
    pub verification: std::result::Result<(), ChainError>,
    /// Whether the outermost hop is past its expiration
    pub expired: bool,
}

/// Inspect encoded packet bytes
pub fn inspect(bytes: &[u8], config: &TrustConfig, now: Timestamp) -> Result<Inspection> {
    let packet = decode_wire(bytes).context("Not a signed packet")?;
    let resolver = ChainResolver::from_config(config);

    let depth = resolver.depth(&packet)?;
    let hops: Vec<_> = resolver.hops(&packet).collect();
    let root = hops
        .last()
        .map(|hop| hop.source().clone())
        .context("Packet has no hops")?;

    Ok(Inspection {
        depth,
        root,
        signers: hops.iter().map(|hop| hop.source().public_key).collect(),
        positions: resolver.position_chain(&packet),
        verification: resolver.resolve(&packet).map(|_| ()),
        expired: packet.source().age_at(now) > config.packet_expiration_ms,
    })
}

/// Print an inspection of `cmd.file`
pub fn handle_inspect_command(cmd: InspectCommand, config: &TrustConfig) -> Result<()> {
    let bytes = std::fs::read(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let now = cmd.now.unwrap_or_else(|| SystemClock.now_ms());
    let report = inspect(&bytes, config, now)?;

    println!("depth:      {}", report.depth);
    println!("root:       {} ({})", report.root.id, report.root.public_key);
    println!("timestamp:  {}", report.root.timestamp);
    for (hop, signer) in report.signers.iter().enumerate() {
        println!("hop {hop}:      {signer}");
    }
    let positions: Vec<_> = report.positions.iter().map(ToString::to_string).collect();
    println!("positions:  [{}]", positions.join(", "));
    match &report.verification {
        Ok(()) => println!("signatures: valid"),
        Err(e) => println!("signatures: INVALID ({e})"),
    }
    println!("expired:    {}", report.expired);
    Ok(())
}
