//! Node key generation

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use vouch_core::NodeIdentity;
use vouch_trust::effects::write_key_files;

/// Generate a key pair and write it to disk
#[derive(Args)]
pub struct KeygenCommand {
    /// Directory receiving the key files
    #[arg(short, long, default_value = ".vouch")]
    pub out_dir: PathBuf,

    /// File name prefix
    #[arg(short, long, default_value = "node")]
    pub name: String,
}

/// Write `NAME-private.bin` and `NAME-public.bin` and print the public key.
///
/// The printed hex string is what the node's visual marker encodes.
pub fn handle_keygen_command(cmd: KeygenCommand) -> Result<()> {
    let identity = NodeIdentity::generate();
    let (private_path, public_path) = write_key_files(&identity, &cmd.out_dir, &cmd.name)
        .with_context(|| format!("Failed to write keys to {}", cmd.out_dir.display()))?;

    info!(
        private = %private_path.display(),
        public = %public_path.display(),
        "Wrote node key pair"
    );
    println!("{}", identity.public_key().to_hex());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vouch_trust::{FileKeyProvider, KeyProvider};

    #[test]
    fn test_keygen_writes_loadable_pair() {
        let dir = tempfile::tempdir().unwrap();
        handle_keygen_command(KeygenCommand {
            out_dir: dir.path().join("keys"),
            name: "robot".into(),
        })
        .unwrap();

        let keys = dir.path().join("keys");
        let identity = FileKeyProvider::new(keys.join("robot-private.bin"))
            .with_public_key(keys.join("robot-public.bin"))
            .load()
            .unwrap();
        assert_eq!(
            std::fs::read(keys.join("robot-public.bin")).unwrap(),
            identity.public_key().as_bytes()
        );
    }
}
