//! Node key loading
//!
//! A private key file holds either a 32-byte Ed25519 seed or the 64-byte
//! `seed || public key` pair, raw or hex encoded. An optional public key file
//! is checked against the loaded pair.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use vouch_core::{NodeIdentity, PublicKey, Result, VouchError};

/// Environment variable naming the private key file
pub const ENV_PRIVATE_KEY_LOCATION: &str = "VOUCH_PRIVATE_KEY_LOCATION";
/// Environment variable naming the public key file
pub const ENV_PUBLIC_KEY_LOCATION: &str = "VOUCH_PUBLIC_KEY_LOCATION";

/// Source of this node's identity
pub trait KeyProvider: Send + Sync {
    /// Load the identity; failure is fatal at startup
    fn load(&self) -> Result<NodeIdentity>;
}

/// Identity known up front
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    identity: NodeIdentity,
}

impl StaticKeyProvider {
    /// Provider always returning `identity`
    pub fn new(identity: NodeIdentity) -> Self {
        Self { identity }
    }
}

impl KeyProvider for StaticKeyProvider {
    fn load(&self) -> Result<NodeIdentity> {
        Ok(self.identity.clone())
    }
}

/// Identity read from key files
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    private_key_path: PathBuf,
    public_key_path: Option<PathBuf>,
}

impl FileKeyProvider {
    /// Provider reading `private_key_path`
    pub fn new(private_key_path: impl Into<PathBuf>) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: None,
        }
    }

    /// Also check the loaded pair against a public key file
    pub fn with_public_key(mut self, public_key_path: impl Into<PathBuf>) -> Self {
        self.public_key_path = Some(public_key_path.into());
        self
    }

    /// Provider configured from `VOUCH_PRIVATE_KEY_LOCATION` and
    /// `VOUCH_PUBLIC_KEY_LOCATION`
    pub fn from_env() -> Result<Self> {
        let private = std::env::var_os(ENV_PRIVATE_KEY_LOCATION).ok_or_else(|| {
            VouchError::identity(format!("{ENV_PRIVATE_KEY_LOCATION} is not set"))
        })?;
        let provider = Self::new(private);
        Ok(match std::env::var_os(ENV_PUBLIC_KEY_LOCATION) {
            Some(public) => provider.with_public_key(public),
            None => provider,
        })
    }
}

impl KeyProvider for FileKeyProvider {
    fn load(&self) -> Result<NodeIdentity> {
        let bytes = read_key_file(&self.private_key_path)?;
        let identity = match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                NodeIdentity::from_seed(&seed)
            }
            64 => {
                let mut pair = [0u8; 64];
                pair.copy_from_slice(&bytes);
                NodeIdentity::from_keypair_bytes(&pair)?
            }
            len => {
                return Err(VouchError::identity(format!(
                    "{}: expected a 32 or 64 byte private key, found {len} bytes",
                    self.private_key_path.display()
                )));
            }
        };

        if let Some(path) = &self.public_key_path {
            let expected = PublicKey::from_slice(&read_key_file(path)?)
                .map_err(|e| VouchError::identity(format!("{}: {e}", path.display())))?;
            if expected != identity.public_key() {
                return Err(VouchError::identity(format!(
                    "{} does not match the private key",
                    path.display()
                )));
            }
        }

        info!(node = %identity.public_key().short(), "Loaded node identity");
        Ok(identity)
    }
}

/// Read a key file, accepting raw bytes or hex text
fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|e| {
        VouchError::identity(format!("Cannot read key file {}: {e}", path.display()))
    })?;

    let text: String = String::from_utf8_lossy(&bytes)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if let Ok(decoded) = hex::decode(&text) {
        if matches!(decoded.len(), 32 | 64) {
            return Ok(decoded);
        }
    }
    if matches!(bytes.len(), 32 | 64) {
        return Ok(bytes);
    }
    Err(VouchError::identity(format!(
        "{}: neither a raw key nor hex ({} bytes)",
        path.display(),
        bytes.len()
    )))
}

/// Write `NAME-private.bin` (seed) and `NAME-public.bin` into `dir`
pub fn write_key_files(
    identity: &NodeIdentity,
    dir: &Path,
    name: &str,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let private_path = dir.join(format!("{name}-private.bin"));
    let public_path = dir.join(format!("{name}-public.bin"));

    fs::write(&private_path, identity.seed())?;
    fs::write(&public_path, identity.public_key().as_bytes())?;
    Ok((private_path, public_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_written_files_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let identity = NodeIdentity::generate();
        let (private, public) = write_key_files(&identity, dir.path(), "node").unwrap();

        let loaded = FileKeyProvider::new(&private)
            .with_public_key(&public)
            .load()
            .unwrap();
        assert_eq!(loaded.public_key(), identity.public_key());
    }

    #[test]
    fn test_keypair_and_hex_formats() {
        let dir = tempfile::tempdir().unwrap();
        let identity = NodeIdentity::from_seed(&[4u8; 32]);

        let mut pair = identity.seed().to_vec();
        pair.extend_from_slice(identity.public_key().as_bytes());
        let pair_path = dir.path().join("pair.bin");
        fs::write(&pair_path, &pair).unwrap();

        let hex_path = dir.path().join("seed.hex");
        fs::write(&hex_path, format!("{}\n", hex::encode(identity.seed()))).unwrap();

        let public_hex = dir.path().join("public.hex");
        fs::write(&public_hex, identity.public_key().to_hex()).unwrap();

        for path in [&pair_path, &hex_path] {
            let loaded = FileKeyProvider::new(path)
                .with_public_key(&public_hex)
                .load()
                .unwrap();
            assert_eq!(loaded.public_key(), identity.public_key());
        }
    }

    #[test]
    fn test_mismatched_public_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (private, _) =
            write_key_files(&NodeIdentity::from_seed(&[1u8; 32]), dir.path(), "a").unwrap();
        let (_, other_public) =
            write_key_files(&NodeIdentity::from_seed(&[2u8; 32]), dir.path(), "b").unwrap();

        assert_matches!(
            FileKeyProvider::new(private)
                .with_public_key(other_public)
                .load(),
            Err(VouchError::Identity { .. })
        );
    }

    #[test]
    fn test_missing_or_short_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            FileKeyProvider::new(dir.path().join("absent")).load(),
            Err(VouchError::Identity { .. })
        );

        let short = dir.path().join("short");
        fs::write(&short, [1u8; 16]).unwrap();
        assert_matches!(
            FileKeyProvider::new(short).load(),
            Err(VouchError::Identity { .. })
        );
    }

    #[test]
    fn test_static_provider() {
        let identity = NodeIdentity::from_seed(&[8u8; 32]);
        let provider = StaticKeyProvider::new(identity.clone());
        assert_eq!(provider.load().unwrap().public_key(), identity.public_key());
    }
}
