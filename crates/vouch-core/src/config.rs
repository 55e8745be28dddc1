//! Trust pipeline configuration
//!
//! Resolution order: built-in defaults, then an optional TOML or JSON file,
//! then `VOUCH_*` environment variables, then validation.

use crate::errors::{Result, VouchError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable overriding `packet_expiration_ms`
pub const ENV_PACKET_EXPIRATION_MS: &str = "VOUCH_PACKET_EXPIRATION_MS";
/// Environment variable overriding `sensing_threshold_ms`
pub const ENV_SENSING_THRESHOLD_MS: &str = "VOUCH_SENSING_THRESHOLD_MS";
/// Environment variable overriding `aggregation_window_ms`
pub const ENV_AGGREGATION_WINDOW_MS: &str = "VOUCH_AGGREGATION_WINDOW_MS";
/// Environment variable overriding `confidence_threshold`
pub const ENV_CONFIDENCE_THRESHOLD: &str = "VOUCH_CONFIDENCE_THRESHOLD";
/// Environment variable overriding `max_num_retries`
pub const ENV_MAX_NUM_RETRIES: &str = "VOUCH_MAX_NUM_RETRIES";
/// Environment variable overriding `retry_delay_ms`
pub const ENV_RETRY_DELAY_MS: &str = "VOUCH_RETRY_DELAY_MS";
/// Environment variable overriding `max_chain_depth`
pub const ENV_MAX_CHAIN_DEPTH: &str = "VOUCH_MAX_CHAIN_DEPTH";

/// Tunables of the trust pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Maximum packet age before it is ignored
    pub packet_expiration_ms: u64,
    /// Maximum distance between a sensing and a packet's claimed timestamp
    pub sensing_threshold_ms: u64,
    /// Debounce window for grouping arrivals; defaults to the sensing threshold
    pub aggregation_window_ms: Option<u64>,
    /// Minimum confidence score for acceptance
    pub confidence_threshold: f64,
    /// Re-evaluations granted to a group still waiting on a sensing
    pub max_num_retries: u32,
    /// Delay between re-evaluations
    pub retry_delay_ms: u64,
    /// Longest rebroadcast chain the resolver will walk
    pub max_chain_depth: u32,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            packet_expiration_ms: 5 * 60 * 1000,
            sensing_threshold_ms: 5_000,
            aggregation_window_ms: None,
            confidence_threshold: 1.0,
            max_num_retries: 5,
            retry_delay_ms: 5_000,
            max_chain_depth: 16,
        }
    }
}

impl TrustConfig {
    /// Short windows for tests and local demos
    pub fn testing() -> Self {
        Self {
            packet_expiration_ms: 60_000,
            sensing_threshold_ms: 60_000,
            aggregation_window_ms: Some(50),
            retry_delay_ms: 50,
            max_num_retries: 2,
            ..Default::default()
        }
    }

    /// Effective debounce window
    pub fn aggregation_window_ms(&self) -> u64 {
        self.aggregation_window_ms.unwrap_or(self.sensing_threshold_ms)
    }

    /// Load from a `.toml` or `.json` file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading trust config");

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| VouchError::invalid(format!("Invalid JSON config: {e}"))),
            _ => Err(VouchError::invalid(format!(
                "Unsupported config format: {}",
                path.display()
            ))),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| VouchError::invalid(format!("Invalid TOML: {e}")))
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VouchError::serialization(format!("Failed to render TOML: {e}")))
    }

    /// Apply `VOUCH_*` overrides from the process environment
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `VOUCH_*` overrides from an explicit variable list
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            let applied = match key {
                ENV_PACKET_EXPIRATION_MS => {
                    self.packet_expiration_ms = parse_var(ENV_PACKET_EXPIRATION_MS, value)?;
                    true
                }
                ENV_SENSING_THRESHOLD_MS => {
                    self.sensing_threshold_ms = parse_var(ENV_SENSING_THRESHOLD_MS, value)?;
                    true
                }
                ENV_AGGREGATION_WINDOW_MS => {
                    self.aggregation_window_ms =
                        Some(parse_var(ENV_AGGREGATION_WINDOW_MS, value)?);
                    true
                }
                ENV_CONFIDENCE_THRESHOLD => {
                    self.confidence_threshold = parse_var(ENV_CONFIDENCE_THRESHOLD, value)?;
                    true
                }
                ENV_MAX_NUM_RETRIES => {
                    self.max_num_retries = parse_var(ENV_MAX_NUM_RETRIES, value)?;
                    true
                }
                ENV_RETRY_DELAY_MS => {
                    self.retry_delay_ms = parse_var(ENV_RETRY_DELAY_MS, value)?;
                    true
                }
                ENV_MAX_CHAIN_DEPTH => {
                    self.max_chain_depth = parse_var(ENV_MAX_CHAIN_DEPTH, value)?;
                    true
                }
                _ => false,
            };
            if applied {
                debug!(var = key, value, "Applied config override");
            }
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.packet_expiration_ms == 0 {
            return Err(VouchError::invalid(
                "packet_expiration_ms must be greater than 0",
            ));
        }
        if self.aggregation_window_ms() == 0 {
            return Err(VouchError::invalid(
                "aggregation window must be greater than 0",
            ));
        }
        if !self.confidence_threshold.is_finite() || self.confidence_threshold <= 0.0 {
            return Err(VouchError::invalid(
                "confidence_threshold must be a positive number",
            ));
        }
        if self.max_chain_depth == 0 {
            return Err(VouchError::invalid("max_chain_depth must be at least 1"));
        }
        if self.max_num_retries > 0 && self.retry_delay_ms == 0 {
            return Err(VouchError::invalid(
                "retry_delay_ms must be greater than 0 when retries are enabled",
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| VouchError::invalid(format!("Invalid value {value:?} in {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = TrustConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aggregation_window_ms(), config.sensing_threshold_ms);
        assert!(TrustConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TrustConfig::from_toml_str("confidence_threshold = 1.5\n").unwrap();
        assert_eq!(config.confidence_threshold, 1.5);
        assert_eq!(config.max_num_retries, 5);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "sensing_threshold_ms = 60000\nmax_num_retries = 2").unwrap();

        let config = TrustConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.sensing_threshold_ms, 60_000);
        assert_eq!(config.max_num_retries, 2);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(matches!(
            TrustConfig::load_from_file(file.path()),
            Err(VouchError::Invalid { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = TrustConfig::default();
        config
            .merge_with_vars([
                (ENV_SENSING_THRESHOLD_MS, "60000"),
                (ENV_CONFIDENCE_THRESHOLD, "2.0"),
                (ENV_AGGREGATION_WINDOW_MS, " 250 "),
                ("UNRELATED", "x"),
            ])
            .unwrap();

        assert_eq!(config.sensing_threshold_ms, 60_000);
        assert_eq!(config.confidence_threshold, 2.0);
        assert_eq!(config.aggregation_window_ms(), 250);
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let mut config = TrustConfig::default();
        let err = config
            .merge_with_vars([(ENV_MAX_NUM_RETRIES, "many")])
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_NUM_RETRIES));
    }

    #[test]
    fn test_validation_failures() {
        let config = TrustConfig {
            confidence_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrustConfig {
            max_chain_depth: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrustConfig {
            retry_delay_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = TrustConfig::testing();
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(TrustConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
