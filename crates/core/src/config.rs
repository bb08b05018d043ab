//! Typed configuration surface consumed by the facade (SPEC_FULL.md §4.10).
//!
//! `Config` carries `serde` derives so an out-of-scope CLI or config-file
//! loader can round-trip it through TOML/JSON without this crate parsing
//! files itself, following the usual config-struct-with-defaults idiom.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default probe depth for the open-addressing hasher.
pub const DEFAULT_MAX_PROBES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Total slot count the backing storage must provide.
    pub slot_count: u64,
    /// Maximum probe depth for the open-addressing hasher.
    #[serde(default = "default_max_probes")]
    pub max_probes: u32,
    /// Whether the facade wraps its table in a [`crate::journal::JournaledTable`].
    #[serde(default = "default_enable_journal")]
    pub enable_journal: bool,
    /// Whether the facade wraps its storage in a [`crate::storage::cached::CachedStorage`].
    #[serde(default)]
    pub enable_cache: bool,
    /// Capacity of the cache decorator, if enabled.
    #[serde(default)]
    pub cache_size: usize,
}

fn default_max_probes() -> u32 {
    DEFAULT_MAX_PROBES
}

fn default_enable_journal() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slot_count: 0,
            max_probes: DEFAULT_MAX_PROBES,
            enable_journal: true,
            enable_cache: false,
            cache_size: 0,
        }
    }
}

impl Config {
    /// Validate the config, the only validation the core performs per
    /// SPEC_FULL.md §4.10: `slot_count` must be nonzero.
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(Error::InvalidArgument(
                "slot_count must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.max_probes, 10);
        assert!(cfg.enable_journal);
        assert!(!cfg.enable_cache);
        assert_eq!(cfg.cache_size, 0);
    }

    #[test]
    fn zero_slot_count_rejected() {
        let cfg = Config {
            slot_count: 0,
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = Config {
            slot_count: 1024,
            max_probes: 4,
            enable_journal: false,
            enable_cache: true,
            cache_size: 256,
        };
        let encoded = serde_json::to_string(&cfg).unwrap();
        let decoded: Config = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, cfg);
    }

    #[test]
    fn missing_optional_fields_fall_back_to_defaults() {
        let decoded: Config = serde_json::from_str(r#"{"slot_count": 64}"#).unwrap();
        assert_eq!(decoded.max_probes, DEFAULT_MAX_PROBES);
        assert!(decoded.enable_journal);
        assert!(!decoded.enable_cache);
    }
}
