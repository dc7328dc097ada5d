//! Run configuration.
//!
//! Built once before a run and shared read-only (`Arc<Config>`) by every
//! stage. Nothing mutates it after construction.

use crate::error::{ReplayError, ReplayResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Chain identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Ethereum mainnet
    pub const ETHEREUM: Self = Self(1);
    /// Opera mainnet
    pub const MAINNET: Self = Self(250);
    /// Opera testnet
    pub const TESTNET: Self = Self(4002);
}

impl Default for ChainId {
    fn default() -> Self {
        Self::MAINNET
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// First block to replay (inclusive)
    pub first: u64,
    /// Last block to replay (inclusive)
    pub last: u64,
    /// Chain identity
    pub chain_id: ChainId,
    /// Report execution failures instead of aborting
    pub continue_on_failure: bool,
    /// Failures tolerated before they become fatal (0 = unbounded)
    pub max_num_errors: usize,
    /// Do not prime the state store
    pub skip_priming: bool,
    /// The state store already holds state; priming is skipped
    pub is_existing_state_db: bool,
    /// Prime accounts in a seeded random order
    pub prime_random: bool,
    /// Seed for randomized priming
    pub prime_seed: u64,
    /// Accounts per bulk-load batch in randomized priming (0 = single batch)
    pub prime_threshold: usize,
    /// Priming accumulator limit in bytes
    pub update_buffer_size: u64,
    /// Verify or execute against archive states
    pub archive_mode: bool,
    /// Compare state roots with reference hashes
    pub validate_state_hashes: bool,
    /// Capacity of the error-report channel
    pub error_channel_capacity: usize,
    /// Blocks between progress log lines (0 = only a summary)
    pub progress_report_interval: u64,
    /// Keep the state store after the run
    pub keep_db: bool,
    /// Location of the state store
    pub state_db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first: 0,
            last: 0,
            chain_id: ChainId::default(),
            continue_on_failure: false,
            max_num_errors: 50,
            skip_priming: false,
            is_existing_state_db: false,
            prime_random: false,
            prime_seed: 0,
            prime_threshold: 0,
            update_buffer_size: 1 << 30,
            archive_mode: false,
            validate_state_hashes: false,
            error_channel_capacity: 1024,
            progress_report_interval: 100_000,
            keep_db: false,
            state_db_path: None,
        }
    }
}

impl Config {
    /// Create a config for the inclusive block range `[first, last]`
    #[must_use]
    pub fn new(first: u64, last: u64) -> Self {
        Self {
            first,
            last,
            ..Self::default()
        }
    }

    /// Parse a JSON document; absent fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or fails validation
    pub fn from_json(json: &str) -> ReplayResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ReplayError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns error if the range is inverted or the error channel has no capacity
    pub fn validate(&self) -> ReplayResult<()> {
        if self.first > self.last {
            return Err(ReplayError::InvalidConfig {
                reason: format!("first block {} is after last block {}", self.first, self.last),
            });
        }
        if self.error_channel_capacity == 0 {
            return Err(ReplayError::InvalidConfig {
                reason: "error channel capacity must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Set failure tolerance
    #[must_use]
    pub fn with_continue_on_failure(mut self, max_num_errors: usize) -> Self {
        self.continue_on_failure = true;
        self.max_num_errors = max_num_errors;
        self
    }

    /// Set chain identity
    #[must_use]
    pub fn with_chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Enable randomized priming
    #[must_use]
    pub fn with_random_priming(mut self, seed: u64, threshold: usize) -> Self {
        self.prime_random = true;
        self.prime_seed = seed;
        self.prime_threshold = threshold;
        self
    }

    /// Set the priming accumulator limit
    #[must_use]
    pub fn with_update_buffer_size(mut self, bytes: u64) -> Self {
        self.update_buffer_size = bytes;
        self
    }

    /// Enable archive mode
    #[must_use]
    pub fn with_archive_mode(mut self, enabled: bool) -> Self {
        self.archive_mode = enabled;
        self
    }

    /// Enable state-hash validation
    #[must_use]
    pub fn with_state_hash_validation(mut self, enabled: bool) -> Self {
        self.validate_state_hashes = enabled;
        self
    }

    /// Exclusive upper bound of the replayed range
    #[must_use]
    pub fn end(&self) -> u64 {
        self.last.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(!config.continue_on_failure);
        assert_eq!(config.chain_id, ChainId::MAINNET);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_inverted_range() {
        let config = Config::new(10, 5);
        assert!(matches!(config.validate(), Err(ReplayError::InvalidConfig { .. })));
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config = Config::from_json(r#"{"first": 3, "last": 9, "continue_on_failure": true}"#).unwrap();
        assert_eq!(config.first, 3);
        assert_eq!(config.end(), 10);
        assert!(config.continue_on_failure);
        assert_eq!(config.error_channel_capacity, 1024);
    }

    #[test]
    fn test_config_from_json_rejects_garbage() {
        assert!(Config::from_json("{").is_err());
        assert!(Config::from_json(r#"{"error_channel_capacity": 0}"#).is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = Config::new(1, 2)
            .with_continue_on_failure(3)
            .with_random_priming(7, 100)
            .with_archive_mode(true);
        assert!(config.continue_on_failure);
        assert_eq!(config.max_num_errors, 3);
        assert!(config.prime_random);
        assert_eq!(config.prime_seed, 7);
        assert!(config.archive_mode);
    }
}
