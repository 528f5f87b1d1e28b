//! # Node Configuration
//!
//! Unified configuration for all subsystems and runtime parameters.
//!
//! Values come from defaults, then an optional JSON file named by
//! `DX_CONFIG`, then `DX_*` environment overrides.

use dx_02_event_scanner::ScanConfig;
use dx_04_transaction_lifecycle::EngineConfig;
use dx_05_verifier_coordination::{DecisionRule, VotePolicy, MAX_VERIFIERS};
use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockNumber, RetryPolicy};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub ledger: LedgerConfig,
    pub scanner: ScannerConfig,
    pub voting: VotingConfig,
    pub handoff: HandoffSettings,
    pub submitter: SubmitterSettings,
    pub storage: StorageConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value {value:?} for {key}")]
    InvalidOverride { key: String, value: String },

    #[error("No contract to scan: set ledger.protocol_contract")]
    NoContracts,

    #[error("scanner.batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("voting.min_votes is {min_votes}, at most {max} verifiers are chosen")]
    TooManyVotes { min_votes: usize, max: usize },
}

impl NodeConfig {
    /// Read a JSON config file. Missing sections keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply `DX_*` overrides looked up through `var`.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("DX_RPC_URL") {
            self.ledger.rpc_url = url;
        }
        if let Some(value) = var("DX_PROTOCOL_CONTRACT") {
            self.ledger.protocol_contract = parse("DX_PROTOCOL_CONTRACT", value)?;
        }
        if let Some(value) = var("DX_TOKEN_CONTRACT") {
            self.ledger.token_contract = parse("DX_TOKEN_CONTRACT", value)?;
        }
        if let Some(value) = var("DX_FROM_BLOCK") {
            self.scanner.start_block = parse("DX_FROM_BLOCK", value)?;
        }
        if let Some(value) = var("DX_CONFIRMATIONS") {
            self.scanner.confirmations = parse("DX_CONFIRMATIONS", value)?;
        }
        if let Some(dir) = var("DX_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.contracts().is_empty() {
            return Err(ConfigError::NoContracts);
        }
        if self.scanner.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.voting.min_votes > MAX_VERIFIERS {
            return Err(ConfigError::TooManyVotes {
                min_votes: self.voting.min_votes,
                max: MAX_VERIFIERS,
            });
        }
        Ok(())
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            confirmations: self.scanner.confirmations,
            poll_interval_ms: self.scanner.poll_interval_ms,
            batch_size: self.scanner.batch_size,
            buffer: self.scanner.buffer,
            retry: self.scanner.retry,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            vote_policy: VotePolicy {
                rule: self.voting.rule,
                min_votes: self.voting.min_votes,
                vote_timeout_blocks: self.voting.vote_timeout_blocks,
            },
            arbitrator: self.voting.arbitrator,
            protocol_contract: self.ledger.protocol_contract,
            reconcile_interval_blocks: self.submitter.reconcile_interval_blocks,
        }
    }
}

/// Defaults, then the file named by `DX_CONFIG`, then environment overrides.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    let mut config = match std::env::var("DX_CONFIG") {
        Ok(path) => NodeConfig::from_file(Path::new(&path))?,
        Err(_) => NodeConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key: key.to_string(),
            value,
        })
}

/// Ledger connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// RPC endpoint of the ledger node.
    pub rpc_url: String,
    /// Listings, transactions, verifiers and arbitration.
    pub protocol_contract: Address,
    /// Payment token; emits `Approval`. Zero when not scanned.
    pub token_contract: Address,
}

impl LedgerConfig {
    /// Contracts to scan; unset (zero) addresses are skipped.
    pub fn contracts(&self) -> Vec<Address> {
        [self.protocol_contract, self.token_contract]
            .into_iter()
            .filter(|contract| *contract != Address::ZERO)
            .collect()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            protocol_contract: Address::ZERO,
            token_contract: Address::ZERO,
        }
    }
}

/// Event scanning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// First block of a scan without a saved cursor.
    pub start_block: BlockNumber,
    pub confirmations: u64,
    pub poll_interval_ms: u64,
    pub batch_size: u64,
    pub buffer: usize,
    pub retry: RetryPolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let scan = ScanConfig::default();
        Self {
            start_block: 0,
            confirmations: scan.confirmations,
            poll_interval_ms: scan.poll_interval_ms,
            batch_size: scan.batch_size,
            buffer: scan.buffer,
            retry: scan.retry,
        }
    }
}

/// Verification and arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    pub rule: DecisionRule,
    pub min_votes: usize,
    pub vote_timeout_blocks: u64,
    /// Only this account's arbitration results are accepted, when set.
    pub arbitrator: Option<Address>,
}

impl Default for VotingConfig {
    fn default() -> Self {
        let policy = VotePolicy::default();
        Self {
            rule: policy.rule,
            min_votes: policy.min_votes,
            vote_timeout_blocks: policy.vote_timeout_blocks,
            arbitrator: None,
        }
    }
}

/// Key handoff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSettings {
    pub retry: RetryPolicy,
}

/// Action submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitterSettings {
    pub retry: RetryPolicy,
    /// Blocks between receipt reconciliations. 0 disables them.
    pub reconcile_interval_blocks: u64,
}

impl Default for SubmitterSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            reconcile_interval_blocks: 10,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds the scan cursor and the lifecycle snapshot.
    pub data_dir: PathBuf,
    /// Finalized blocks between lifecycle snapshots. 0 saves only at shutdown.
    pub snapshot_interval_blocks: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            snapshot_interval_blocks: 100,
        }
    }
}

impl StorageConfig {
    pub fn cursor_path(&self) -> PathBuf {
        self.data_dir.join("cursor.json")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("transactions.json")
    }
}
