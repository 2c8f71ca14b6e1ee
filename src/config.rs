//! Configuration module
//!
//! Loads a TOML file, applies `.env` and environment overrides, then
//! validates. Every field has a named default so a partial file is valid.

use crate::address::parse_address;
use serde::{Deserialize, Serialize};
use solana_commitment_config::CommitmentLevel;
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_RPC_URL: &str = "LEDGER_RPC_URL";
pub const ENV_KEYPAIR: &str = "LEDGER_KEYPAIR";
pub const ENV_ESCROW_PROGRAM: &str = "LEDGER_ESCROW_PROGRAM";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub submission: SubmissionConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub escrow: EscrowConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

/// Commitment level as written in the config file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentSetting {
    Processed,
    Confirmed,
    Finalized,
}

impl From<CommitmentSetting> for CommitmentLevel {
    fn from(setting: CommitmentSetting) -> Self {
        match setting {
            CommitmentSetting::Processed => CommitmentLevel::Processed,
            CommitmentSetting::Confirmed => CommitmentLevel::Confirmed,
            CommitmentSetting::Finalized => CommitmentLevel::Finalized,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionConfig {
    #[serde(default = "default_commitment")]
    pub commitment: CommitmentSetting,

    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletConfig {
    /// Path to keypair file
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscrowConfig {
    #[serde(default = "default_escrow_program")]
    pub program_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_program")]
    pub program_id: String,
}

// Default value functions
fn default_rpc_endpoint() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_rpc_timeout() -> u64 {
    30
}

fn default_commitment() -> CommitmentSetting {
    CommitmentSetting::Confirmed
}

fn default_confirm_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    500
}

fn default_keypair_path() -> String {
    "~/.config/solana/id.json".to_string()
}

fn default_escrow_program() -> String {
    "FmxWd8tXXW12kUQmgZ6cbd9AP4otQx44A5YzRGk3cZPy".to_string()
}

fn default_metadata_program() -> String {
    "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s".to_string()
}


impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            commitment: default_commitment(),
            confirm_timeout_secs: default_confirm_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            program_id: default_escrow_program(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            program_id: default_metadata_program(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with `.env` and environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Overwrite fields from `LEDGER_*` variables when set and non-empty
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(endpoint) = lookup(ENV_RPC_URL) {
            self.rpc.endpoint = endpoint;
        }
        if let Some(path) = lookup(ENV_KEYPAIR) {
            self.wallet.keypair_path = path;
        }
        if let Some(program) = lookup(ENV_ESCROW_PROGRAM) {
            self.escrow.program_id = program;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.endpoint.trim().is_empty() {
            anyhow::bail!("rpc.endpoint must not be empty");
        }
        if self.rpc.timeout_secs == 0 {
            anyhow::bail!("rpc.timeout_secs must be greater than zero");
        }
        if self.submission.confirm_timeout_secs == 0 {
            anyhow::bail!("submission.confirm_timeout_secs must be greater than zero");
        }
        if self.submission.poll_interval_ms == 0
            || self.submission.poll_interval() >= self.submission.confirm_timeout()
        {
            anyhow::bail!(
                "submission.poll_interval_ms ({}) must be non-zero and below confirm_timeout",
                self.submission.poll_interval_ms
            );
        }
        self.escrow_program_id()?;
        self.metadata_program_id()?;
        Ok(())
    }

    pub fn escrow_program_id(&self) -> anyhow::Result<Pubkey> {
        parse_address(&self.escrow.program_id)
            .map_err(|e| anyhow::anyhow!("escrow.program_id: {}", e))
    }

    pub fn metadata_program_id(&self) -> anyhow::Result<Pubkey> {
        parse_address(&self.metadata.program_id)
            .map_err(|e| anyhow::anyhow!("metadata.program_id: {}", e))
    }

    /// Keypair path with a leading `~` expanded against `$HOME`
    pub fn keypair_path(&self) -> PathBuf {
        expand_home(&self.wallet.keypair_path)
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SubmissionConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
