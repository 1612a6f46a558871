//! Configuration management for MyCoin

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub staking: StakingConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub path: String,
    /// Keep state in memory only; nothing is written to disk.
    #[serde(default)]
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_genesis_supply")]
    pub genesis_supply: f64,
    /// Reward paid to the proposer while no validator has staked.
    #[serde(default = "default_mining_reward")]
    pub mining_reward: f64,
    #[serde(default = "default_mempool_capacity")]
    pub mempool_capacity: usize,
    #[serde(default = "default_block_timeout")]
    pub block_production_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            genesis_supply: default_genesis_supply(),
            mining_reward: default_mining_reward(),
            mempool_capacity: default_mempool_capacity(),
            block_production_timeout_secs: default_block_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StakingConfig {
    #[serde(default = "default_min_stake")]
    pub min_stake: f64,
    #[serde(default = "default_max_validators")]
    pub max_validators: usize,
    #[serde(default = "default_slashing_penalty")]
    pub slashing_penalty_percent: f64,
    #[serde(default = "default_block_reward")]
    pub block_reward: f64,
    #[serde(default = "default_annual_reward")]
    pub annual_reward_percent: f64,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_stake: default_min_stake(),
            max_validators: default_max_validators(),
            slashing_penalty_percent: default_slashing_penalty(),
            block_reward: default_block_reward(),
            annual_reward_percent: default_annual_reward(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Bonus credited to freshly created or imported (empty) wallets.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if !self.storage.in_memory && self.storage.path.trim().is_empty() {
            return Err(ChainError::InvalidConfig(
                "storage.path must be set when storage.in_memory is false".to_string(),
            ));
        }

        let amounts = [
            ("ledger.genesis_supply", self.ledger.genesis_supply),
            ("ledger.mining_reward", self.ledger.mining_reward),
            ("staking.min_stake", self.staking.min_stake),
            ("staking.block_reward", self.staking.block_reward),
            ("staking.annual_reward_percent", self.staking.annual_reward_percent),
            ("wallet.initial_balance", self.wallet.initial_balance),
        ];
        for (name, value) in amounts {
            if !value.is_finite() || value < 0.0 {
                return Err(ChainError::InvalidConfig(format!(
                    "{} cannot be negative (got {})",
                    name, value
                )));
            }
        }

        if self.staking.max_validators == 0 {
            return Err(ChainError::InvalidConfig(
                "staking.max_validators must be at least 1".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.staking.slashing_penalty_percent) {
            return Err(ChainError::InvalidConfig(format!(
                "staking.slashing_penalty_percent must be within 0..=100 (got {})",
                self.staking.slashing_penalty_percent
            )));
        }

        if self.ledger.block_production_timeout_secs == 0 {
            return Err(ChainError::InvalidConfig(
                "ledger.block_production_timeout_secs must be positive".to_string(),
            ));
        }

        if self.ledger.mempool_capacity == 0 {
            return Err(ChainError::InvalidConfig(
                "ledger.mempool_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    let config: Config = if path.exists() {
        let config_str = fs::read_to_string(path).map_err(|e| {
            ChainError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&config_str).map_err(|e| {
            ChainError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e))
        })?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

fn default_api_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_state_path() -> String {
    "./data/blockchain.json".to_string()
}

fn default_genesis_supply() -> f64 {
    1_000_000.0
}

fn default_mining_reward() -> f64 {
    50.0
}

fn default_mempool_capacity() -> usize {
    10_000
}

fn default_block_timeout() -> u64 {
    10
}

fn default_min_stake() -> f64 {
    10.0
}

fn default_max_validators() -> usize {
    100
}

fn default_slashing_penalty() -> f64 {
    10.0
}

fn default_block_reward() -> f64 {
    5.0
}

fn default_annual_reward() -> f64 {
    5.0
}

fn default_initial_balance() -> f64 {
    100.0
}
