//! Ledger state: the chain, pending pool, balances and validator pool, plus
//! the state transitions that keep them consistent with each other.

use super::chain::{Block, GENESIS_HASH};
use super::validation::screen_affordable;
use crate::config::{LedgerConfig, StakingConfig};
use crate::consensus::{StakingPool, Validator};
use crate::crypto::Address;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::{Transaction, GENESIS_ADDRESS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    pub chain: Vec<Block>,
    pub pending_transactions: Mempool,
    pub mining_reward: f64,
    pub balances: HashMap<Address, f64>,
    pub staking_pool: StakingPool,
    /// Index of the last block whose effects are reflected in `balances`.
    #[serde(default)]
    pub settled_height: u64,
}

/// A confirmed transaction together with its location in the chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub block_index: u64,
    pub block_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StakingInfo {
    pub total_validators: usize,
    pub active_validators: usize,
    pub total_staked: f64,
    pub min_stake_amount: f64,
    pub max_validators: usize,
    pub slashing_penalty: f64,
    pub block_reward: f64,
    pub staking_reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainInfo {
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub mining_reward: f64,
    pub total_staked: f64,
    pub validators: usize,
    pub is_valid: bool,
    pub latest_block_hash: String,
}

impl LedgerState {
    /// A chain holding only the genesis block, with the genesis supply
    /// credited to the `"genesis"` account.
    pub fn genesis(ledger: &LedgerConfig, staking: &StakingConfig) -> Self {
        let mut balances = HashMap::new();
        balances.insert(GENESIS_ADDRESS.to_string(), ledger.genesis_supply);

        LedgerState {
            chain: vec![Block::genesis()],
            pending_transactions: Mempool::with_capacity(ledger.mempool_capacity),
            mining_reward: ledger.mining_reward,
            balances,
            staking_pool: StakingPool::new(staking),
            settled_height: 0,
        }
    }

    pub(crate) fn rebuild_indexes(&mut self) {
        self.pending_transactions.rebuild_index();
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Unknown addresses have a balance of zero.
    pub fn get_balance(&self, address: &str) -> f64 {
        self.balances.get(address).copied().unwrap_or(0.0)
    }

    pub fn credit(&mut self, address: &str, amount: f64) -> Result<(), ChainError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ChainError::InvalidTransaction(format!(
                "Cannot credit {} to {}",
                amount, address
            )));
        }
        *self.balances.entry(address.to_string()).or_insert(0.0) += amount;
        Ok(())
    }

    fn debit(&mut self, address: &str, amount: f64) -> Result<(), ChainError> {
        let available = self.get_balance(address);
        if available < amount {
            return Err(ChainError::InsufficientBalance {
                address: address.to_string(),
                available,
                required: amount,
            });
        }
        self.balances.insert(address.to_string(), available - amount);
        Ok(())
    }

    /// Screen a submitted transaction and queue it for the next block.
    pub fn admit_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        if tx.is_reward() {
            return Err(ChainError::InvalidTransaction(
                "Reward transactions are created by block production only".to_string(),
            ));
        }

        tx.validate()?;
        tx.verify_authorization()?;

        if !tx.is_mint() {
            let available = self.get_balance(&tx.sender);
            let required = tx.total_cost();
            if available < required {
                return Err(ChainError::InsufficientBalance {
                    address: tx.sender.clone(),
                    available,
                    required,
                });
            }
        }

        self.pending_transactions.add_transaction(tx)
    }

    /// Assemble every affordable pending transaction plus a reward for
    /// `proposer` into a new block, append it and settle it.
    pub fn produce_block_at(&mut self, proposer: &str, now: i64) -> Result<Block, ChainError> {
        if proposer.is_empty() || proposer == GENESIS_ADDRESS {
            return Err(ChainError::NotAValidator(proposer.to_string()));
        }

        let bootstrap = self.staking_pool.is_empty();
        if !bootstrap && !self.staking_pool.contains(proposer) {
            return Err(ChainError::NotAValidator(proposer.to_string()));
        }
        let reward = if bootstrap {
            self.mining_reward
        } else {
            self.staking_pool.block_reward
        };

        let pending = self.pending_transactions.drain_all();
        let (mut transactions, evicted) = screen_affordable(&self.balances, pending);
        for tx in &evicted {
            warn!(
                "Evicting transaction {}: {} can no longer cover {:.2}",
                tx.hash_str(),
                tx.sender,
                tx.total_cost()
            );
        }
        transactions.push(Transaction::reward(proposer, reward, now));

        let previous_hash = self.latest_block().map_or(GENESIS_HASH, |b| b.hash);
        let index = self.chain.len() as u64;
        let block = Block::build_at(transactions, previous_hash, proposer, index, now);

        self.chain.push(block.clone());
        self.settle_balances(&block)?;

        if !bootstrap {
            self.staking_pool.reward_at(proposer, reward, now)?;
        }

        Ok(block)
    }

    /// Apply a block's transfers to the balance map. A block is settled at
    /// most once and only directly after its predecessor.
    pub fn settle_balances(&mut self, block: &Block) -> Result<(), ChainError> {
        if block.index != self.settled_height + 1 {
            return Err(ChainError::IntegrityError {
                index: block.index,
                reason: format!(
                    "cannot settle out of order (last settled block is {})",
                    self.settled_height
                ),
            });
        }

        let mut balances = self.balances.clone();
        for tx in &block.transactions {
            apply_transaction(&mut balances, tx).map_err(|e| ChainError::IntegrityError {
                index: block.index,
                reason: e.to_string(),
            })?;
        }

        self.balances = balances;
        self.settled_height = block.index;
        Ok(())
    }

    /// Move `amount` from the spendable balance into a new validator stake.
    pub fn stake_at(&mut self, address: &str, amount: f64, now: i64) -> Result<(), ChainError> {
        let minimum = self.staking_pool.min_stake_amount;
        if !amount.is_finite() || amount < minimum {
            return Err(ChainError::BelowMinimumStake { minimum, amount });
        }

        let available = self.get_balance(address);
        if available < amount {
            return Err(ChainError::InsufficientStakeBalance {
                address: address.to_string(),
                available,
                required: amount,
            });
        }

        self.debit(address, amount)?;
        if let Err(e) = self.staking_pool.stake_at(address, amount, now) {
            // Undo the debit so a refused stake leaves the balance untouched.
            self.credit(address, amount)?;
            return Err(e);
        }
        Ok(())
    }

    /// Remove the validator and refund its current (possibly slashed) stake.
    pub fn unstake(&mut self, address: &str) -> Result<f64, ChainError> {
        let validator = self.staking_pool.unstake(address)?;
        self.credit(address, validator.staked_amount)?;
        Ok(validator.staked_amount)
    }

    pub fn slash(&mut self, address: &str) -> Result<Validator, ChainError> {
        self.staking_pool.slash(address).cloned()
    }

    /// Every confirmed transaction touching `address`, oldest first.
    pub fn transaction_history(&self, address: &str) -> Vec<TransactionRecord> {
        self.chain
            .iter()
            .flat_map(|block| {
                block
                    .transactions
                    .iter()
                    .filter(|tx| tx.involves(address))
                    .map(move |tx| TransactionRecord {
                        transaction: tx.clone(),
                        block_index: block.index,
                        block_hash: block.hash_str(),
                    })
            })
            .collect()
    }

    pub fn staking_info(&self) -> StakingInfo {
        let validators = self.staking_pool.get_all_validators();
        StakingInfo {
            total_validators: validators.len(),
            active_validators: validators.iter().filter(|v| v.is_active).count(),
            total_staked: self.staking_pool.total_staked(),
            min_stake_amount: self.staking_pool.min_stake_amount,
            max_validators: self.staking_pool.max_validators,
            slashing_penalty: self.staking_pool.slashing_penalty,
            block_reward: self.staking_pool.block_reward,
            staking_reward: self.staking_pool.staking_reward,
        }
    }

    pub fn chain_info(&self) -> ChainInfo {
        ChainInfo {
            chain_length: self.chain.len(),
            pending_transactions: self.pending_transactions.len(),
            mining_reward: self.mining_reward,
            total_staked: self.staking_pool.total_staked(),
            validators: self.staking_pool.len(),
            is_valid: super::validation::validate_chain(&self.chain).is_ok(),
            latest_block_hash: self
                .latest_block()
                .map(|b| b.hash_str())
                .unwrap_or_default(),
        }
    }
}

/// Apply one transfer to `balances`. Mint senders are not debited; any other
/// sender must cover amount plus fee.
pub(crate) fn apply_transaction(
    balances: &mut HashMap<Address, f64>,
    tx: &Transaction,
) -> Result<(), ChainError> {
    if !tx.is_mint() {
        let available = balances.get(&tx.sender).copied().unwrap_or(0.0);
        let required = tx.total_cost();
        if available < required {
            return Err(ChainError::InsufficientBalance {
                address: tx.sender.clone(),
                available,
                required,
            });
        }
        balances.insert(tx.sender.clone(), available - required);
    }
    *balances.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
    Ok(())
}
