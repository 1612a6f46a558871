use super::state::{ChainInfo, LedgerState, StakingInfo, TransactionRecord};
use super::validation::validate_chain;
use crate::config::Config;
use crate::consensus::Validator;
use crate::error::ChainError;
use crate::persistence::{InMemoryPersistence, JsonFilePersistence, Persistence};
use crate::transaction::Transaction;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub type Sha256Hash = [u8; 32];

/// Predecessor and own hash of the synthetic genesis block.
pub const GENESIS_HASH: Sha256Hash = [0u8; 32];
pub const GENESIS_TIMESTAMP: i64 = 1_609_459_200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    #[serde(with = "hex::serde")]
    pub previous_hash: Sha256Hash,
    #[serde(with = "hex::serde")]
    pub hash: Sha256Hash,
}

impl Block {
    pub fn genesis() -> Self {
        Block {
            index: 0,
            timestamp: GENESIS_TIMESTAMP,
            transactions: Vec::new(),
            previous_hash: GENESIS_HASH,
            hash: GENESIS_HASH,
        }
    }

    /// Build a block stamped with the current time. The proposer is folded
    /// into the hash but not stored.
    pub fn build(
        transactions: Vec<Transaction>,
        previous_hash: Sha256Hash,
        proposer: &str,
        index: u64,
    ) -> Self {
        Self::build_at(
            transactions,
            previous_hash,
            proposer,
            index,
            chrono::Utc::now().timestamp(),
        )
    }

    pub fn build_at(
        transactions: Vec<Transaction>,
        previous_hash: Sha256Hash,
        proposer: &str,
        index: u64,
        timestamp: i64,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            hash: GENESIS_HASH,
        };
        block.hash = block.hash_at_creation(proposer);
        block
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Digest over (index, timestamp, predecessor hash, proposer, transactions).
    pub fn hash_at_creation(&self, proposer: &str) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update((proposer.len() as u64).to_le_bytes());
        hasher.update(proposer.as_bytes());
        // Content hash, not the stored `tx.hash`.
        for tx in &self.transactions {
            hasher.update(tx.recompute_hash());
            hasher.update((tx.signature.len() as u64).to_le_bytes());
            hasher.update(&tx.signature);
            hasher.update((tx.public_key.len() as u64).to_le_bytes());
            hasher.update(&tx.public_key);
        }
        hasher.finalize().into()
    }

    /// The proposer-omitting digest: the creation hash with an empty proposer.
    pub fn hash_for_integrity_check(&self) -> Sha256Hash {
        self.hash_at_creation("")
    }

    /// The proposer, recovered from the block's reward transaction.
    pub fn proposer(&self) -> Option<&str> {
        self.transactions
            .iter()
            .rev()
            .find(|tx| tx.is_reward())
            .map(|tx| tx.recipient.as_str())
    }

    /// Recompute the stored hash for later verification. Uses the proposer
    /// named by the reward transaction, or the proposer-omitting form for
    /// blocks that carry none.
    pub fn recompute_hash(&self) -> Sha256Hash {
        match self.proposer() {
            Some(proposer) => self.hash_at_creation(proposer),
            None => self.hash_for_integrity_check(),
        }
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }
}

/// The ledger engine. All state sits behind one reader/writer lock: mutating
/// operations hold the write lock for their whole duration, persistence
/// included; queries share the read lock.
pub struct Blockchain {
    state: RwLock<LedgerState>,
    persistence: Box<dyn Persistence>,
}

impl Blockchain {
    /// Fresh genesis state kept in memory only.
    pub fn new(config: &Config) -> Self {
        Blockchain {
            state: RwLock::new(LedgerState::genesis(&config.ledger, &config.staking)),
            persistence: Box::new(InMemoryPersistence::new()),
        }
    }

    /// Open the backend named by `config.storage`.
    pub fn open(config: &Config) -> Result<Self, ChainError> {
        let persistence: Box<dyn Persistence> = if config.storage.in_memory {
            Box::new(InMemoryPersistence::new())
        } else {
            Box::new(JsonFilePersistence::new(&config.storage.path))
        };
        Self::with_persistence(config, persistence)
    }

    /// Load state from `persistence`, or seed genesis state if it holds none.
    pub fn with_persistence(
        config: &Config,
        persistence: Box<dyn Persistence>,
    ) -> Result<Self, ChainError> {
        let state = match persistence.load_state()? {
            Some(mut state) => {
                state.rebuild_indexes();
                info!(
                    "Loaded ledger state: {} blocks, {} pending, {} validators",
                    state.chain.len(),
                    state.pending_transactions.len(),
                    state.staking_pool.len()
                );
                state
            }
            None => {
                let state = LedgerState::genesis(&config.ledger, &config.staking);
                persistence.save_state(&state)?;
                info!("No saved state found; seeded genesis state");
                state
            }
        };

        Ok(Blockchain {
            state: RwLock::new(state),
            persistence,
        })
    }

    /// Apply `op` to a working copy of the state, persist the copy, then
    /// publish it. On any failure the published state is unchanged.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut LedgerState) -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        let mut guard = self.state.write();
        let mut working = guard.clone();
        let output = op(&mut working)?;
        self.persistence.save_state(&working)?;
        *guard = working;
        Ok(output)
    }

    fn read<T>(&self, query: impl FnOnce(&LedgerState) -> T) -> T {
        query(&self.state.read())
    }

    pub fn admit_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        let hash = tx.hash_str();
        self.mutate(|state| state.admit_transaction(tx))?;
        info!("Transaction {} added to pending pool", hash);
        Ok(())
    }

    /// Produce a block for `proposer`. With no validators staked any address
    /// is accepted (bootstrap mode); otherwise `proposer` must be a known
    /// validator.
    pub fn produce_block(&self, proposer: &str) -> Result<Block, ChainError> {
        let now = chrono::Utc::now().timestamp();
        let block = self.mutate(|state| state.produce_block_at(proposer, now))?;
        log_block(&block, proposer);
        Ok(block)
    }

    /// Run the stake-weighted lottery and produce a block only if it picks
    /// `candidate`. Bootstrap mode skips the lottery.
    pub fn produce_selected_block(&self, candidate: &str) -> Result<Block, ChainError> {
        self.produce_selected_block_with(candidate, &mut OsRng)
    }

    pub fn produce_selected_block_with<R: Rng + ?Sized>(
        &self,
        candidate: &str,
        rng: &mut R,
    ) -> Result<Block, ChainError> {
        let now = chrono::Utc::now().timestamp();
        let block = self.mutate(|state| {
            if !state.staking_pool.is_empty() {
                let selected = state.staking_pool.select_proposer_at(now, rng)?;
                if selected != candidate {
                    warn!("Block production denied for {} (selected: {})", candidate, selected);
                    return Err(ChainError::NotSelectedValidator {
                        candidate: candidate.to_string(),
                        selected,
                    });
                }
            }
            state.produce_block_at(candidate, now)
        })?;
        log_block(&block, candidate);
        Ok(block)
    }

    /// Credit `amount` to `address` outside of block production (wallet bonus).
    pub fn credit(&self, address: &str, amount: f64) -> Result<f64, ChainError> {
        let balance = self.mutate(|state| {
            state.credit(address, amount)?;
            Ok(state.get_balance(address))
        })?;
        info!("Balance of {} updated to {:.2}", address, balance);
        Ok(balance)
    }

    pub fn stake(&self, address: &str, amount: f64) -> Result<(), ChainError> {
        let now = chrono::Utc::now().timestamp();
        self.mutate(|state| state.stake_at(address, amount, now))?;
        info!("{} staked {:.2}", address, amount);
        Ok(())
    }

    /// Remove `address` from the validator pool and return its stake to the
    /// ledger. Returns the refunded amount.
    pub fn unstake(&self, address: &str) -> Result<f64, ChainError> {
        let refunded = self.mutate(|state| state.unstake(address))?;
        info!("{} unstaked {:.2}", address, refunded);
        Ok(refunded)
    }

    pub fn slash_validator(&self, address: &str) -> Result<Validator, ChainError> {
        let validator = self.mutate(|state| state.slash(address))?;
        warn!(
            "Validator {} slashed (count {}, stake now {:.2})",
            address, validator.slash_count, validator.staked_amount
        );
        Ok(validator)
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.read(|state| state.get_balance(address))
    }

    pub fn verify_chain_integrity(&self) -> bool {
        self.check_chain_integrity().is_ok()
    }

    /// Like [`verify_chain_integrity`](Self::verify_chain_integrity) but
    /// reports the first broken link.
    pub fn check_chain_integrity(&self) -> Result<(), ChainError> {
        self.read(|state| validate_chain(&state.chain))
    }

    pub fn latest_block(&self) -> Option<Block> {
        self.read(|state| state.latest_block().cloned())
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read(|state| state.chain.clone())
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        self.read(|state| state.chain.get(index as usize).cloned())
    }

    pub fn chain_len(&self) -> usize {
        self.read(|state| state.chain.len())
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.read(|state| state.pending_transactions.get_all_transactions())
    }

    pub fn pending_count(&self) -> usize {
        self.read(|state| state.pending_transactions.len())
    }

    pub fn get_validators(&self) -> Vec<Validator> {
        self.read(|state| state.staking_pool.get_all_validators())
    }

    pub fn get_validator(&self, address: &str) -> Result<Validator, ChainError> {
        self.read(|state| state.staking_pool.get_validator(address).cloned())
    }

    pub fn total_staked(&self) -> f64 {
        self.read(|state| state.staking_pool.total_staked())
    }

    pub fn staking_info(&self) -> StakingInfo {
        self.read(|state| state.staking_info())
    }

    pub fn chain_info(&self) -> ChainInfo {
        self.read(|state| state.chain_info())
    }

    pub fn accrued_staking_reward(&self, address: &str) -> Result<f64, ChainError> {
        self.read(|state| state.staking_pool.compute_accrued_staking_reward(address))
    }

    pub fn transaction_history(&self, address: &str) -> Vec<TransactionRecord> {
        self.read(|state| state.transaction_history(address))
    }

    /// A copy of the full ledger state.
    pub fn snapshot(&self) -> LedgerState {
        self.read(|state| state.clone())
    }
}

fn log_block(block: &Block, proposer: &str) {
    info!(
        "Block {} created: hash={} transactions={} proposer={}",
        block.index,
        block.hash_str(),
        block.transactions.len(),
        proposer
    );
}
