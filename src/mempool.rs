//! Transaction pool: the ordered, duplicate-free set of admitted but
//! unconfirmed transactions.

use crate::blockchain::Sha256Hash;
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_MEMPOOL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mempool {
    transactions: Vec<Transaction>,
    #[serde(default = "default_capacity")]
    capacity: usize,
    /// Rebuilt from `transactions` on load.
    #[serde(skip)]
    index: HashSet<Sha256Hash>,
}

fn default_capacity() -> usize {
    DEFAULT_MEMPOOL_CAPACITY
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMPOOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Mempool {
            transactions: Vec::new(),
            capacity,
            index: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a transaction, rejecting malformed ones, duplicates (by hash) and
    /// anything beyond capacity.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        tx.validate()?;

        if self.contains(&tx.hash) {
            return Err(ChainError::DuplicateTransaction(tx.hash_str()));
        }

        if self.transactions.len() >= self.capacity {
            return Err(ChainError::MempoolFull(self.capacity));
        }

        self.index.insert(tx.hash);
        self.transactions.push(tx);
        Ok(())
    }

    /// Up to `limit` transactions in admission order; `0` means all.
    pub fn get_transactions(&self, limit: usize) -> &[Transaction] {
        if limit == 0 || limit >= self.transactions.len() {
            &self.transactions
        } else {
            &self.transactions[..limit]
        }
    }

    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    pub fn remove_transactions(&mut self, hashes: &[Sha256Hash]) {
        let doomed: HashSet<&Sha256Hash> = hashes.iter().collect();
        self.transactions.retain(|tx| !doomed.contains(&tx.hash));
        for hash in hashes {
            self.index.remove(hash);
        }
    }

    /// Take every pending transaction, leaving the pool empty.
    pub fn drain_all(&mut self) -> Vec<Transaction> {
        self.index.clear();
        std::mem::take(&mut self.transactions)
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.index.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index = self.transactions.iter().map(|tx| tx.hash).collect();
    }
}
