//! Chain-level checks: link and hash verification over the stored chain, and
//! the affordability screen applied when a block is assembled.

use super::chain::Block;
use super::state::apply_transaction;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::Transaction;
use std::collections::HashMap;

/// Verify every block after genesis: its stored hash must match the
/// recomputed one and its predecessor link must match the previous block.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainError> {
    for pair in chain.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);

        if current.index != previous.index + 1 {
            return Err(ChainError::IntegrityError {
                index: current.index,
                reason: format!("expected index {}", previous.index + 1),
            });
        }

        if let Some(tx) = current
            .transactions
            .iter()
            .find(|tx| tx.hash != tx.recompute_hash())
        {
            return Err(ChainError::IntegrityError {
                index: current.index,
                reason: format!("transaction {} does not match its content", tx.hash_str()),
            });
        }

        let recomputed = current.recompute_hash();
        if current.hash != recomputed {
            return Err(ChainError::IntegrityError {
                index: current.index,
                reason: format!(
                    "stored hash {} does not match recomputed {}",
                    current.hash_str(),
                    hex::encode(recomputed)
                ),
            });
        }

        if current.previous_hash != previous.hash {
            return Err(ChainError::IntegrityError {
                index: current.index,
                reason: format!(
                    "previous hash {} does not link to {}",
                    hex::encode(current.previous_hash),
                    previous.hash_str()
                ),
            });
        }
    }
    Ok(())
}

/// Replay `pending` in order against a copy of `balances`. Returns the
/// transactions that settle cleanly and, separately, those that would
/// overdraw their sender.
pub fn screen_affordable(
    balances: &HashMap<Address, f64>,
    pending: Vec<Transaction>,
) -> (Vec<Transaction>, Vec<Transaction>) {
    let mut running = balances.clone();
    let mut included = Vec::with_capacity(pending.len());
    let mut evicted = Vec::new();

    for tx in pending {
        match apply_transaction(&mut running, &tx) {
            Ok(()) => included.push(tx),
            Err(_) => evicted.push(tx),
        }
    }

    (included, evicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::GENESIS_HASH;

    fn chain_of(len: u64) -> Vec<Block> {
        let mut chain = vec![Block::genesis()];
        for index in 1..len {
            let previous = chain.last().map_or(GENESIS_HASH, |b| b.hash);
            let txs = vec![Transaction::reward("miner", 5.0, 100 + index as i64)];
            chain.push(Block::build_at(txs, previous, "miner", index, 100 + index as i64));
        }
        chain
    }

    #[test]
    fn test_valid_chain_passes() {
        assert!(validate_chain(&chain_of(1)).is_ok());
        assert!(validate_chain(&chain_of(5)).is_ok());
    }

    #[test]
    fn test_tampered_block_detected() {
        let mut chain = chain_of(4);
        chain[2].transactions[0].amount = 5_000.0;
        let err = validate_chain(&chain).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { index: 2, .. }));
    }

    #[test]
    fn test_rehashed_transaction_still_breaks_block_hash() {
        let mut chain = chain_of(3);
        let tx = &mut chain[1].transactions[0];
        tx.amount = 9_999.0;
        tx.hash = tx.recompute_hash();

        let err = validate_chain(&chain).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { index: 1, .. }));
        assert!(err.to_string().contains("does not match recomputed"));
    }

    #[test]
    fn test_stale_transaction_hash_detected() {
        let mut chain = chain_of(3);
        chain[2].transactions[0].recipient = "thief".to_string();
        chain[2].hash = chain[2].recompute_hash();

        let err = validate_chain(&chain).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { index: 2, .. }));
        assert!(err.to_string().contains("does not match its content"));
    }

    #[test]
    fn test_broken_link_detected() {
        let mut chain = chain_of(4);
        chain[3].previous_hash = [7u8; 32];
        chain[3].hash = chain[3].recompute_hash();
        let err = validate_chain(&chain).unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { index: 3, .. }));
        assert!(err.to_string().contains("does not link"));
    }

    #[test]
    fn test_screen_uses_running_balances() {
        let mut balances = HashMap::new();
        balances.insert("alice".to_string(), 10.0);

        let pending = vec![
            Transaction::with_timestamp("alice", "bob", 4.0, 1.0, 1),
            Transaction::with_timestamp("bob", "carol", 4.0, 0.0, 2),
            Transaction::with_timestamp("alice", "carol", 6.0, 0.0, 3),
            Transaction::with_timestamp("genesis", "dave", 100.0, 0.0, 4),
        ];
        let (included, evicted) = screen_affordable(&balances, pending);

        assert_eq!(included.len(), 3);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].recipient, "carol");
        assert_eq!(evicted[0].sender, "alice");
        // The input map is left alone.
        assert_eq!(balances["alice"], 10.0);
    }
}
