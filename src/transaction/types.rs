/// Transaction types for MyCoin
use crate::blockchain::Sha256Hash;
use crate::crypto::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sender of block reward transactions. Only block production mints these.
pub const REWARD_SENDER: &str = "";
/// Sender of transactions drawing on the genesis supply.
pub const GENESIS_ADDRESS: &str = "genesis";

/// An immutable intent to move `amount` from `sender` to `recipient`,
/// identified by the digest of its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: f64,
    pub fee: f64,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(with = "hex::serde")]
    pub hash: Sha256Hash,
    #[serde(with = "hex::serde", default)]
    pub signature: Vec<u8>,
    /// Compressed secp256k1 key of the sender, empty for mint transactions.
    #[serde(with = "hex::serde", default)]
    pub public_key: Vec<u8>,
}

impl Transaction {
    /// Create an unsigned transaction stamped with the current time.
    pub fn new(sender: impl Into<Address>, recipient: impl Into<Address>, amount: f64, fee: f64) -> Self {
        Self::with_timestamp(sender, recipient, amount, fee, chrono::Utc::now().timestamp())
    }

    pub fn with_timestamp(
        sender: impl Into<Address>,
        recipient: impl Into<Address>,
        amount: f64,
        fee: f64,
        timestamp: i64,
    ) -> Self {
        let sender = sender.into();
        let recipient = recipient.into();
        let hash = Self::calculate_hash(&sender, &recipient, amount, fee, timestamp);
        Transaction {
            sender,
            recipient,
            amount,
            fee,
            timestamp,
            hash,
            signature: Vec::new(),
            public_key: Vec::new(),
        }
    }

    /// Block reward paid to `proposer`.
    pub fn reward(proposer: impl Into<Address>, amount: f64, timestamp: i64) -> Self {
        Self::with_timestamp(REWARD_SENDER, proposer, amount, 0.0, timestamp)
    }

    pub fn calculate_hash(
        sender: &str,
        recipient: &str,
        amount: f64,
        fee: f64,
        timestamp: i64,
    ) -> Sha256Hash {
        let mut hasher = Sha256::new();
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart.
        hasher.update((sender.len() as u64).to_le_bytes());
        hasher.update(sender.as_bytes());
        hasher.update((recipient.len() as u64).to_le_bytes());
        hasher.update(recipient.as_bytes());
        hasher.update(amount.to_le_bytes());
        hasher.update(fee.to_le_bytes());
        hasher.update(timestamp.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn recompute_hash(&self) -> Sha256Hash {
        Self::calculate_hash(
            &self.sender,
            &self.recipient,
            self.amount,
            self.fee,
            self.timestamp,
        )
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }

    /// True for reward and genesis transactions, which create value rather
    /// than moving it from a key holder.
    pub fn is_mint(&self) -> bool {
        self.sender == REWARD_SENDER || self.sender == GENESIS_ADDRESS
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    /// Total debited from the sender on settlement.
    pub fn total_cost(&self) -> f64 {
        self.amount + self.fee
    }

    pub fn involves(&self, address: &str) -> bool {
        self.sender == address || self.recipient == address
    }

    pub fn sign(&mut self, signature: Vec<u8>, public_key: Vec<u8>) {
        self.signature = signature;
        self.public_key = public_key;
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty() && !self.public_key.is_empty()
    }
}
