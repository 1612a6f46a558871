//! Wallets: key holders that sign transactions on behalf of an address.

use crate::crypto::{Address, KeyPair};
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub name: Option<String>,
    pub address: Address,
    pub public_key_hex: String,
    pub secret_key_hex: String,
    /// RFC3339 creation timestamp
    pub created: String,
}

impl Wallet {
    /// Create a wallet around a freshly generated key pair.
    pub fn new(name: Option<String>) -> Self {
        Self::from_keypair(&KeyPair::generate(), name)
    }

    pub fn from_keypair(keypair: &KeyPair, name: Option<String>) -> Self {
        Wallet {
            name,
            address: keypair.address(),
            public_key_hex: hex::encode(keypair.public_key_bytes()),
            secret_key_hex: hex::encode(keypair.secret_key_bytes()),
            created: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Import a wallet from a hex-encoded secret key.
    pub fn from_secret_hex(secret_key_hex: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(secret_key_hex.trim())
            .map_err(|e| ChainError::WalletError(format!("Invalid private key hex: {}", e)))?;
        let keypair = KeyPair::from_secret_bytes(&bytes)?;
        Ok(Self::from_keypair(&keypair, None))
    }

    /// Deterministically derive a wallet from a passphrase: the secret key is
    /// the SHA-256 digest of the passphrase.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, ChainError> {
        if passphrase.is_empty() {
            return Err(ChainError::WalletError(
                "Passphrase cannot be empty".to_string(),
            ));
        }
        let digest = Sha256::digest(passphrase.as_bytes());
        let keypair = KeyPair::from_secret_bytes(&digest)?;
        Ok(Self::from_keypair(&keypair, None))
    }

    pub fn get_keypair(&self) -> Result<KeyPair, ChainError> {
        let bytes = hex::decode(&self.secret_key_hex)
            .map_err(|e| ChainError::WalletError(format!("Corrupt secret key: {}", e)))?;
        KeyPair::from_secret_bytes(&bytes)
    }

    /// Build and sign a transfer from this wallet.
    pub fn create_transaction(
        &self,
        recipient: impl Into<Address>,
        amount: f64,
        fee: f64,
    ) -> Result<Transaction, ChainError> {
        let mut tx = Transaction::new(self.address.clone(), recipient, amount, fee);
        self.sign_transaction(&mut tx)?;
        Ok(tx)
    }

    /// Sign `tx` over its hash. The transaction must be sent from this wallet.
    pub fn sign_transaction(&self, tx: &mut Transaction) -> Result<(), ChainError> {
        if tx.sender != self.address {
            return Err(ChainError::WalletError(format!(
                "Wallet {} cannot sign for sender {}",
                self.address, tx.sender
            )));
        }
        let keypair = self.get_keypair()?;
        let signature = keypair.sign(&tx.hash)?;
        tx.sign(signature.to_vec(), keypair.public_key_bytes().to_vec());
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ChainError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ChainError::WalletError(format!("Failed to serialize wallet: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| ChainError::WalletError(format!("Failed to write wallet: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, ChainError> {
        let json = fs::read_to_string(path)
            .map_err(|e| ChainError::WalletError(format!("Failed to read wallet: {}", e)))?;
        serde_json::from_str(&json)
            .map_err(|e| ChainError::WalletError(format!("Failed to parse wallet: {}", e)))
    }
}
