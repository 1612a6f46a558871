/// Validation logic for transactions separated from type definitions
use crate::crypto::{address_from_public_key, verify_signature};
use crate::error::ChainError;
use crate::transaction::types::Transaction;

impl Transaction {
    /// Stateless well-formedness check: distinct parties, positive amount,
    /// non-negative fee and a hash that matches the content.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.sender == self.recipient {
            return Err(ChainError::InvalidTransaction(
                "Sender and recipient cannot be the same".to_string(),
            ));
        }

        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ChainError::InvalidTransaction(format!(
                "Amount must be positive, got {}",
                self.amount
            )));
        }

        if !self.fee.is_finite() || self.fee < 0.0 {
            return Err(ChainError::InvalidTransaction(format!(
                "Fee cannot be negative, got {}",
                self.fee
            )));
        }

        if self.hash != self.recompute_hash() {
            return Err(ChainError::InvalidTransaction(format!(
                "Hash mismatch for transaction {}",
                self.hash_str()
            )));
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks that the transaction was signed by the holder of the sender's
    /// key: the public key must derive the sender address and the signature
    /// must cover the transaction hash. Mint transactions carry no signature.
    pub fn verify_authorization(&self) -> Result<(), ChainError> {
        if self.is_mint() {
            return Ok(());
        }

        if !self.is_signed() {
            return Err(ChainError::InvalidTransaction(
                "Transaction not signed".to_string(),
            ));
        }

        let signer = address_from_public_key(&self.public_key)?;
        if signer != self.sender {
            return Err(ChainError::CryptoError(format!(
                "Public key belongs to {}, not sender {}",
                signer, self.sender
            )));
        }

        verify_signature(&self.public_key, &self.hash, &self.signature)
    }
}
