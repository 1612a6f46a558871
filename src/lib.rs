//! MyCoin - a single-node proof-of-stake ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, ledger state and the engine that drives them
//! - [`transaction`] - Transfer records, hashing and validation
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus
//! - [`consensus`] - Validator pool and stake-weighted proposer selection
//!
//! ## Cryptography
//! - [`crypto`] - Key pairs, addresses and signatures (secp256k1)
//!
//! ## State Management
//! - [`wallet`] - Key holders that sign transfers
//! - [`persistence`] - Whole-state storage backends (JSON file, memory)
//!
//! ## Integration
//! - [`api`] - REST API (feature `api`)
//! - [`node`] - Node start-up
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus
// ============================================================================
pub mod consensus;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;
pub mod wallet;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;
pub mod node;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
