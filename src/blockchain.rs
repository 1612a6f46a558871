// Ledger core. Block and engine live in `core/chain.rs`, the state
// transitions in `core/state.rs` and chain checks in `core/validation.rs`.

pub mod core;
pub use core::*;
