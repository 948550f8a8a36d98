//! Wallet position reconciliation.
//!
//! A wallet is maintained incrementally from settled trade receipts
//! ([`apply_receipt`]), can be rebuilt from the pool's event history
//! ([`replay`]), and can be read back from token balances
//! ([`wallet_from_chain`]). [`WalletReconciler`] checks all three agree.

pub mod apply;
pub mod error;
pub mod verify;

pub use apply::*;
pub use error::*;
pub use verify::*;
