//! Nonce-coordinated trade execution for Hyperdrive agents.
//!
//! [`TradeExecutor`] validates a batch of intents, reads the account's
//! pending nonce once and submits every intent concurrently with
//! consecutive nonces. Failed trades are classified by [`ErrorClassifier`]
//! and written out by [`CrashReporter`].

pub mod calls;
pub mod classifier;
pub mod config;
pub mod crash;
pub mod error;
pub mod executor;
pub mod liquidate;
pub mod validator;

pub use calls::*;
pub use classifier::*;
pub use config::*;
pub use crash::*;
pub use error::ExecutionError;
pub use executor::*;
pub use liquidate::*;
pub use validator::*;
