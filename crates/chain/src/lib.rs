//! Chain access for Hyperdrive trading agents
//!
//! [`ChainClient`] covers node-level operations (blocks, nonces, receipts,
//! snapshots); [`ContractCaller`] covers one pool and its base token.
//! Both are implemented over JSON-RPC and by the in-process [`sim`] chain.

pub mod backoff;
pub mod client;
pub mod contract;
pub mod error;
pub mod rpc;
pub mod sim;

pub use backoff::*;
pub use client::*;
pub use contract::*;
pub use error::*;
pub use rpc::*;
pub use sim::{SimPoolParams, SimulatedChain, SimulatedPool};
