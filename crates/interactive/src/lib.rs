//! Interactive control of Hyperdrive pools on a dev chain
//!
//! A [`LocalChain`] owns the chain handle and the registered [`Pool`]s.
//! Each pool wires a database, an ingestor and a trade executor together
//! and hands out [`Agent`]s: funded accounts that trade directly or
//! through a [`Policy`]. The chain can move time forward while minting
//! checkpoints, and the whole world (chain, databases, agents) can be
//! saved and restored.

pub mod agent;
pub mod context;
pub mod error;
pub mod local_chain;
pub mod policy;
pub mod pool;
pub mod snapshot;
pub mod sync;

pub use agent::Agent;
pub use context::{init_logging, ChainContext, ContextConfig, Faucet, StoreBackend};
pub use error::InteractiveError;
pub use local_chain::{LocalChain, DEFAULT_DEPLOYER};
pub use policy::{Policy, RandomPolicy, ScriptedPolicy};
pub use pool::{AgentConfig, Pool};
pub use snapshot::{AgentRecord, ChainMarker, PoolSnapshot, SnapshotRecord};
pub use sync::{BackgroundSync, BlockingSync, DataSync};
