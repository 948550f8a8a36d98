//! In-process stand-in for a local dev node running Hyperdrive pools

mod chain;
mod market;
mod pool;
mod token;

pub use chain::SimulatedChain;
pub use market::SimPoolParams;
pub use pool::SimulatedPool;
