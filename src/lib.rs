//! Hyperdrive trading agents
//!
//! Facade over the workspace crates. Most users start from
//! [`interactive::LocalChain`]:
//!
//! ```no_run
//! use std::time::Duration;
//! use hyperdrive_agents::interactive::{AgentConfig, ContextConfig, LocalChain};
//! use hyperdrive_agents::chain::SimPoolParams;
//! use hyperdrive_agents::types::fixed::units;
//!
//! # async fn run() -> Result<(), hyperdrive_agents::interactive::InteractiveError> {
//! let chain = LocalChain::simulated(31337, 1_700_000_000, ContextConfig::default()).await?;
//! let pool = chain.deploy_pool(SimPoolParams::default()).await?;
//! let agent = pool.init_agent(AgentConfig::new().with_base(units(100_000))).await?;
//! agent.open_long(units(1_000)).await?;
//! chain.advance_time(Duration::from_secs(3600), true).await?;
//! # Ok(())
//! # }
//! ```

pub use hyperdrive_agents_chain as chain;
pub use hyperdrive_agents_config as config;
pub use hyperdrive_agents_executor as executor;
pub use hyperdrive_agents_interactive as interactive;
pub use hyperdrive_agents_metrics as metrics;
pub use hyperdrive_agents_reconciler as reconciler;
pub use hyperdrive_agents_store as store;
pub use hyperdrive_agents_types as types;
