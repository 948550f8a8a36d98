//! On-disk snapshot layout.
//!
//! ```text
//! {dir}/{chain_id}-pools.json          pool addresses
//! {dir}/chain.json                     chain snapshot marker
//! {dir}/pools/{pool}/db.json           pool database dump
//! {dir}/pools/{pool}/agents.json       agent addresses
//! {dir}/pools/{pool}/agents/{a}.json   agent state
//! ```
//!
//! A save writes everything into a sibling staging directory and then
//! swaps it in, so a failed save leaves the previous snapshot readable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hyperdrive_agents_store::PoolDump;
use hyperdrive_agents_types::Wallet;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

pub const CHAIN_FILE: &str = "chain.json";
const POOLS_DIR: &str = "pools";
const DB_FILE: &str = "db.json";
const AGENTS_FILE: &str = "agents.json";
const AGENTS_DIR: &str = "agents";

pub fn pools_file(chain_id: u64) -> String {
    format!("{chain_id}-pools.json")
}

/// Which chain snapshot the files belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMarker {
    pub chain_id: u64,
    pub snapshot_id: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub saved_at: DateTime<Utc>,
}

/// Serialized agent: wallet, policy state and RNG position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub address: String,
    pub name: String,
    pub policy: Option<String>,
    pub policy_state: serde_json::Value,
    pub rng: ChaCha8Rng,
    pub wallet: Wallet,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub address: String,
    pub dump: PoolDump,
    pub agents: Vec<AgentRecord>,
}

/// Everything a snapshot restores besides the chain itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub marker: ChainMarker,
    pub pools: Vec<PoolSnapshot>,
}

impl SnapshotRecord {
    pub fn pool(&self, address: &str) -> Option<&PoolSnapshot> {
        self.pools.iter().find(|p| p.address == address)
    }

    /// Replace the snapshot at `dir`
    pub async fn write(&self, dir: &Path) -> Result<()> {
        let staging = sibling(dir, "staging")?;
        let previous = sibling(dir, "previous")?;
        remove_if_exists(&staging).await?;
        self.write_files(&staging).await?;

        let had_previous = tokio::fs::try_exists(dir).await?;
        if had_previous {
            remove_if_exists(&previous).await?;
            tokio::fs::rename(dir, &previous).await?;
        }
        if let Err(e) = tokio::fs::rename(&staging, dir).await {
            warn!(dir = %dir.display(), error = %e, "could not swap in new snapshot");
            if had_previous {
                tokio::fs::rename(&previous, dir).await?;
            }
            return Err(e.into());
        }
        if had_previous {
            remove_if_exists(&previous).await?;
        }
        debug!(dir = %dir.display(), pools = self.pools.len(), "wrote snapshot");
        Ok(())
    }

    async fn write_files(&self, root: &Path) -> Result<()> {
        tokio::fs::create_dir_all(root.join(POOLS_DIR)).await?;
        let addresses: Vec<&str> = self.pools.iter().map(|p| p.address.as_str()).collect();
        write_json(&root.join(pools_file(self.marker.chain_id)), &addresses).await?;
        write_json(&root.join(CHAIN_FILE), &self.marker).await?;

        for pool in &self.pools {
            let pool_dir = root.join(POOLS_DIR).join(&pool.address);
            tokio::fs::create_dir_all(pool_dir.join(AGENTS_DIR)).await?;
            write_json(&pool_dir.join(DB_FILE), &pool.dump).await?;
            let agents: Vec<&str> = pool.agents.iter().map(|a| a.address.as_str()).collect();
            write_json(&pool_dir.join(AGENTS_FILE), &agents).await?;
            for agent in &pool.agents {
                write_json(&pool_dir.join(AGENTS_DIR).join(format!("{}.json", agent.address)), agent).await?;
            }
        }
        Ok(())
    }

    /// Read a whole snapshot. Nothing is returned unless every file parses.
    pub async fn read(dir: &Path, chain_id: u64) -> Result<Self> {
        let addresses: Vec<String> = read_json(&dir.join(pools_file(chain_id))).await?;
        let marker: ChainMarker = read_json(&dir.join(CHAIN_FILE)).await?;

        let mut pools = Vec::with_capacity(addresses.len());
        for address in addresses {
            let pool_dir = dir.join(POOLS_DIR).join(&address);
            let dump: PoolDump = read_json(&pool_dir.join(DB_FILE)).await?;
            let agent_addresses: Vec<String> = read_json(&pool_dir.join(AGENTS_FILE)).await?;
            let mut agents = Vec::with_capacity(agent_addresses.len());
            for agent in agent_addresses {
                agents.push(read_json(&pool_dir.join(AGENTS_DIR).join(format!("{agent}.json"))).await?);
            }
            pools.push(PoolSnapshot { address, dump, agents });
        }
        Ok(Self { marker, pools })
    }

    /// Overwrite only the chain marker, after a load re-snapshots the chain
    pub async fn write_marker(dir: &Path, marker: &ChainMarker) -> Result<()> {
        write_json(&dir.join(CHAIN_FILE), marker).await
    }
}

fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("snapshot dir {} has no final component", dir.display()),
        )
    })?;
    let mut sibling = name.to_os_string();
    sibling.push(format!(".{suffix}"));
    Ok(dir.with_file_name(sibling))
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        tokio::fs::remove_dir_all(path).await?;
    }
    Ok(())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    tokio::fs::write(path, serde_json::to_vec_pretty(value)?).await?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
