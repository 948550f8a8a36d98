use async_trait::async_trait;
use hyperdrive_agents_types::{AssetId, Checkpoint, PoolConfig, PoolInfo, PositionKind, WalletDelta};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use crate::store::{ChainDataStore, PoolDump, StoreError};

// ═══════════════════════════════════════════════════════════════════════════
// SQLITE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════

pub struct SqliteStore {
    pool: SqlitePool,
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

fn kind_from_str(s: &str) -> Result<PositionKind, StoreError> {
    match s {
        "BASE" => Ok(PositionKind::Base),
        "LP" => Ok(PositionKind::Lp),
        "WITHDRAWAL_SHARE" => Ok(PositionKind::WithdrawalShare),
        "LONG" => Ok(PositionKind::Long),
        "SHORT" => Ok(PositionKind::Short),
        other => Err(StoreError::SerializationError(format!("unknown position kind: {}", other))),
    }
}

fn parse_i128(s: &str) -> Result<i128, StoreError> {
    s.parse::<i128>()
        .map_err(|e| StoreError::SerializationError(e.to_string()))
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `db_path`
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        // Every connection would otherwise get its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        for migration in [
            include_str!("../migrations/001_create_pool_config.sql"),
            include_str!("../migrations/002_create_trade_events.sql"),
            include_str!("../migrations/003_create_pool_info.sql"),
            include_str!("../migrations/004_create_checkpoints.sql"),
            include_str!("../migrations/005_create_ingestion_cursor.sql"),
        ] {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// Convert database row to WalletDelta
    fn row_to_delta(row: &SqliteRow) -> Result<WalletDelta, StoreError> {
        let token_id: String = row.get("token_id");
        let token_id = if token_id.is_empty() {
            None
        } else {
            Some(AssetId::from_str(&token_id).map_err(|e| StoreError::SerializationError(e.to_string()))?)
        };
        let vault_share_price = row
            .get::<Option<String>, _>("vault_share_price")
            .map(|s| Decimal::from_str(&s))
            .transpose()
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        Ok(WalletDelta {
            transaction_hash: row.get("transaction_hash"),
            block_number: row.get::<i64, _>("block_number") as u64,
            log_index: row.get::<i64, _>("log_index") as u64,
            wallet_address: row.get("wallet_address"),
            event_type: row.get("event_type"),
            kind: kind_from_str(row.get::<String, _>("kind").as_str())?,
            maturity_time: row.get::<Option<i64>, _>("maturity_time").map(|v| v as u64),
            token_id,
            token_delta: parse_i128(row.get::<String, _>("token_delta").as_str())?,
            base_delta: parse_i128(row.get::<String, _>("base_delta").as_str())?,
            vault_share_price,
        })
    }

    async fn insert_rows(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        rows: &[WalletDelta],
    ) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO trade_events (
                    transaction_hash, block_number, log_index, wallet_address,
                    event_type, kind, maturity_time, token_id,
                    token_delta, base_delta, vault_share_price
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.transaction_hash)
            .bind(row.block_number as i64)
            .bind(row.log_index as i64)
            .bind(row.wallet_address.to_lowercase())
            .bind(&row.event_type)
            .bind(row.kind.as_str())
            .bind(row.maturity_time.map(|v| v as i64))
            .bind(row.token_id.map(|id| id.to_string()).unwrap_or_default())
            .bind(row.token_delta.to_string())
            .bind(row.base_delta.to_string())
            .bind(row.vault_share_price.map(|p| p.to_string()))
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
            inserted += result.rows_affected() as usize;
        }
        Ok(inserted)
    }

    async fn upsert_pool_info(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        info: &PoolInfo,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO pool_info (block_number, timestamp, data) VALUES (?, ?, ?)")
            .bind(info.block_number as i64)
            .bind(info.timestamp as i64)
            .bind(serde_json::to_string(info)?)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn upsert_checkpoint(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO checkpoints (checkpoint_time, data) VALUES (?, ?)")
            .bind(checkpoint.checkpoint_time as i64)
            .bind(serde_json::to_string(checkpoint)?)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn write_cursor(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        block: u64,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO ingestion_cursor (id, block_number) VALUES (1, ?)")
            .bind(block as i64)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl ChainDataStore for SqliteStore {
    async fn add_pool_config(&self, config: &PoolConfig) -> Result<(), StoreError> {
        if let Some(existing) = self.get_pool_config().await? {
            if !existing.hyperdrive_address.eq_ignore_ascii_case(&config.hyperdrive_address) {
                return Err(StoreError::PoolMismatch {
                    expected: existing.hyperdrive_address,
                    got: config.hyperdrive_address.clone(),
                });
            }
        }

        sqlx::query("INSERT OR REPLACE INTO pool_config (id, hyperdrive_address, data) VALUES (1, ?, ?)")
            .bind(&config.hyperdrive_address)
            .bind(serde_json::to_string(config)?)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_pool_config(&self) -> Result<Option<PoolConfig>, StoreError> {
        let row = sqlx::query("SELECT data FROM pool_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(row.get::<String, _>("data").as_str())?)),
            None => Ok(None),
        }
    }

    async fn add_trade_events(&self, rows: &[WalletDelta]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let inserted = Self::insert_rows(&mut tx, rows).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(inserted)
    }

    async fn get_trade_events(
        &self,
        wallet: Option<&str>,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<WalletDelta>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM trade_events
            WHERE block_number >= ?
              AND (? IS NULL OR block_number <= ?)
              AND (? IS NULL OR wallet_address = ?)
            ORDER BY block_number ASC, log_index ASC, id ASC
            "#,
        )
        .bind(from_block as i64)
        .bind(to_block.map(|b| b as i64))
        .bind(to_block.map(|b| b as i64))
        .bind(wallet.map(|w| w.to_lowercase()))
        .bind(wallet.map(|w| w.to_lowercase()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::row_to_delta).collect()
    }

    async fn add_pool_info(&self, info: &PoolInfo) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        Self::upsert_pool_info(&mut tx, info).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_pool_info(&self, from_block: u64, to_block: Option<u64>) -> Result<Vec<PoolInfo>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM pool_info
            WHERE block_number >= ? AND (? IS NULL OR block_number <= ?)
            ORDER BY block_number ASC
            "#,
        )
        .bind(from_block as i64)
        .bind(to_block.map(|b| b as i64))
        .bind(to_block.map(|b| b as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| Ok(serde_json::from_str(row.get::<String, _>("data").as_str())?))
            .collect()
    }

    async fn add_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        Self::upsert_checkpoint(&mut tx, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_checkpoints(&self, from_time: u64, to_time: Option<u64>) -> Result<Vec<Checkpoint>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM checkpoints
            WHERE checkpoint_time >= ? AND (? IS NULL OR checkpoint_time <= ?)
            ORDER BY checkpoint_time ASC
            "#,
        )
        .bind(from_time as i64)
        .bind(to_time.map(|t| t as i64))
        .bind(to_time.map(|t| t as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| Ok(serde_json::from_str(row.get::<String, _>("data").as_str())?))
            .collect()
    }

    async fn ingested_block(&self) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query("SELECT block_number FROM ingestion_cursor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|row| row.get::<i64, _>("block_number") as u64))
    }

    async fn set_ingested_block(&self, block: u64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        Self::write_cursor(&mut tx, block).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn import(&self, dump: &PoolDump, drop_existing: bool) -> Result<(), StoreError> {
        let current = self.ingested_block().await?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if drop_existing {
            for table in ["pool_config", "trade_events", "pool_info", "checkpoints", "ingestion_cursor"] {
                sqlx::query(&format!("DELETE FROM {}", table))
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        if let Some(config) = &dump.pool_config {
            sqlx::query("INSERT OR REPLACE INTO pool_config (id, hyperdrive_address, data) VALUES (1, ?, ?)")
                .bind(&config.hyperdrive_address)
                .bind(serde_json::to_string(config)?)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        Self::insert_rows(&mut tx, &dump.trade_events).await?;
        for info in &dump.pool_info {
            Self::upsert_pool_info(&mut tx, info).await?;
        }
        for checkpoint in &dump.checkpoints {
            Self::upsert_checkpoint(&mut tx, checkpoint).await?;
        }

        let cursor = if drop_existing {
            dump.ingested_block
        } else {
            current.max(dump.ingested_block)
        };
        if let Some(block) = cursor {
            Self::write_cursor(&mut tx, block).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{make_test_config, make_test_info, make_test_row};
    use crate::InMemoryStore;

    #[tokio::test]
    async fn test_sqlite_trade_events_are_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut withdrawal = make_test_row("0x01", 1, 0, "0xAlice", PositionKind::WithdrawalShare);
        withdrawal.base_delta = 0;
        let rows = vec![
            make_test_row("0x01", 1, 0, "0xAlice", PositionKind::Lp),
            withdrawal,
        ];

        assert_eq!(store.add_trade_events(&rows).await.unwrap(), 2);
        assert_eq!(store.add_trade_events(&rows).await.unwrap(), 0);

        let stored = store.get_trade_events(Some("0xalice"), 0, None).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].token_id, Some(AssetId::lp()));
        assert_eq!(stored[0].vault_share_price, Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn test_sqlite_base_rows_deduplicate() {
        let store = SqliteStore::in_memory().await.unwrap();
        let rows = vec![make_test_row("0x01", 1, 0, "0xalice", PositionKind::Base)];

        assert_eq!(store.add_trade_events(&rows).await.unwrap(), 1);
        assert_eq!(store.add_trade_events(&rows).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_ranges() {
        let store = SqliteStore::in_memory().await.unwrap();
        for block in 1..=5 {
            store.add_pool_info(&make_test_info(block)).await.unwrap();
        }
        store
            .add_checkpoint(&Checkpoint {
                checkpoint_time: 3_600,
                vault_share_price: Decimal::ONE,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.get_pool_info(2, Some(4)).await.unwrap().len(), 3);
        assert_eq!(store.get_pool_info(0, None).await.unwrap().len(), 5);
        assert_eq!(store.get_checkpoints(0, Some(3_599)).await.unwrap().len(), 0);
        assert!(store.get_checkpoints(3_600, None).await.unwrap()[0].exists());
    }

    #[tokio::test]
    async fn test_sqlite_matches_memory_dump() {
        let sqlite = SqliteStore::in_memory().await.unwrap();
        let memory = InMemoryStore::new();
        let rows = vec![
            make_test_row("0x01", 1, 0, "0xalice", PositionKind::Long),
            make_test_row("0x02", 2, 1, "0xbob", PositionKind::Short),
        ];
        for store in [&sqlite as &dyn ChainDataStore, &memory as &dyn ChainDataStore] {
            store.add_pool_config(&make_test_config("0xpool")).await.unwrap();
            store.add_trade_events(&rows).await.unwrap();
            store.add_pool_info(&make_test_info(2)).await.unwrap();
            store.set_ingested_block(2).await.unwrap();
        }

        let dump = memory.export().await.unwrap();
        assert_eq!(sqlite.export().await.unwrap(), dump);

        sqlite
            .add_trade_events(&[make_test_row("0x03", 3, 0, "0xalice", PositionKind::Long)])
            .await
            .unwrap();
        sqlite.import(&dump, true).await.unwrap();
        assert_eq!(sqlite.export().await.unwrap(), dump);
    }

    #[tokio::test]
    async fn test_sqlite_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.add_pool_config(&make_test_config("0xpool")).await.unwrap();
            store.set_ingested_block(9).await.unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        assert_eq!(store.ingested_block().await.unwrap(), Some(9));
        assert_eq!(
            store.get_pool_config().await.unwrap().unwrap().hyperdrive_address,
            "0xpool"
        );
    }
}
