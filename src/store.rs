//! Durable persistence of chains and token usage.
//!
//! Every chain id maps to one row holding the JSON-serialized chain blob and
//! cumulative token counters. The performer persists after every mutation:
//! the appended ai tool-call message, each appended tool response, a
//! post-summarization compaction, and the final assistant message. Writes
//! overwrite the whole blob, so repeating an identical write is harmless.
//!
//! Persistence failures are fatal for the loop; chain durability is not
//! negotiable. The last successfully persisted chain is the durable state a
//! run leaves behind.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::chain::{Chain, Message};
use crate::error::{PerformError, Result};
use crate::usage::Usage;

/// Storage backing for chains. Implementations serialize writes per chain
/// id; the caller guarantees a single writer per chain.
#[async_trait]
pub trait ChainRepository: Send + Sync {
    /// Overwrites the stored chain blob for the given id.
    async fn update_chain(&self, chain_id: i64, blob: &[u8]) -> Result<()>;

    /// Adds per-call token deltas to the stored cumulative counters.
    async fn update_usage(&self, chain_id: i64, input_tokens: i64, output_tokens: i64)
        -> Result<()>;
}

/// Serialization front of the repository used by the performer.
#[derive(Clone)]
pub struct ChainStore {
    repo: Arc<dyn ChainRepository>,
}

impl ChainStore {
    pub fn new(repo: Arc<dyn ChainRepository>) -> Self {
        Self { repo }
    }

    /// Serializes the full chain and overwrites the stored blob.
    pub async fn persist_chain(&self, chain_id: i64, chain: &[Message]) -> Result<()> {
        let blob = serde_json::to_vec(chain)?;
        self.repo.update_chain(chain_id, &blob).await
    }

    /// Records token usage of one model call.
    pub async fn persist_usage(&self, chain_id: i64, usage: Usage) -> Result<()> {
        self.repo
            .update_usage(chain_id, usage.input_tokens, usage.output_tokens)
            .await
    }
}

/// SQLite-backed chain repository.
pub struct SqliteChainRepository {
    pool: Pool<Sqlite>,
}

impl SqliteChainRepository {
    /// Opens (creating if missing) the database at the given path.
    pub async fn new(db_path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&db_url).await?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database, useful for tests.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS msg_chains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chain TEXT NOT NULL,
                usage_in INTEGER NOT NULL DEFAULT 0,
                usage_out INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Creates a new chain row and returns its id. Called by the upstream
    /// service before a performer takes ownership of the chain.
    pub async fn create_chain(&self, chain: &[Message]) -> Result<i64> {
        let blob = serde_json::to_string(chain)?;
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO msg_chains (chain, created_at, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&blob)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Loads the stored chain for a row.
    pub async fn fetch_chain(&self, chain_id: i64) -> Result<Chain> {
        let row = sqlx::query("SELECT chain FROM msg_chains WHERE id = ?")
            .bind(chain_id)
            .fetch_one(&self.pool)
            .await?;
        let blob: String = row.get("chain");
        Ok(serde_json::from_str(&blob)?)
    }

    /// Loads the cumulative usage counters for a row.
    pub async fn fetch_usage(&self, chain_id: i64) -> Result<Usage> {
        let row = sqlx::query("SELECT usage_in, usage_out FROM msg_chains WHERE id = ?")
            .bind(chain_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Usage::new(row.get("usage_in"), row.get("usage_out")))
    }
}

#[async_trait]
impl ChainRepository for SqliteChainRepository {
    async fn update_chain(&self, chain_id: i64, blob: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(blob)
            .map_err(|err| PerformError::Repository(format!("chain blob is not utf-8: {err}")))?;
        let result = sqlx::query("UPDATE msg_chains SET chain = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(Utc::now().to_rfc3339())
            .bind(chain_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PerformError::Repository(format!(
                "chain {chain_id} not found"
            )));
        }
        Ok(())
    }

    async fn update_usage(
        &self,
        chain_id: i64,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE msg_chains
            SET usage_in = usage_in + ?, usage_out = usage_out + ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(Utc::now().to_rfc3339())
        .bind(chain_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PerformError::Repository(format!(
                "chain {chain_id} not found"
            )));
        }
        Ok(())
    }
}
