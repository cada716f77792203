//! Download ledger repository
//!
//! The ledger is the dedup boundary: one row per content hash, written the
//! instant a release is accepted and never rolled back. A check-then-insert
//! race between concurrent discovery passes costs at most one duplicate
//! download; `ON CONFLICT DO NOTHING` keeps the second insert harmless.

use anyhow::Result;
use sqlx::PgPool;

pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether this content hash has already been attempted.
    pub async fn is_seen(&self, content_hash: &str) -> Result<bool> {
        let seen: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM download_ledger WHERE content_hash = $1)",
        )
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(seen)
    }

    /// Record an accepted release. Idempotent.
    pub async fn record(&self, content_hash: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO download_ledger (content_hash) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(content_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Link a ledger entry to the episode row it produced.
    pub async fn link(&self, content_hash: &str, episode_id: i64) -> Result<()> {
        sqlx::query("UPDATE download_ledger SET linked_episode_id = $2 WHERE content_hash = $1")
            .bind(content_hash)
            .bind(episode_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
