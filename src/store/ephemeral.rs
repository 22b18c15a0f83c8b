//! Ephemeral Store (§2.3, §3, §6): TTL-bounded append lists, used here for
//! execution lifecycle events. Backed by a Postgres table rather than Redis
//! (§6 "Ephemeral keys") to keep everything on one `PgPool`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use super::ExecutionId;

/// Default TTL for a lifecycle event list: 30 minutes (§3 "Lifecycle event").
pub const LIFECYCLE_EVENT_TTL_SECONDS: i64 = 1800;

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub execution_id: ExecutionId,
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct EphemeralStore {
    pool: PgPool,
}

impl EphemeralStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn lifecycle_key(execution_id: ExecutionId) -> String {
        format!("execution:{execution_id}:events")
    }

    /// Appends one lifecycle event under `execution:<id>:events`, renewing the TTL (§3, §6).
    ///
    /// Lossy by design: callers must not treat ephemeral events as authoritative, only
    /// the durable store's execution row is (§3 "Ownership").
    pub async fn append_lifecycle_event(
        &self,
        execution_id: ExecutionId,
        stage: &str,
        metadata: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        let key = Self::lifecycle_key(execution_id);
        let expires_at = Utc::now() + Duration::seconds(LIFECYCLE_EVENT_TTL_SECONDS);

        sqlx::query(
            "INSERT INTO ephemeral_entries (key, seq, value, expires_at)
             VALUES (
                 $1,
                 COALESCE((SELECT MAX(seq) FROM ephemeral_entries WHERE key = $1), 0) + 1,
                 $2,
                 $3
             )",
        )
        .bind(&key)
        .bind(serde_json::json!({ "stage": stage, "metadata": metadata, "ts": Utc::now() }))
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads the still-live (not expired) lifecycle events for an execution, oldest first.
    ///
    /// Out-of-order across worker crashes is expected (§5); this is for debugging only.
    pub async fn read_lifecycle_events(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<serde_json::Value>, sqlx::Error> {
        let key = Self::lifecycle_key(execution_id);
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT value FROM ephemeral_entries
             WHERE key = $1 AND expires_at > now()
             ORDER BY seq ASC",
        )
        .bind(&key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Deletes all expired entries across every key. Run periodically; never load-bearing
    /// for correctness since reads already filter on `expires_at` (§6).
    pub async fn sweep_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM ephemeral_entries WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
