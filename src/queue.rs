//! Job Queue (§2.4, §4.3): a reliable FIFO queue with bounded retries,
//! exponential backoff, and a visibility timeout, backed by Postgres
//! `FOR UPDATE SKIP LOCKED` claims rather than a separate broker (§6).

use std::time::Duration;

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_BACKOFF_INITIAL_MS: i64 = 2000;
/// Bound on how long a reserved job may go un-acked before another worker may
/// reclaim it (§4.3 "Visibility timeout").
pub const DEFAULT_VISIBILITY_TIMEOUT_MS: i64 = 60_000;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} already enqueued")]
    DuplicateJob(Uuid),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub max_attempts: i32,
    pub backoff_initial_ms: i64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservedJob {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub backoff_initial_ms: i64,
}

/// Computes the exponential backoff delay for the given attempt count (§4.3):
/// `backoffInitialMs * 2^attemptsMade`.
pub fn backoff_delay(backoff_initial_ms: i64, attempts_made: i32) -> Duration {
    let factor: i64 = 1i64 << attempts_made.max(0);
    Duration::from_millis((backoff_initial_ms * factor).max(0) as u64)
}

#[derive(Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    visibility_timeout_ms: i64,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            visibility_timeout_ms: DEFAULT_VISIBILITY_TIMEOUT_MS,
        }
    }

    pub fn with_visibility_timeout_ms(mut self, ms: i64) -> Self {
        self.visibility_timeout_ms = ms;
        self
    }

    /// Enqueues a job keyed by `job_id`, rejecting duplicates (§4.2 "natural
    /// deduplication key", §4.3 "Rejects duplicate jobId").
    pub async fn enqueue(
        &self,
        job_id: Uuid,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<(), QueueError> {
        let result = sqlx::query(
            "INSERT INTO jobs (id, payload, status, max_attempts, backoff_initial_ms)
             VALUES ($1, $2, 'pending', $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(job_id)
        .bind(&payload)
        .bind(options.max_attempts)
        .bind(options.backoff_initial_ms)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::DuplicateJob(job_id));
        }

        Ok(())
    }

    /// Claims one ready job for `worker_id`: either a fresh `pending` row whose
    /// `run_at` has elapsed, or a `running` row whose lease expired (stale-lease
    /// recovery, the visibility timeout in §4.3). `FOR UPDATE SKIP LOCKED` lets
    /// concurrent workers claim distinct jobs without blocking each other.
    pub async fn reserve(&self, worker_id: &str) -> Result<Option<ReservedJob>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<ReservedJob> = sqlx::query_as(
            "SELECT id, payload, attempts_made, max_attempts, backoff_initial_ms
             FROM jobs
             WHERE (status = 'pending' AND run_at <= now())
                OR (status = 'running' AND reserved_until < now())
             ORDER BY run_at ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = claimed else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE jobs
             SET status = 'running', reserved_by = $2, reserved_until = now() + ($3 || ' milliseconds')::interval
             WHERE id = $1",
        )
        .bind(job.id)
        .bind(worker_id)
        .bind(self.visibility_timeout_ms.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    /// Removes a successfully processed job (§4.3 `ack`).
    pub async fn ack(&self, job_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a failed attempt (§4.3 `nack`): reschedule with backoff if attempts
    /// remain, otherwise move to `dead` retention (queryable, not deleted).
    pub async fn nack(&self, job_id: Uuid, err: &str) -> Result<(), sqlx::Error> {
        let job: Option<(i32, i32, i64)> = sqlx::query_as(
            "SELECT attempts_made, max_attempts, backoff_initial_ms FROM jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((attempts_made, max_attempts, backoff_initial_ms)) = job else {
            return Ok(());
        };

        let next_attempts = attempts_made + 1;

        if next_attempts < max_attempts {
            let delay = backoff_delay(backoff_initial_ms, attempts_made);
            sqlx::query(
                "UPDATE jobs
                 SET status = 'pending', attempts_made = $2, last_error = $3,
                     run_at = now() + ($4 || ' milliseconds')::interval,
                     reserved_by = NULL, reserved_until = NULL
                 WHERE id = $1",
            )
            .bind(job_id)
            .bind(next_attempts)
            .bind(err)
            .bind((delay.as_millis() as i64).to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE jobs
                 SET status = 'dead', attempts_made = $2, last_error = $3,
                     reserved_by = NULL, reserved_until = NULL
                 WHERE id = $1",
            )
            .bind(job_id)
            .bind(next_attempts)
            .bind(err)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_matches_required_defaults() {
        assert_eq!(
            backoff_delay(DEFAULT_BACKOFF_INITIAL_MS, 0),
            Duration::from_millis(2000)
        );
        assert_eq!(
            backoff_delay(DEFAULT_BACKOFF_INITIAL_MS, 1),
            Duration::from_millis(4000)
        );
        assert_eq!(
            backoff_delay(DEFAULT_BACKOFF_INITIAL_MS, 2),
            Duration::from_millis(8000)
        );
    }

    #[test]
    fn default_enqueue_options_match_spec() {
        let opts = EnqueueOptions::default();
        assert_eq!(opts.max_attempts, 3);
        assert_eq!(opts.backoff_initial_ms, 2000);
    }
}
