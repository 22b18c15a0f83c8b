//! Durable Store (§2.2, §3): the system of record for languages, sessions,
//! and executions. Owns execution identity and terminal truth.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{ExecutionId, LanguageId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "session_status_enum", rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "execution_status_enum", rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Language {
    pub id: LanguageId,
    pub name: String,
    pub runtime: String,
    pub version: String,
    pub file_name: String,
    pub compile_cmd_template: Option<String>,
    pub run_cmd_template: String,
    pub default_time_limit_ms: i32,
    pub default_memory_mb: i32,
    pub template_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: SessionId,
    pub language_id: LanguageId,
    pub source_code: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Execution {
    pub id: ExecutionId,
    pub session_id: SessionId,
    pub status: ExecutionStatus,
    pub time_limit_ms: i32,
    pub memory_limit_mb: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub execution_time_ms: Option<f64>,
    pub exit_code: Option<i32>,
    pub timeout: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Outcome written back to an execution row on terminal completion (§4.4 step 5).
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: f64,
    pub exit_code: Option<i32>,
    pub timeout: bool,
}

#[derive(Clone)]
pub struct DurableStore {
    pool: PgPool,
}

impl DurableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_languages(&self) -> Result<Vec<Language>, sqlx::Error> {
        sqlx::query_as::<_, Language>("SELECT * FROM languages ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_language(&self, id: LanguageId) -> Result<Option<Language>, sqlx::Error> {
        sqlx::query_as::<_, Language>("SELECT * FROM languages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_language_by_runtime(
        &self,
        runtime: &str,
    ) -> Result<Option<Language>, sqlx::Error> {
        sqlx::query_as::<_, Language>("SELECT * FROM languages WHERE runtime = $1")
            .bind(runtime)
            .fetch_optional(&self.pool)
            .await
    }

    /// Upserts one language descriptor keyed by `runtime` (§3 "seeded at install"). Idempotent:
    /// safe to call on every startup so the catalogue's static table and the `languages` row a
    /// session's foreign key points at never drift apart.
    pub async fn upsert_language(
        &self,
        name: &str,
        runtime: &str,
        version: &str,
        file_name: &str,
        compile_cmd_template: Option<&str>,
        run_cmd_template: &str,
        default_time_limit_ms: i32,
        default_memory_mb: i32,
        template_code: &str,
    ) -> Result<Language, sqlx::Error> {
        sqlx::query_as::<_, Language>(
            "INSERT INTO languages
                 (name, runtime, version, file_name, compile_cmd_template, run_cmd_template,
                  default_time_limit_ms, default_memory_mb, template_code)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (runtime) DO UPDATE SET
                 name = EXCLUDED.name,
                 version = EXCLUDED.version,
                 file_name = EXCLUDED.file_name,
                 compile_cmd_template = EXCLUDED.compile_cmd_template,
                 run_cmd_template = EXCLUDED.run_cmd_template,
                 default_time_limit_ms = EXCLUDED.default_time_limit_ms,
                 default_memory_mb = EXCLUDED.default_memory_mb,
                 template_code = EXCLUDED.template_code
             RETURNING *",
        )
        .bind(name)
        .bind(runtime)
        .bind(version)
        .bind(file_name)
        .bind(compile_cmd_template)
        .bind(run_cmd_template)
        .bind(default_time_limit_ms)
        .bind(default_memory_mb)
        .bind(template_code)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn create_session(
        &self,
        language_id: LanguageId,
        source_code: &str,
    ) -> Result<Session, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (id, language_id, source_code, status)
             VALUES (gen_random_uuid(), $1, $2, 'ACTIVE')
             RETURNING *",
        )
        .bind(language_id)
        .bind(source_code)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_session(&self, id: SessionId) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn update_session_source(
        &self,
        id: SessionId,
        source_code: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "UPDATE sessions SET source_code = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(source_code)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn close_session(&self, id: SessionId) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as::<_, Session>(
            "UPDATE sessions SET status = 'INACTIVE' WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Inserts a fresh QUEUED execution row (§4.2 step 6). The id is generated by the
    /// caller (admission) since it doubles as the job id.
    pub async fn create_execution(
        &self,
        id: ExecutionId,
        session_id: SessionId,
        time_limit_ms: i32,
        memory_limit_mb: i32,
    ) -> Result<Execution, sqlx::Error> {
        sqlx::query_as::<_, Execution>(
            "INSERT INTO executions (id, session_id, status, time_limit_ms, memory_limit_mb)
             VALUES ($1, $2, 'QUEUED', $3, $4)
             RETURNING *",
        )
        .bind(id)
        .bind(session_id)
        .bind(time_limit_ms)
        .bind(memory_limit_mb)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn get_execution(&self, id: ExecutionId) -> Result<Option<Execution>, sqlx::Error> {
        sqlx::query_as::<_, Execution>("SELECT * FROM executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_executions_for_session(
        &self,
        session_id: SessionId,
        limit: i64,
    ) -> Result<Vec<Execution>, sqlx::Error> {
        sqlx::query_as::<_, Execution>(
            "SELECT * FROM executions WHERE session_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Transitions QUEUED -> RUNNING (§4.4 step 2, §9 "single real race"). The UPDATE
    /// only matches rows still in QUEUED, so two workers racing on the same job id
    /// can't both "win" a RUNNING transition.
    pub async fn mark_running(&self, id: ExecutionId) -> Result<Option<Execution>, sqlx::Error> {
        sqlx::query_as::<_, Execution>(
            "UPDATE executions
             SET status = 'RUNNING', started_at = now()
             WHERE id = $1 AND status = 'QUEUED'
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Writes a terminal row from a [`ExecutionResult`] (§4.4 step 5). Idempotent:
    /// retried writes for the same execution id overwrite rather than duplicate, which
    /// is what makes at-least-once worker delivery safe (§4.3).
    pub async fn apply_result(
        &self,
        id: ExecutionId,
        result: &ExecutionResult,
    ) -> Result<Option<Execution>, sqlx::Error> {
        sqlx::query_as::<_, Execution>(
            "UPDATE executions
             SET status = $2, stdout = $3, stderr = $4, execution_time_ms = $5,
                 exit_code = $6, timeout = $7, finished_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(result.status)
        .bind(&result.stdout)
        .bind(&result.stderr)
        .bind(result.execution_time_ms)
        .bind(result.exit_code)
        .bind(result.timeout)
        .fetch_optional(&self.pool)
        .await
    }

    /// Marks a QUEUED or RUNNING row terminal-FAILED directly, used by the admission
    /// compensation path (§4.2) and the deterministic/transient worker failure paths (§4.4).
    pub async fn mark_failed(
        &self,
        id: ExecutionId,
        stderr: &str,
    ) -> Result<Option<Execution>, sqlx::Error> {
        sqlx::query_as::<_, Execution>(
            "UPDATE executions
             SET status = 'FAILED', stderr = $2, execution_time_ms = COALESCE(execution_time_ms, 0),
                 finished_at = now()
             WHERE id = $1 AND status IN ('QUEUED', 'RUNNING')
             RETURNING *",
        )
        .bind(id)
        .bind(stderr)
        .fetch_optional(&self.pool)
        .await
    }

    /// Abuse-check support query (§4.1 `checkAbuse`): counts recent executions and
    /// recent failures in this session within the trailing window.
    pub async fn recent_execution_counts(
        &self,
        session_id: SessionId,
        window_seconds: i64,
    ) -> Result<(i64, i64), sqlx::Error> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT
                 COUNT(*) AS total,
                 COUNT(*) FILTER (WHERE status = 'FAILED') AS failed
             FROM executions
             WHERE session_id = $1 AND created_at > now() - ($2 || ' seconds')::interval",
        )
        .bind(session_id)
        .bind(window_seconds.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Repair sweep support query (§4.4, §9.4): executions stuck in RUNNING past the
    /// bound, regardless of whether their job row still exists in the queue.
    pub async fn find_stuck_running(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Execution>, sqlx::Error> {
        sqlx::query_as::<_, Execution>(
            "SELECT * FROM executions WHERE status = 'RUNNING' AND started_at < $1",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
    }
}
