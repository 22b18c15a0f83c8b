use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::admission;
use crate::error::CoreError;
use crate::kernel::Kernel;
use crate::store::durable::{Execution, ExecutionStatus, SessionStatus};
use crate::store::{ExecutionId, LanguageId, SessionId};

const MAX_SOURCE_BYTES: usize = 1024 * 1024;
const DEFAULT_EXECUTIONS_LIMIT: i64 = 10;

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub language_id: LanguageId,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub session_id: SessionId,
    pub status: &'static str,
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "ACTIVE",
        SessionStatus::Inactive => "INACTIVE",
    }
}

/// `POST /code-sessions` (§6).
pub async fn create_session(
    State(kernel): State<Kernel>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionStatusResponse>), CoreError> {
    let language = kernel
        .durable
        .get_language(body.language_id)
        .await?
        .ok_or_else(|| CoreError::LanguageNotFound(body.language_id.to_string()))?;

    let session = kernel
        .durable
        .create_session(language.id, &language.template_code)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionStatusResponse {
            session_id: session.id,
            status: status_label(session.status),
        }),
    ))
}

#[derive(Serialize)]
pub struct SessionDetailResponse {
    pub session_id: SessionId,
    pub status: &'static str,
    pub source_code: String,
    pub language_id: LanguageId,
    pub language_runtime: String,
}

/// `GET /code-sessions/:id` (§6): joined with language.
pub async fn get_session(
    State(kernel): State<Kernel>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionDetailResponse>, CoreError> {
    let session = kernel
        .durable
        .get_session(id)
        .await?
        .ok_or(CoreError::SessionNotFound)?;
    let language = kernel
        .durable
        .get_language(session.language_id)
        .await?
        .ok_or_else(|| CoreError::LanguageNotFound(session.language_id.to_string()))?;

    Ok(Json(SessionDetailResponse {
        session_id: session.id,
        status: status_label(session.status),
        source_code: session.source_code,
        language_id: language.id,
        language_runtime: language.runtime,
    }))
}

#[derive(Deserialize)]
pub struct UpdateSessionRequest {
    pub source_code: String,
}

/// `PATCH /code-sessions/:id` (§6): 400 on empty or >1MB source.
pub async fn update_session(
    State(kernel): State<Kernel>,
    Path(id): Path<SessionId>,
    Json(body): Json<UpdateSessionRequest>,
) -> Result<Json<SessionStatusResponse>, CoreError> {
    if body.source_code.is_empty() {
        return Err(CoreError::InvalidParameter(
            "source_code must not be empty".to_string(),
        ));
    }
    if body.source_code.len() > MAX_SOURCE_BYTES {
        return Err(CoreError::SourceTooLarge);
    }

    let session = kernel
        .durable
        .update_session_source(id, &body.source_code)
        .await?
        .ok_or(CoreError::SessionNotFound)?;

    Ok(Json(SessionStatusResponse {
        session_id: session.id,
        status: status_label(session.status),
    }))
}

#[derive(Deserialize)]
pub struct RunSessionRequest {
    #[serde(default)]
    pub time_limit_ms: Option<i32>,
    #[serde(default)]
    pub memory_limit_mb: Option<i32>,
}

#[derive(Serialize)]
pub struct RunSessionResponse {
    pub execution_id: ExecutionId,
    pub status: &'static str,
}

/// `POST /code-sessions/:id/run` (§6, §4.2).
pub async fn run_session(
    State(kernel): State<Kernel>,
    Path(id): Path<SessionId>,
    Json(body): Json<RunSessionRequest>,
) -> Result<(StatusCode, Json<RunSessionResponse>), CoreError> {
    let time_limit_ms = body
        .time_limit_ms
        .unwrap_or(kernel.config.default_time_limit_ms);
    let memory_limit_mb = body
        .memory_limit_mb
        .unwrap_or(kernel.config.default_memory_mb);

    let result = admission::submit(
        &kernel.durable,
        &kernel.ephemeral,
        &kernel.queue,
        id,
        time_limit_ms,
        memory_limit_mb,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RunSessionResponse {
            execution_id: result.execution_id,
            status: "QUEUED",
        }),
    ))
}

/// `PATCH /code-sessions/:id/close` (§6).
pub async fn close_session(
    State(kernel): State<Kernel>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionStatusResponse>, CoreError> {
    let session = kernel
        .durable
        .close_session(id)
        .await?
        .ok_or(CoreError::SessionNotFound)?;

    Ok(Json(SessionStatusResponse {
        session_id: session.id,
        status: status_label(session.status),
    }))
}

#[derive(Deserialize)]
pub struct ListExecutionsQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: &'static str,
}

impl From<&Execution> for ExecutionSummary {
    fn from(execution: &Execution) -> Self {
        Self {
            execution_id: execution.id,
            status: execution_status_label(execution.status),
        }
    }
}

pub fn execution_status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Queued => "QUEUED",
        ExecutionStatus::Running => "RUNNING",
        ExecutionStatus::Completed => "COMPLETED",
        ExecutionStatus::Failed => "FAILED",
        ExecutionStatus::Timeout => "TIMEOUT",
    }
}

#[derive(Serialize)]
pub struct ExecutionListResponse {
    pub session_id: SessionId,
    pub executions: Vec<ExecutionSummary>,
}

/// `GET /code-sessions/:id/executions` (§6): default limit 10, newest-first.
pub async fn list_executions(
    State(kernel): State<Kernel>,
    Path(id): Path<SessionId>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<ExecutionListResponse>, CoreError> {
    if kernel.durable.get_session(id).await?.is_none() {
        return Err(CoreError::SessionNotFound);
    }

    let limit = query.limit.unwrap_or(DEFAULT_EXECUTIONS_LIMIT);
    if limit <= 0 {
        return Err(CoreError::InvalidParameter(
            "limit must be positive".to_string(),
        ));
    }

    let executions = kernel.durable.list_executions_for_session(id, limit).await?;
    let executions: Vec<ExecutionSummary> = executions.iter().map(ExecutionSummary::from).collect();

    Ok(Json(ExecutionListResponse {
        session_id: id,
        executions,
    }))
}
