use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::CoreError;
use crate::kernel::Kernel;
use crate::server::routes::sessions::execution_status_label;
use crate::store::durable::ExecutionStatus;
use crate::store::ExecutionId;

#[derive(Serialize)]
pub struct ExecutionResponse {
    pub execution_id: ExecutionId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
}

/// `GET /executions/:id` (§6): terminal rows also carry stdout/stderr/timing.
pub async fn get_execution(
    State(kernel): State<Kernel>,
    Path(id): Path<ExecutionId>,
) -> Result<Json<ExecutionResponse>, CoreError> {
    let execution = kernel
        .durable
        .get_execution(id)
        .await?
        .ok_or(CoreError::ExecutionNotFound)?;

    let is_terminal = matches!(
        execution.status,
        ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Timeout
    );

    Ok(Json(ExecutionResponse {
        execution_id: execution.id,
        status: execution_status_label(execution.status),
        stdout: if is_terminal { execution.stdout } else { None },
        stderr: if is_terminal { execution.stderr } else { None },
        execution_time_ms: if is_terminal {
            execution.execution_time_ms
        } else {
            None
        },
    }))
}
