//! Execution Admission (§2.6, §4.2): the atomic "create execution row + enqueue
//! job" operation exposed to the API.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::CoreError;
use crate::queue::{EnqueueOptions, PostgresJobQueue, QueueError};
use crate::safety::{check_abuse, scan_loop_patterns, validate_params};
use crate::store::durable::{DurableStore, SessionStatus};
use crate::store::ephemeral::EphemeralStore;
use crate::store::{ExecutionId, SessionId};

/// Wire payload for an execution job (§4.2 step 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionJobPayload {
    pub execution_id: ExecutionId,
    pub session_id: SessionId,
    pub time_limit_ms: i32,
    pub memory_limit_mb: i32,
}

pub struct SubmitResult {
    pub execution_id: ExecutionId,
}

/// Runs the full admission pipeline (§4.2). Ordering matters: cheaper,
/// better-classified checks run first.
pub async fn submit(
    durable: &DurableStore,
    ephemeral: &EphemeralStore,
    queue: &PostgresJobQueue,
    session_id: SessionId,
    time_limit_ms: i32,
    memory_limit_mb: i32,
) -> Result<SubmitResult, CoreError> {
    // 1. validateParams
    let violations = validate_params(time_limit_ms, memory_limit_mb);
    if !violations.is_empty() {
        let message = violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CoreError::InvalidParameter(message));
    }

    // 2. checkAbuse
    let abuse = check_abuse(durable, session_id).await;
    if !abuse.allowed {
        return Err(CoreError::RateLimited {
            retry_after_ms: abuse.retry_after_seconds * 1000,
        });
    }

    // 3. Fetch session; validate it exists and is ACTIVE.
    let session = durable
        .get_session(session_id)
        .await
        .map_err(anyhow::Error::from)?
        .ok_or(CoreError::SessionNotFound)?;
    if session.status != SessionStatus::Active {
        return Err(CoreError::SessionClosed);
    }

    let language = durable
        .get_language(session.language_id)
        .await
        .map_err(anyhow::Error::from)?
        .ok_or_else(|| CoreError::LanguageNotFound(session.language_id.to_string()))?;

    // 4. scanLoopPatterns (log only, never blocking — §4.1).
    let scan = scan_loop_patterns(&session.source_code, &language.runtime);
    if scan.detected {
        tracing::warn!(
            session_id = %session_id,
            pattern = ?scan.pattern_description,
            "loop pattern detected, admitting anyway (advisory only)"
        );
    }

    // 5. Generate fresh execution id.
    let execution_id = ExecutionId::new();

    // 6. Insert execution row; must succeed before enqueue.
    durable
        .create_execution(execution_id, session_id, time_limit_ms, memory_limit_mb)
        .await
        .map_err(anyhow::Error::from)?;

    // 7. Append QUEUED lifecycle event.
    if let Err(err) = ephemeral
        .append_lifecycle_event(
            execution_id,
            "QUEUED",
            serde_json::json!({
                "time_limit_ms": time_limit_ms,
                "memory_limit_mb": memory_limit_mb,
                "session_id": session_id,
            }),
        )
        .await
    {
        // Lifecycle events are debugging-only (§3); don't fail admission over them,
        // but make the gap visible.
        tracing::warn!(error = %err, execution_id = %execution_id, "failed to append QUEUED lifecycle event");
    }

    // 8. Enqueue job with jobId = executionId.
    let payload = ExecutionJobPayload {
        execution_id,
        session_id,
        time_limit_ms,
        memory_limit_mb,
    };

    match queue
        .enqueue(
            execution_id.into_uuid(),
            serde_json::to_value(&payload).map_err(|e| CoreError::Internal(e.into()))?,
            EnqueueOptions::default(),
        )
        .await
    {
        Ok(()) => {
            info!(execution_id = %execution_id, session_id = %session_id, "execution admitted");
            Ok(SubmitResult { execution_id })
        }
        Err(QueueError::DuplicateJob(_)) => {
            // The job id equals the execution id (§4.2): a duplicate submit for an
            // id we just minted can't happen in practice, but treat it as a no-op
            // rather than an error, matching the queue's own dedup contract (§4.3).
            Ok(SubmitResult { execution_id })
        }
        Err(QueueError::Db(err)) => {
            // Compensate: the row exists but has no job behind it. Mark FAILED so it
            // doesn't linger as a "bug surfaced by the repair sweep" (§4.2).
            error!(execution_id = %execution_id, error = %err, "enqueue failed after execution row insert, compensating");
            if let Err(compensation_err) = durable
                .mark_failed(execution_id, &format!("enqueue failed: {err}"))
                .await
            {
                error!(execution_id = %execution_id, error = %compensation_err, "compensating FAILED write also failed");
            }
            Err(CoreError::Internal(anyhow::Error::from(err)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_payload_roundtrips_through_json() {
        let payload = ExecutionJobPayload {
            execution_id: ExecutionId::new(),
            session_id: SessionId::new(),
            time_limit_ms: 5000,
            memory_limit_mb: 256,
        };
        let json = serde_json::to_value(&payload).unwrap();
        let parsed: ExecutionJobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.execution_id, payload.execution_id);
        assert_eq!(parsed.time_limit_ms, payload.time_limit_ms);
    }
}
