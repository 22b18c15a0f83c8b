//! Execution Worker Pool (§2.7, §4.4): bounded-concurrency workers that
//! reserve jobs, invoke the Runner, and persist results.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::admission::ExecutionJobPayload;
use crate::kernel::Kernel;
use crate::queue::ReservedJob;
use crate::runner;
use crate::service::Service;
use crate::store::ExecutionId;

pub struct WorkerPool {
    kernel: Kernel,
    worker_id: String,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(kernel: Kernel, concurrency: usize) -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            kernel,
            concurrency,
        }
    }
}

#[async_trait]
impl Service for WorkerPool {
    fn name(&self) -> &str {
        "worker_pool"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();
        let poll_interval = self.kernel.config.worker_poll_interval;

        info!(worker_id = %self.worker_id, concurrency = self.concurrency, "worker pool starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => continue,
                        _ = shutdown.cancelled() => break,
                        Some(_) = in_flight.join_next() => continue,
                    }
                }
            };

            let reserved = tokio::select! {
                res = self.kernel.queue.reserve(&self.worker_id) => res,
                _ = shutdown.cancelled() => {
                    drop(permit);
                    break;
                }
            };

            match reserved {
                Ok(Some(job)) => {
                    let kernel = self.kernel.clone();
                    let worker_id = self.worker_id.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        process_job(&kernel, &worker_id, job).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Err(err) => {
                    drop(permit);
                    error!(worker_id = %self.worker_id, error = %err, "failed to reserve job");
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        info!(worker_id = %self.worker_id, "worker pool draining in-flight jobs");
        let grace = self.kernel.config.shutdown_grace_period;
        let drain = async {
            while in_flight.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(worker_id = %self.worker_id, "shutdown grace period elapsed with jobs still in flight");
        }

        Ok(())
    }
}

/// Handles one reserved job end to end (§4.4 steps 1-7), classifying failures
/// into the three buckets described there.
async fn process_job(kernel: &Kernel, worker_id: &str, job: ReservedJob) {
    let payload: ExecutionJobPayload = match serde_json::from_value(job.payload.clone()) {
        Ok(payload) => payload,
        Err(err) => {
            // A malformed payload can never succeed on retry: deterministic failure.
            error!(job_id = %job.id, error = %err, "malformed job payload, acking without retry");
            if let Err(ack_err) = kernel.queue.ack(job.id).await {
                error!(job_id = %job.id, error = %ack_err, "failed to ack malformed job");
            }
            return;
        }
    };

    let execution_id = payload.execution_id;

    // Step 2: QUEUED -> RUNNING, conditional on the row existing and still QUEUED.
    match kernel.durable.mark_running(execution_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            // Row missing (admission bug) or already past QUEUED (duplicate delivery
            // racing another worker) - either way this worker has nothing to do.
            info!(execution_id = %execution_id, "execution row missing or already running, acking");
            let _ = kernel.queue.ack(job.id).await;
            return;
        }
        Err(err) => {
            // Transient infrastructure failure: let the queue retry with backoff.
            warn!(execution_id = %execution_id, error = %err, "failed to mark execution RUNNING, nacking for retry");
            let _ = kernel.queue.nack(job.id, &err.to_string()).await;
            return;
        }
    }

    let _ = kernel
        .ephemeral
        .append_lifecycle_event(execution_id, "RUNNING", serde_json::json!({ "worker_id": worker_id }))
        .await;

    // Step 3: load session + language.
    let session = match kernel.durable.get_session(payload.session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            fail_deterministically(kernel, &job, execution_id, "session gone").await;
            return;
        }
        Err(err) => {
            warn!(execution_id = %execution_id, error = %err, "failed to load session, nacking for retry");
            let _ = kernel.queue.nack(job.id, &err.to_string()).await;
            return;
        }
    };

    let language = match kernel.durable.get_language(session.language_id).await {
        Ok(Some(language)) => language,
        Ok(None) => {
            fail_deterministically(kernel, &job, execution_id, "language gone").await;
            return;
        }
        Err(err) => {
            warn!(execution_id = %execution_id, error = %err, "failed to load language, nacking for retry");
            let _ = kernel.queue.nack(job.id, &err.to_string()).await;
            return;
        }
    };

    let descriptor = kernel.catalogue.get(&language.runtime);

    // Step 4: invoke the Runner. A code-level outcome (non-zero exit, timeout,
    // compile error) is NOT an infrastructure error - it's a normal RunnerOutcome.
    let outcome = runner::run_by_runtime(
        descriptor,
        &language.runtime,
        &session.source_code,
        payload.time_limit_ms,
        payload.memory_limit_mb,
    )
    .await;

    let terminal_status = outcome.status;
    let result = outcome.into_execution_result();

    // Step 5: apply the result in a single write.
    match kernel.durable.apply_result(execution_id, &result).await {
        Ok(_) => {}
        Err(err) => {
            // Transient: the queue's own retry (and ultimately the repair sweep)
            // cover the case where even the final write keeps failing (§4.4).
            warn!(execution_id = %execution_id, error = %err, "failed to write execution result, nacking for retry");
            let _ = kernel.queue.nack(job.id, &err.to_string()).await;
            return;
        }
    }

    // Step 6: terminal lifecycle event.
    let _ = kernel
        .ephemeral
        .append_lifecycle_event(
            execution_id,
            &format!("{terminal_status:?}").to_uppercase(),
            serde_json::json!({ "worker_id": worker_id }),
        )
        .await;

    // Step 7: ack. Code-level outcomes never retry.
    if let Err(err) = kernel.queue.ack(job.id).await {
        error!(execution_id = %execution_id, error = %err, "failed to ack completed job");
    }
}

/// Deterministic failure (§4.4 step 3): terminal FAILED row, ack, no retry.
async fn fail_deterministically(kernel: &Kernel, job: &ReservedJob, execution_id: ExecutionId, reason: &str) {
    warn!(execution_id = %execution_id, reason, "deterministic failure, writing terminal FAILED row");
    if let Err(err) = kernel.durable.mark_failed(execution_id, reason).await {
        error!(execution_id = %execution_id, error = %err, "failed to write deterministic FAILED row");
    }
    if let Err(err) = kernel.queue.ack(job.id).await {
        error!(execution_id = %execution_id, error = %err, "failed to ack deterministically-failed job");
    }
}
