//! Visibility-timeout repair sweep (§4.4, §9 decision 4): a standalone
//! periodic task, independent of the worker pool, that relabels executions
//! stuck in RUNNING after a worker crash. Uses `tokio-cron-scheduler` the same
//! way the teacher's scheduled-maintenance module does, just with a new job.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::kernel::Kernel;
use crate::service::Service;

pub struct RepairSweep {
    kernel: Kernel,
}

impl RepairSweep {
    pub fn new(kernel: Kernel) -> Self {
        Self { kernel }
    }
}

/// Finds executions stuck in RUNNING past `maxTimeLimit + margin` (§4.4) and
/// relabels them FAILED with `stderr = "worker lost"`.
async fn sweep_once(kernel: &Kernel) {
    let margin = ChronoDuration::from_std(kernel.config.repair_sweep_margin)
        .unwrap_or_else(|_| ChronoDuration::seconds(15));
    // The descriptor table's largest default time limit stands in for
    // "maxTimeLimit" when an individual execution's own limit isn't tracked
    // outside the job payload that may no longer exist by sweep time.
    let max_time_limit = kernel
        .catalogue
        .all()
        .map(|d| d.default_time_limit_ms)
        .max()
        .unwrap_or(60_000);
    let bound = ChronoDuration::milliseconds(max_time_limit as i64) + margin;
    let older_than = chrono::Utc::now() - bound;

    let stuck = match kernel.durable.find_stuck_running(older_than).await {
        Ok(rows) => rows,
        Err(err) => {
            error!(error = %err, "repair sweep failed to query stuck executions");
            return;
        }
    };

    if stuck.is_empty() {
        return;
    }

    info!(count = stuck.len(), "repair sweep found stuck RUNNING executions");

    for execution in stuck {
        match kernel.durable.mark_failed(execution.id, "worker lost").await {
            Ok(Some(_)) => {
                warn!(execution_id = %execution.id, "repair sweep relabeled stuck execution FAILED");
                let _ = kernel
                    .ephemeral
                    .append_lifecycle_event(
                        execution.id,
                        "FAILED",
                        serde_json::json!({ "reason": "worker lost", "source": "repair_sweep" }),
                    )
                    .await;
            }
            Ok(None) => {
                // Already terminal by the time we got to it - fine, nothing to do.
            }
            Err(err) => {
                error!(execution_id = %execution.id, error = %err, "repair sweep failed to write FAILED row");
            }
        }
    }
}

#[async_trait]
impl Service for RepairSweep {
    fn name(&self) -> &str {
        "repair_sweep"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        let interval = self.kernel.config.repair_sweep_interval;
        let kernel = self.kernel.clone();

        let mut scheduler = JobScheduler::new().await?;
        let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let kernel = kernel.clone();
            Box::pin(async move {
                sweep_once(&kernel).await;
            })
        })?;
        scheduler.add(job).await?;
        scheduler.start().await?;

        info!(interval_ms = interval.as_millis() as u64, "repair sweep scheduled");
        shutdown.cancelled().await;
        info!("repair sweep shutting down");
        scheduler.shutdown().await?;

        Ok(())
    }
}
