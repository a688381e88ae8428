//! Scheduled retention sweep.
//! Runs at startup and on a cron schedule, outside the command queue.

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::services::facade::ExecutorFacade;

pub struct CleanupService {
    executor: ExecutorFacade,
    config: RetentionConfig,
}

impl CleanupService {
    pub fn new(executor: ExecutorFacade, config: RetentionConfig) -> Self {
        Self { executor, config }
    }

    /// Runs the startup sweep (if enabled) and registers the cron job.
    /// The returned scheduler must be kept alive.
    pub async fn start(&self) -> Result<JobScheduler, Box<dyn std::error::Error + Send + Sync>> {
        if self.config.sweep_on_start {
            Self::sweep(&self.executor).await;
        }

        let scheduler = JobScheduler::new().await?;
        let executor = self.executor.clone();

        let job = Job::new_async(self.config.cleanup_cron.as_str(), move |_uuid, _l| {
            let executor = executor.clone();
            Box::pin(async move {
                Self::sweep(&executor).await;
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!(
            "🔔 [CLEANUP] Retention sweep scheduled ({}), keeping {} days",
            self.config.cleanup_cron, self.config.days
        );
        Ok(scheduler)
    }

    async fn sweep(executor: &ExecutorFacade) {
        match executor.cleanup().await {
            Ok(report) => info!(
                "🧹 [CLEANUP] Sweep done: removed {} of {} files",
                report.removed, report.scanned
            ),
            Err(e) => warn!("⚠️ [CLEANUP] Sweep failed: {}", e),
        }
    }
}
