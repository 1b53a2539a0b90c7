use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::source::FeedPoller;

/// Registers one feed refresh job per cron expression and starts the
/// scheduler.
pub async fn configure_poll_jobs(cron_specs: &[String], poller: Arc<FeedPoller>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    for spec in cron_specs {
        let label = spec.clone();
        let poller = poller.clone();
        let job = Job::new_async(spec.as_str(), move |_id, _l| {
            let poller = poller.clone();
            let cron_label = label.clone();
            Box::pin(async move {
                let refreshed = poller.poll_all().await;
                tracing::debug!(target: "scheduler", cron = %cron_label, refreshed, "poll job finished");
            })
        })
        .with_context(|| format!("invalid poll schedule: {spec}"))?;
        scheduler.add(job).await?;
        tracing::info!(target: "scheduler", cron = %spec, "poll job registered");
    }
    scheduler.start().await?;
    Ok(scheduler)
}
