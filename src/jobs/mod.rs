//! Background job scheduling and sweeps

pub mod auto_ingest;
pub mod backfill;

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::db::CatalogStore;
use crate::services::discovery::ReleaseSource;
use crate::services::pipeline::Coordinator;
use crate::services::tmdb::MetadataProvider;

/// Everything the scheduled sweeps need.
pub struct JobContext {
    pub catalog: Arc<dyn CatalogStore>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub discovery: Arc<dyn ReleaseSource>,
    pub coordinator: Arc<Coordinator>,
    /// Delay between auto-ingest starts within one sweep
    pub stagger: Duration,
}

/// Run both sweeps once; each failure is logged and never stops the other.
pub async fn run_sweeps(context: Arc<JobContext>) {
    info!("Running metadata backfill sweep");
    match backfill::refresh_untranslated(context.catalog.as_ref(), context.metadata.as_ref()).await
    {
        Ok(updated) => info!(updated, "Backfill sweep complete"),
        Err(e) => error!("Backfill sweep error: {:#}", e),
    }

    info!("Running auto-ingest sweep");
    match auto_ingest::run(context.clone()).await {
        Ok(started) => info!(started, "Auto-ingest sweep complete"),
        Err(e) => error!("Auto-ingest sweep error: {:#}", e),
    }
}

/// Initialize and start the job scheduler. Both sweeps run on one 12-hour
/// timer; callers also invoke `run_sweeps` once at startup.
pub async fn start_scheduler(context: Arc<JobContext>) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_context = context.clone();
    let sweep_job = Job::new_async("0 0 */12 * * *", move |_uuid, _l| {
        let context = sweep_context.clone();
        Box::pin(async move {
            run_sweeps(context).await;
        })
    })?;
    scheduler.add(sweep_job).await?;

    scheduler.start().await?;
    info!("Job scheduler started");
    Ok(scheduler)
}
