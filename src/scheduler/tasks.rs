use std::sync::Arc;

use crate::dedup::DedupTracker;
use crate::scheduler::Scheduler;

/// Register the periodic clear of processed bot message ids
pub async fn register_dedup_sweep(
    scheduler: &Scheduler,
    cron_expr: &str,
    dedup: Arc<DedupTracker>,
) -> anyhow::Result<()> {
    scheduler
        .add_cron_job(cron_expr, "dedup-sweep", move || {
            let dedup = dedup.clone();
            Box::pin(async move {
                dedup.sweep();
            })
        })
        .await
}
