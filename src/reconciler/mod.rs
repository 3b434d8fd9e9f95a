//! Job reconciler (C9): a background safety net that re-syncs a stalled
//! job's stage counters against ground truth and gives up on jobs that
//! have stopped making progress entirely.
//!
//! Runs on a fixed interval. No teacher file has an equivalent background
//! auditor; this follows the same "loop + tracing progress + graceful
//! shutdown via a `watch::Receiver<bool>`" idiom every other long-running
//! task in this crate uses.

use crate::context::WorkerContext;
use crate::store::background_job_store::BackgroundJobStore;
use crate::store::file_processing_job_state_store::FileProcessingJobStateStore;
use chrono::Utc;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drive the reconciler loop until shutdown is signalled.
pub async fn run(ctx: WorkerContext) {
    let mut shutdown = ctx.shutdown.clone();
    let mut last_seen: HashMap<Uuid, u64> = HashMap::new();

    loop {
        if ctx.is_shutting_down() {
            debug!("reconciler shutting down");
            return;
        }

        let (interval, stale_seconds, fatal_stale_seconds) = {
            let config = ctx.config.read().await;
            (
                config.reconciler.interval_seconds,
                config.reconciler.stale_job_seconds,
                config.reconciler.fatal_stale_seconds,
            )
        };

        if let Err(err) = reap_expired_leases(&ctx).await {
            warn!(%err, "reconciler failed to reap expired leases");
        }

        if let Err(err) = sweep(&ctx, &mut last_seen, stale_seconds, fatal_stale_seconds).await {
            warn!(%err, "reconciler sweep failed");
        }

        tokio::select! {
            _ = sleep(Duration::from_secs(interval)) => {}
            _ = shutdown.changed() => {}
        }
    }
}

async fn reap_expired_leases(ctx: &WorkerContext) -> anyhow::Result<()> {
    let reaped = ctx.broker.reap_expired_leases().await?;
    if reaped > 0 {
        info!(reaped, "reconciler returned expired leases to ready");
    }
    Ok(())
}

/// One reconciliation pass: find stale non-terminal jobs, correct their
/// stage counters against ground truth, complete or fail them as needed.
///
/// Idempotent - running it twice back to back with unchanged ground truth
/// is a no-op, since every correction is a direct `set_stage_counts` write
/// rather than an incremental delta.
async fn sweep(
    ctx: &WorkerContext,
    last_seen: &mut HashMap<Uuid, u64>,
    stale_seconds: i64,
    fatal_stale_seconds: i64,
) -> anyhow::Result<()> {
    let db = ctx.db.conn();
    let cutoff = Utc::now() - chrono::Duration::seconds(stale_seconds);
    let fatal_cutoff = Utc::now() - chrono::Duration::seconds(fatal_stale_seconds);

    let stale_jobs = BackgroundJobStore::find_stale(db, cutoff).await?;
    for job in stale_jobs {
        let states = FileProcessingJobStateStore::list_by_collection(db, job.collection_id).await?;

        let ground_truth_images: u64 = states
            .iter()
            .map(|s| {
                rmp_serde::from_slice::<Vec<crate::store::entities::file_processing_job_state::SourceImage>>(
                    &s.images,
                )
                .map(|v| v.len() as u64)
                .unwrap_or(0)
            })
            .sum();
        let ground_truth_thumbnails = states
            .iter()
            .filter(|s| {
                rmp_serde::from_slice::<Vec<crate::store::entities::file_processing_job_state::Derivative>>(
                    &s.thumbnails,
                )
                .map(|v| !v.is_empty())
                .unwrap_or(false)
            })
            .count() as u64;
        let ground_truth_cache_images = states
            .iter()
            .filter(|s| {
                rmp_serde::from_slice::<Vec<crate::store::entities::file_processing_job_state::Derivative>>(
                    &s.cache_images,
                )
                .map(|v| !v.is_empty())
                .unwrap_or(false)
            })
            .count() as u64;

        let stages = BackgroundJobStore::stages(&job)?;

        for (stage, ground_truth) in [
            ("thumbnail", ground_truth_thumbnails),
            ("cache_image", ground_truth_cache_images),
        ] {
            let Some(state) = stages.get(stage) else {
                continue;
            };
            if state.completed != ground_truth && ground_truth >= state.completed {
                warn!(
                    job_id = %job.id,
                    stage,
                    recorded = state.completed,
                    ground_truth,
                    "reconciler correcting stage drift"
                );
                let total = state.total.max(ground_truth);
                BackgroundJobStore::set_stage_counts(db, job.id, stage, ground_truth, total)
                    .await?;
                if ground_truth >= total && total > 0 {
                    BackgroundJobStore::complete_stage(db, job.id, stage).await?;
                }
            }
        }

        BackgroundJobStore::maybe_complete_job(db, job.id).await?;

        let total_progress = ground_truth_images + ground_truth_thumbnails + ground_truth_cache_images;
        let made_progress = last_seen
            .get(&job.id)
            .map(|previous| total_progress > *previous)
            .unwrap_or(true);
        last_seen.insert(job.id, total_progress);

        if !made_progress && job.updated_at < fatal_cutoff {
            warn!(job_id = %job.id, "reconciler marking job failed - no progress past fatal staleness");
            BackgroundJobStore::fail_job(db, job.id, "No progress — presumed abandoned").await?;
            last_seen.remove(&job.id);
        }
    }

    Ok(())
}
