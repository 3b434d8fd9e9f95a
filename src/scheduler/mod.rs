//! Library scheduler (C10): a cron-driven loop that fires library scans
//! and keeps every enabled library's `ScheduledJob` row alive.
//!
//! This implementation computes next-fire times with the `cron` crate
//! directly in-process rather than registering triggers with an external
//! scheduler runtime, so there is no separate "orphan binding" state to
//! desync - see `DESIGN.md` for the reasoning. The orphan sweep here
//! instead recreates a library's `ScheduledJob` row if one is missing
//! (e.g. a library whose cron schedule was added, or whose row was lost,
//! after the library itself was created).

pub mod orchestrator;

use crate::context::WorkerContext;
use crate::store::library_store::LibraryStore;
use crate::store::scheduled_job_store::ScheduledJobStore;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drive the scheduler loop until shutdown is signalled: fire due scans,
/// then sweep for libraries missing a `ScheduledJob` binding.
pub async fn run(ctx: WorkerContext) {
    let mut shutdown = ctx.shutdown.clone();
    let mut next_orphan_sweep = Utc::now();

    loop {
        if ctx.is_shutting_down() {
            debug!("scheduler shutting down");
            return;
        }

        if let Err(err) = fire_due(&ctx).await {
            warn!(%err, "scheduler failed to fire due libraries");
        }

        if Utc::now() >= next_orphan_sweep {
            match orphan_sweep(&ctx).await {
                Ok(recreated) if recreated > 0 => {
                    info!(recreated, "scheduler recreated orphaned bindings")
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "scheduler orphan sweep failed"),
            }
            let cron_expr = ctx.config.read().await.orphan_sweep.cron_expression.clone();
            next_orphan_sweep =
                next_fire(&cron_expr).unwrap_or_else(|| Utc::now() + chrono::Duration::minutes(5));
        }

        tokio::select! {
            _ = sleep(Duration::from_secs(5)) => {}
            _ = shutdown.changed() => {}
        }
    }
}

async fn fire_due(ctx: &WorkerContext) -> anyhow::Result<()> {
    let db = ctx.db.conn();
    let due = ScheduledJobStore::due(db, Utc::now()).await?;

    for (scheduled, library) in due {
        if library.status != "active" {
            continue;
        }
        let Some(cron_expr) = &library.cron_expression else {
            continue;
        };

        let started = Instant::now();
        let result = orchestrator::fire(ctx, &library).await;
        let duration_ms = started.elapsed().as_millis() as i64;
        let (next, outcome) = match &result {
            Ok(count) => (
                next_fire(cron_expr),
                format!("ok: fired {count} collection scans"),
            ),
            Err(err) => (next_fire(cron_expr), format!("error: {err}")),
        };

        let next_run_at = next.unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));
        ScheduledJobStore::advance(db, scheduled.id, next_run_at, &outcome, duration_ms).await?;

        if let Err(err) = result {
            warn!(library_id = %library.id, %err, "library scan fire failed");
        }
    }

    Ok(())
}

/// Recreate a missing `ScheduledJob` row for every active, cron-enabled
/// library. Returns how many rows were recreated.
async fn orphan_sweep(ctx: &WorkerContext) -> anyhow::Result<usize> {
    let db = ctx.db.conn();
    let libraries = LibraryStore::list(db).await?;
    let mut recreated = 0;

    for library in libraries {
        if library.status != "active" {
            continue;
        }
        let Some(cron_expr) = &library.cron_expression else {
            continue;
        };
        if ScheduledJobStore::find_by_library(db, library.id).await?.is_some() {
            continue;
        }
        let next_run_at = next_fire(cron_expr).unwrap_or_else(Utc::now);
        ScheduledJobStore::create_for_library(db, library.id, next_run_at).await?;
        recreated += 1;
    }

    Ok(recreated)
}

/// Explicitly recreate a library's scheduled-job binding, for operator use.
pub async fn recreate_binding(ctx: &WorkerContext, library_id: Uuid) -> anyhow::Result<()> {
    let db = ctx.db.conn();
    let library = LibraryStore::get(db, library_id).await?;
    let cron_expr = library
        .cron_expression
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("library has no cron expression"))?;

    if ScheduledJobStore::find_by_library(db, library_id).await?.is_some() {
        anyhow::bail!("library already has a scheduled-job binding");
    }

    let next_run_at = next_fire(cron_expr).unwrap_or_else(Utc::now);
    ScheduledJobStore::create_for_library(db, library_id, next_run_at).await?;
    Ok(())
}

fn next_fire(cron_expression: &str) -> Option<DateTime<Utc>> {
    let schedule = cron::Schedule::from_str(cron_expression).ok()?;
    schedule.upcoming(Utc).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::test_context;

    #[test]
    fn next_fire_returns_a_future_timestamp_for_a_valid_expression() {
        let fired = next_fire("0 0 3 * * * *").unwrap();
        assert!(fired > Utc::now());
    }

    #[test]
    fn next_fire_returns_none_for_garbage_input() {
        assert!(next_fire("not a cron expression").is_none());
    }

    #[tokio::test]
    async fn orphan_sweep_recreates_a_missing_binding() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();
        let library = LibraryStore::create(db, "Comics", "/media/comics", Some("0 0 3 * * * *".to_string()))
            .await
            .unwrap();

        assert!(ScheduledJobStore::find_by_library(db, library.id).await.unwrap().is_none());
        let recreated = orphan_sweep(&ctx).await.unwrap();
        assert_eq!(recreated, 1);
        assert!(ScheduledJobStore::find_by_library(db, library.id).await.unwrap().is_some());

        // Running it again is a no-op - the binding already exists.
        let recreated_again = orphan_sweep(&ctx).await.unwrap();
        assert_eq!(recreated_again, 0);
    }

    #[tokio::test]
    async fn orphan_sweep_ignores_libraries_without_a_cron_expression() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();
        LibraryStore::create(db, "Manual", "/media/manual", None).await.unwrap();

        let recreated = orphan_sweep(&ctx).await.unwrap();
        assert_eq!(recreated, 0);
    }

    #[tokio::test]
    async fn recreate_binding_rejects_a_library_that_already_has_one() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();
        let library = LibraryStore::create(db, "Comics", "/media/comics", Some("0 0 3 * * * *".to_string()))
            .await
            .unwrap();
        recreate_binding(&ctx, library.id).await.unwrap();

        let err = recreate_binding(&ctx, library.id).await.unwrap_err();
        assert!(err.to_string().contains("already has"));
    }
}
