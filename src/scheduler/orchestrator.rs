//! Library scan orchestrator (C11): on a library's cron trigger, walks its
//! root one level deep, upserts a collection per subdirectory, and kicks
//! off a collection-scan job for each.

use crate::broker::QueuePayload;
use crate::context::WorkerContext;
use crate::store::background_job_store::BackgroundJobStore;
use crate::store::collection_store::CollectionStore;
use crate::store::entities::library;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

const STAGES: &[&str] = &["discovery", "thumbnail", "cache_image"];

/// Walk `library.root_path` one level deep and fire a collection-scan job
/// for every immediate subdirectory.
pub async fn fire(ctx: &WorkerContext, library: &library::Model) -> anyhow::Result<usize> {
    let db = ctx.db.conn();
    let root = PathBuf::from(&library.root_path);

    let subdirs = tokio::task::spawn_blocking(move || list_subdirectories(&root)).await??;

    let mut fired = 0;
    for path in subdirs {
        let relative = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if relative.is_empty() {
            continue;
        }

        let collection = match CollectionStore::find_by_library_and_path(db, library.id, &relative)
            .await?
        {
            Some(existing) => existing,
            None => CollectionStore::create(db, library.id, &relative, "directory").await?,
        };

        if let Err(err) = enqueue_scan(ctx, library.id, collection.id).await {
            warn!(library_id = %library.id, collection_id = %collection.id, %err, "failed to enqueue collection scan");
            continue;
        }
        fired += 1;
    }

    info!(library_id = %library.id, collections = fired, "library scan fired");
    Ok(fired)
}

async fn enqueue_scan(
    ctx: &WorkerContext,
    library_id: Uuid,
    collection_id: Uuid,
) -> anyhow::Result<()> {
    let db = ctx.db.conn();
    let job = BackgroundJobStore::create_job(db, collection_id, "collection_scan", STAGES).await?;

    ctx.events.emit(crate::infrastructure::events::Event::LibraryScanScheduled {
        library_id,
        collection_id,
    });

    ctx.broker
        .enqueue(QueuePayload::CollectionScan {
            collection_id,
            job_id: job.id,
        })
        .await?;
    Ok(())
}

fn list_subdirectories(root: &std::path::Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)?.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::test_context;
    use crate::store::library_store::LibraryStore;

    #[tokio::test]
    async fn fire_enqueues_one_collection_scan_per_subdirectory() {
        let (_tmp, ctx) = test_context().await;
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();
        std::fs::create_dir(root.path().join("vol-2")).unwrap();
        std::fs::write(root.path().join("not-a-dir.txt"), b"ignored").unwrap();

        let library = LibraryStore::create(
            ctx.db.conn(),
            "Comics",
            &root.path().to_string_lossy(),
            None,
        )
        .await
        .unwrap();

        let fired = fire(&ctx, &library).await.unwrap();
        assert_eq!(fired, 2);

        let collections = CollectionStore::find_by_library_and_path(ctx.db.conn(), library.id, "vol-1")
            .await
            .unwrap();
        assert!(collections.is_some());
    }

    #[tokio::test]
    async fn fire_is_idempotent_on_repeat_calls() {
        let (_tmp, ctx) = test_context().await;
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();

        let library = LibraryStore::create(
            ctx.db.conn(),
            "Comics",
            &root.path().to_string_lossy(),
            None,
        )
        .await
        .unwrap();

        fire(&ctx, &library).await.unwrap();
        fire(&ctx, &library).await.unwrap();

        // The same collection is reused rather than duplicated.
        let collections = CollectionStore::list_by_library(ctx.db.conn(), library.id)
            .await
            .unwrap();
        assert_eq!(collections.len(), 1);
    }
}
