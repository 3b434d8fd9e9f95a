//! Bulk-add worker (C8): registers a collection for every immediate
//! directory/archive entry under a root path in one shot, rather than
//! requiring a library's cron trigger to discover them one at a time.

use crate::broker::{ClaimedMessage, QueuePayload};
use crate::context::WorkerContext;
use crate::image_processing::mime;
use crate::store::background_job_store::BackgroundJobStore;
use crate::store::collection_store::CollectionStore;
use std::path::{Path, PathBuf};
use tracing::instrument;
use uuid::Uuid;

const STAGE: &str = "bulk_add";

pub async fn run(ctx: WorkerContext, worker_id: String) {
    let concurrency = ctx.config.read().await.workers.bulk_add_concurrency;
    super::run_queue_worker(ctx, "bulk_add", worker_id, concurrency, handle).await
}

#[instrument(skip(ctx), fields(message_id = %message.id))]
async fn handle(ctx: WorkerContext, message: ClaimedMessage) -> Result<(), String> {
    let QueuePayload::BulkAdd {
        root_path,
        library_id,
        prefix,
        overwrite_existing,
        auto_add,
        trigger_scan,
        job_id,
    } = message.payload
    else {
        return Err("bulk add worker received an unexpected message".to_string());
    };

    if BackgroundJobStore::is_terminal(ctx.db.conn(), job_id)
        .await
        .unwrap_or(false)
    {
        tracing::debug!(%job_id, "parent job already terminal, skipping bulk add");
        return Ok(());
    }

    let result = bulk_add(
        &ctx,
        &root_path,
        library_id,
        prefix.as_deref(),
        overwrite_existing,
        auto_add,
        trigger_scan,
        job_id,
    )
    .await;

    match &result {
        Ok(()) => {
            let _ = BackgroundJobStore::maybe_complete_job(ctx.db.conn(), job_id).await;
        }
        Err(error) => {
            let _ =
                BackgroundJobStore::fail_stage(ctx.db.conn(), job_id, STAGE, &error.to_string())
                    .await;
        }
    }

    result.map_err(|e| e.to_string())
}

/// One entry discovered immediately under the bulk-add root: a directory
/// (treated as a comic volume) or a zip/cbz archive (treated as a single
/// archived collection).
struct Entry {
    name: String,
    kind: &'static str,
}

/// The job this worker reports progress against is scoped to the whole
/// bulk-add call rather than one collection, so it carries `Uuid::nil()`
/// as its `collection_id` - the background_jobs FK is not enforced
/// (SQLite `foreign_keys` is left off) and nothing reads that field back
/// for this job type.
#[allow(clippy::too_many_arguments)]
async fn bulk_add(
    ctx: &WorkerContext,
    root_path: &str,
    library_id: Uuid,
    prefix: Option<&str>,
    overwrite_existing: bool,
    auto_add: bool,
    trigger_scan: bool,
    job_id: Uuid,
) -> anyhow::Result<()> {
    let db = ctx.db.conn();
    if let Err(err) = BackgroundJobStore::start_job(db, job_id).await {
        tracing::debug!(%job_id, %err, "job already started, continuing bulk add");
    }

    let root = PathBuf::from(root_path);
    let entries = tokio::task::spawn_blocking(move || list_entries(&root)).await??;
    BackgroundJobStore::start_stage(db, job_id, STAGE, entries.len() as u64).await?;

    if entries.is_empty() {
        BackgroundJobStore::complete_stage(db, job_id, STAGE).await?;
        return Ok(());
    }

    for entry in entries {
        let stored_path = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{}", entry.name),
            _ => entry.name.clone(),
        };

        let outcome = add_one(db, library_id, &stored_path, entry.kind, overwrite_existing, auto_add)
            .await;

        match outcome {
            Ok(Some(collection_id)) => {
                BackgroundJobStore::increment_stage(db, job_id, STAGE, 1, 0).await?;
                if auto_add && trigger_scan {
                    enqueue_scan(ctx, collection_id).await?;
                }
            }
            Ok(None) => {
                // Skipped: already registered and overwrite_existing is false.
                BackgroundJobStore::increment_stage(db, job_id, STAGE, 1, 0).await?;
            }
            Err(err) => {
                tracing::warn!(%library_id, path = %stored_path, %err, "bulk add failed for entry");
                BackgroundJobStore::increment_stage(db, job_id, STAGE, 0, 1).await?;
            }
        }
    }

    BackgroundJobStore::complete_stage(db, job_id, STAGE).await?;
    Ok(())
}

/// Register one entry as a collection, unless it already exists and
/// `overwrite_existing` is false. Returns the collection id that should be
/// (re)scanned, or `None` if the entry was skipped.
async fn add_one(
    db: &sea_orm::DatabaseConnection,
    library_id: Uuid,
    stored_path: &str,
    kind: &str,
    overwrite_existing: bool,
    auto_add: bool,
) -> anyhow::Result<Option<Uuid>> {
    if !auto_add {
        return Ok(None);
    }

    if let Some(existing) =
        CollectionStore::find_by_library_and_path(db, library_id, stored_path).await?
    {
        if !overwrite_existing {
            return Ok(None);
        }
        return Ok(Some(existing.id));
    }

    let collection = CollectionStore::create(db, library_id, stored_path, kind).await?;
    Ok(Some(collection.id))
}

async fn enqueue_scan(ctx: &WorkerContext, collection_id: Uuid) -> anyhow::Result<()> {
    let db = ctx.db.conn();
    let scan_job = BackgroundJobStore::create_job(
        db,
        collection_id,
        "collection_scan",
        &["discovery", "thumbnail", "cache_image"],
    )
    .await?;
    ctx.broker
        .enqueue(QueuePayload::CollectionScan {
            collection_id,
            job_id: scan_job.id,
        })
        .await?;
    Ok(())
}

/// List the immediate directory and archive entries under `root`,
/// classifying each as `"directory"` or `"archive"`.
fn list_entries(root: &Path) -> anyhow::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for dir_entry in std::fs::read_dir(root)?.filter_map(Result::ok) {
        let path = dir_entry.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };

        if path.is_dir() {
            entries.push(Entry { name, kind: "directory" });
        } else if mime::is_archive(&path) {
            entries.push(Entry { name, kind: "archive" });
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::test_context;
    use crate::store::library_store::LibraryStore;

    #[tokio::test]
    async fn bulk_add_registers_a_collection_per_directory_and_archive_entry() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();
        std::fs::create_dir(root.path().join("vol-2")).unwrap();
        std::fs::write(root.path().join("vol-3.cbz"), b"fake-zip").unwrap();
        std::fs::write(root.path().join("notes.txt"), b"ignored").unwrap();

        let library = LibraryStore::create(db, "Comics", "/media/comics", None)
            .await
            .unwrap();
        let job = BackgroundJobStore::create_job(db, Uuid::nil(), "bulk_add", &["bulk_add"])
            .await
            .unwrap();

        bulk_add(
            &ctx,
            &root.path().to_string_lossy(),
            library.id,
            None,
            false,
            true,
            false,
            job.id,
        )
        .await
        .unwrap();

        let collections = CollectionStore::list_by_library(db, library.id).await.unwrap();
        assert_eq!(collections.len(), 3);
        assert!(collections.iter().any(|c| c.path == "vol-1" && c.kind == "directory"));
        assert!(collections.iter().any(|c| c.path == "vol-3.cbz" && c.kind == "archive"));

        let job = BackgroundJobStore::get(db, job.id).await.unwrap();
        let stages = BackgroundJobStore::stages(&job).unwrap();
        assert_eq!(stages["bulk_add"].completed, 3);
        assert_eq!(stages["bulk_add"].status, "completed");
    }

    #[tokio::test]
    async fn bulk_add_applies_a_prefix_to_every_registered_path() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();

        let library = LibraryStore::create(db, "Comics", "/media/comics", None)
            .await
            .unwrap();
        let job = BackgroundJobStore::create_job(db, Uuid::nil(), "bulk_add", &["bulk_add"])
            .await
            .unwrap();

        bulk_add(
            &ctx,
            &root.path().to_string_lossy(),
            library.id,
            Some("imported"),
            false,
            true,
            false,
            job.id,
        )
        .await
        .unwrap();

        let collections = CollectionStore::list_by_library(db, library.id).await.unwrap();
        assert_eq!(collections[0].path, "imported/vol-1");
    }

    #[tokio::test]
    async fn bulk_add_skips_existing_collections_unless_overwrite_is_set() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();

        let library = LibraryStore::create(db, "Comics", "/media/comics", None)
            .await
            .unwrap();
        CollectionStore::create(db, library.id, "vol-1", "directory")
            .await
            .unwrap();

        let job = BackgroundJobStore::create_job(db, Uuid::nil(), "bulk_add", &["bulk_add"])
            .await
            .unwrap();
        bulk_add(
            &ctx,
            &root.path().to_string_lossy(),
            library.id,
            None,
            false,
            true,
            false,
            job.id,
        )
        .await
        .unwrap();

        // Still exactly one collection - the existing one was left alone.
        let collections = CollectionStore::list_by_library(db, library.id).await.unwrap();
        assert_eq!(collections.len(), 1);
    }

    #[tokio::test]
    async fn bulk_add_without_auto_add_registers_nothing() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();

        let library = LibraryStore::create(db, "Comics", "/media/comics", None)
            .await
            .unwrap();
        let job = BackgroundJobStore::create_job(db, Uuid::nil(), "bulk_add", &["bulk_add"])
            .await
            .unwrap();

        bulk_add(
            &ctx,
            &root.path().to_string_lossy(),
            library.id,
            None,
            false,
            false,
            true,
            job.id,
        )
        .await
        .unwrap();

        let collections = CollectionStore::list_by_library(db, library.id).await.unwrap();
        assert!(collections.is_empty());
    }
}
