//! Collection scan worker (C7): walks a collection's directory tree (and
//! any ZIP/CBZ archives within it), recording every source image it
//! finds, and fans each one out into a thumbnail and cache-image
//! generation message.

use crate::broker::{ClaimedMessage, QueuePayload};
use crate::context::WorkerContext;
use crate::image_processing::{self, mime};
use crate::store::background_job_store::BackgroundJobStore;
use crate::store::collection_store::{CollectionStore, StatisticsDelta};
use crate::store::entities::file_processing_job_state::SourceImage;
use crate::store::file_processing_job_state_store::FileProcessingJobStateStore;
use crate::store::library_store::LibraryStore;
use std::path::{Path, PathBuf};
use tracing::instrument;
use uuid::Uuid;
use walkdir::WalkDir;

const STAGE: &str = "discovery";

pub async fn run(ctx: WorkerContext, worker_id: String) {
    let concurrency = ctx.config.read().await.workers.collection_scan_concurrency;
    super::run_queue_worker(ctx, "collection_scan", worker_id, concurrency, handle).await
}

#[instrument(skip(ctx), fields(message_id = %message.id))]
async fn handle(ctx: WorkerContext, message: ClaimedMessage) -> Result<(), String> {
    let QueuePayload::CollectionScan { collection_id, job_id } = message.payload else {
        return Err("collection scan worker received an unexpected message".to_string());
    };

    if BackgroundJobStore::is_terminal(ctx.db.conn(), job_id)
        .await
        .unwrap_or(false)
    {
        tracing::debug!(%job_id, "parent job already terminal, skipping scan");
        return Ok(());
    }

    let result = scan(&ctx, collection_id, job_id).await;

    match &result {
        Ok(()) => {
            let _ = BackgroundJobStore::complete_stage(ctx.db.conn(), job_id, STAGE).await;
            let _ = BackgroundJobStore::maybe_complete_job(ctx.db.conn(), job_id).await;
        }
        Err(error) => {
            let _ = BackgroundJobStore::fail_stage(ctx.db.conn(), job_id, STAGE, &error.to_string())
                .await;
            let _ = CollectionStore::set_status(ctx.db.conn(), collection_id, "error").await;
        }
    }

    result.map_err(|e| e.to_string())
}

async fn scan(ctx: &WorkerContext, collection_id: Uuid, job_id: Uuid) -> anyhow::Result<()> {
    let db = ctx.db.conn();

    // Idempotent: a retried message may find the job already started.
    if let Err(err) = BackgroundJobStore::start_job(db, job_id).await {
        tracing::debug!(%job_id, %err, "job already started, continuing scan");
    }
    BackgroundJobStore::start_stage(db, job_id, STAGE, 0).await?;
    CollectionStore::set_status(db, collection_id, "scanning").await?;

    let collection = CollectionStore::get(db, collection_id).await?;
    let library = LibraryStore::get(db, collection.library_id).await?;
    let root = PathBuf::from(&library.root_path).join(&collection.path);

    let discovered = tokio::task::spawn_blocking(move || discover(&root)).await??;

    for (relative_path, size_bytes) in &discovered {
        let image_id = image_processing::image_id(collection_id, relative_path);
        let state = FileProcessingJobStateStore::get_or_create(db, collection_id, &image_id).await?;
        FileProcessingJobStateStore::push_image(
            db,
            state.id,
            SourceImage {
                relative_path: relative_path.clone(),
                size_bytes: *size_bytes,
                width: None,
                height: None,
            },
        )
        .await?;
    }

    BackgroundJobStore::increment_stage(db, job_id, STAGE, discovered.len() as u64, 0).await?;

    CollectionStore::increment_statistics(
        db,
        collection_id,
        StatisticsDelta {
            discovered_files: discovered.len() as i64,
            total_bytes: discovered.iter().map(|(_, size)| *size as i64).sum(),
            ..Default::default()
        },
    )
    .await?;
    CollectionStore::set_status(db, collection_id, "ready").await?;
    CollectionStore::mark_scanned(db, collection_id).await?;

    let total = discovered.len() as u64;
    BackgroundJobStore::start_stage(db, job_id, "thumbnail", total).await?;
    BackgroundJobStore::start_stage(db, job_id, "cache_image", total).await?;

    if discovered.is_empty() {
        BackgroundJobStore::complete_stage(db, job_id, "thumbnail").await?;
        BackgroundJobStore::complete_stage(db, job_id, "cache_image").await?;
        return Ok(());
    }

    for (relative_path, _) in &discovered {
        let image_id = image_processing::image_id(collection_id, relative_path);
        ctx.broker
            .enqueue(QueuePayload::Thumbnail {
                collection_id,
                job_id,
                image_id: image_id.clone(),
                relative_path: relative_path.clone(),
            })
            .await?;
        ctx.broker
            .enqueue(QueuePayload::CacheImage {
                collection_id,
                job_id,
                image_id,
                relative_path: relative_path.clone(),
            })
            .await?;
    }

    Ok(())
}

/// Walk `root` for image files and images nested inside ZIP/CBZ archives.
/// Archive entries are addressed as `archive/relative/path::entry/name`.
fn discover(root: &Path) -> anyhow::Result<Vec<(String, u64)>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().to_string();

        if mime::is_image(path) {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            found.push((relative, size));
        } else if mime::is_zip_archive(path) {
            found.extend(discover_zip_archive(path, &relative)?);
        } else if mime::is_rar_archive(path) {
            found.extend(discover_rar_archive(path, &relative)?);
        }
    }

    Ok(found)
}

#[cfg(feature = "rar")]
fn discover_rar_archive(path: &Path, archive_relative: &str) -> anyhow::Result<Vec<(String, u64)>> {
    let mut found = Vec::new();
    let archive = unrar::Archive::new(path).open_for_listing()?;

    for entry in archive {
        let entry = entry?;
        if entry.is_directory() {
            continue;
        }
        let entry_path = Path::new(&entry.filename);
        if mime::is_image(entry_path) {
            found.push((
                format!("{archive_relative}::{}", entry.filename),
                entry.unpacked_size as u64,
            ));
        }
    }

    Ok(found)
}

#[cfg(not(feature = "rar"))]
fn discover_rar_archive(_path: &Path, _archive_relative: &str) -> anyhow::Result<Vec<(String, u64)>> {
    Ok(Vec::new())
}

fn discover_zip_archive(path: &Path, archive_relative: &str) -> anyhow::Result<Vec<(String, u64)>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut found = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let zip_entry = archive.by_index(i)?;
        if !zip_entry.is_file() {
            continue;
        }
        let entry_path = Path::new(zip_entry.name());
        if mime::is_image(entry_path) {
            found.push((
                format!("{archive_relative}::{}", zip_entry.name()),
                zip_entry.size(),
            ));
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::test_context;
    use crate::store::collection_store::CollectionStore;
    use crate::store::library_store::LibraryStore;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn discover_finds_loose_images_and_skips_unrelated_files() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("page-001.jpg"), b"fake-jpeg").unwrap();
        std::fs::write(root.path().join("page-002.PNG"), b"fake-png").unwrap();
        std::fs::write(root.path().join("notes.txt"), b"not an image").unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        std::fs::write(root.path().join("sub/page-003.webp"), b"fake-webp").unwrap();

        let mut found = discover(root.path()).unwrap();
        found.sort();

        let names: Vec<&str> = found.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["page-001.jpg", "page-002.PNG", "sub/page-003.webp"]);
    }

    #[test]
    fn discover_finds_images_nested_inside_a_zip_archive() {
        let root = tempfile::tempdir().unwrap();
        write_zip(
            &root.path().join("volume-01.cbz"),
            &[("001.jpg", b"fake-jpeg"), ("readme.txt", b"ignored")],
        );

        let found = discover(root.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "volume-01.cbz::001.jpg");
        assert_eq!(found[0].1, "fake-jpeg".len() as u64);
    }

    #[tokio::test]
    async fn scan_records_a_source_image_per_discovered_file() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();
        std::fs::write(root.path().join("vol-1/page-001.jpg"), b"fake-jpeg").unwrap();
        std::fs::write(root.path().join("vol-1/page-002.jpg"), b"fake-jpeg-2").unwrap();

        let library = LibraryStore::create(db, "Comics", &root.path().to_string_lossy(), None)
            .await
            .unwrap();
        let collection = CollectionStore::create(db, library.id, "vol-1", "directory")
            .await
            .unwrap();
        let job = BackgroundJobStore::create_job(
            db,
            collection.id,
            "collection_scan",
            &["discovery", "thumbnail", "cache_image"],
        )
        .await
        .unwrap();

        scan(&ctx, collection.id, job.id).await.unwrap();

        let states = FileProcessingJobStateStore::list_by_collection(db, collection.id)
            .await
            .unwrap();
        assert_eq!(states.len(), 2);

        let collection = CollectionStore::get(db, collection.id).await.unwrap();
        assert_eq!(collection.status, "ready");

        let job = BackgroundJobStore::get(db, job.id).await.unwrap();
        let stages = BackgroundJobStore::stages(&job).unwrap();
        assert_eq!(stages["thumbnail"].total, 2);
        assert_eq!(stages["cache_image"].total, 2);

        let claimed = ctx.broker.claim("thumbnail", 10, 60, "test-worker").await.unwrap();
        assert_eq!(claimed.len(), 2);
        let claimed = ctx.broker.claim("cache_image", 10, 60, "test-worker").await.unwrap();
        assert_eq!(claimed.len(), 2);
    }

    #[tokio::test]
    async fn scan_with_no_images_completes_thumbnail_and_cache_image_immediately() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("vol-1")).unwrap();

        let library = LibraryStore::create(db, "Comics", &root.path().to_string_lossy(), None)
            .await
            .unwrap();
        let collection = CollectionStore::create(db, library.id, "vol-1", "directory")
            .await
            .unwrap();
        let job = BackgroundJobStore::create_job(
            db,
            collection.id,
            "collection_scan",
            &["discovery", "thumbnail", "cache_image"],
        )
        .await
        .unwrap();

        scan(&ctx, collection.id, job.id).await.unwrap();

        let job = BackgroundJobStore::get(db, job.id).await.unwrap();
        let stages = BackgroundJobStore::stages(&job).unwrap();
        assert_eq!(stages["thumbnail"].status, "completed");
        assert_eq!(stages["cache_image"].status, "completed");
    }
}
