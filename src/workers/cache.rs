//! Cache image worker (C6): generates a 1920x1080-bounded re-encoded
//! derivative for one source image, used for the primary reading view
//! rather than a preview grid.

use crate::broker::{ClaimedMessage, QueuePayload};
use crate::cache_folders::CacheFolderManager;
use crate::context::WorkerContext;
use crate::image_processing::{self, generator, ImageOutcome};
use crate::store::background_job_store::BackgroundJobStore;
use crate::store::collection_store::{CollectionStore, StatisticsDelta};
use crate::store::entities::file_processing_job_state::Derivative;
use crate::store::file_processing_job_state_store::FileProcessingJobStateStore;
use crate::store::library_store::LibraryStore;
use std::path::PathBuf;
use tracing::instrument;
use uuid::Uuid;

const STAGE: &str = "cache_image";

pub async fn run(ctx: WorkerContext, worker_id: String) {
    let concurrency = ctx.config.read().await.workers.cache_concurrency;
    super::run_queue_worker(ctx, "cache_image", worker_id, concurrency, handle).await
}

#[instrument(skip(ctx), fields(message_id = %message.id))]
async fn handle(ctx: WorkerContext, message: ClaimedMessage) -> Result<(), String> {
    let QueuePayload::CacheImage {
        collection_id,
        job_id,
        image_id,
        relative_path,
    } = message.payload
    else {
        return Err("cache worker received a non-cache-image message".to_string());
    };

    if BackgroundJobStore::is_terminal(ctx.db.conn(), job_id)
        .await
        .unwrap_or(false)
    {
        tracing::debug!(%job_id, "parent job already terminal, skipping cache image");
        return Ok(());
    }

    let result = generate_and_store(&ctx, collection_id, &image_id, &relative_path).await;

    let (completed, failed) = if result.is_ok() { (1, 0) } else { (0, 1) };
    let _ = BackgroundJobStore::increment_stage_and_check(
        ctx.db.conn(),
        job_id,
        STAGE,
        completed,
        failed,
    )
    .await;
    let _ = BackgroundJobStore::maybe_complete_job(ctx.db.conn(), job_id).await;

    if let Err(error) = &result {
        let _ = CollectionStore::increment_statistics(
            ctx.db.conn(),
            collection_id,
            StatisticsDelta {
                errors: 1,
                ..Default::default()
            },
        )
        .await;
        tracing::warn!(%collection_id, %image_id, %error, "cache image generation failed");
    }

    result.map_err(|e| e.to_string())
}

async fn generate_and_store(
    ctx: &WorkerContext,
    collection_id: Uuid,
    image_id: &str,
    relative_path: &str,
) -> anyhow::Result<()> {
    let db = ctx.db.conn();
    let collection = CollectionStore::get(db, collection_id).await?;
    let library = LibraryStore::get(db, collection.library_id).await?;
    let source_path = PathBuf::from(&library.root_path)
        .join(&collection.path)
        .join(relative_path);

    let (max_width, max_height, min_quality, max_quality) = {
        let config = ctx.config.read().await;
        let defaults = &config.cache_image_defaults;
        (
            defaults.max_width,
            defaults.max_height,
            defaults.min_quality,
            defaults.max_quality,
        )
    };

    let source_path_owned = source_path.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        generator::generate_outcome(&source_path_owned, max_width, max_height, min_quality, max_quality)
    })
    .await??;

    let (bytes, width, height, quality, extension) = match outcome {
        ImageOutcome::Generated(generated) => {
            (generated.bytes, generated.width, generated.height, max_quality, "webp".to_string())
        }
        ImageOutcome::AnimatedPreserved { bytes, width, height, extension } => {
            (bytes, width, height, 100, extension)
        }
    };

    let cache_folder = CacheFolderManager::pick(db, collection_id, bytes.len() as i64).await?;
    let derivative_relpath = image_processing::derivative_path(image_id, &extension);
    let dest_path = PathBuf::from(&cache_folder.path).join(&derivative_relpath);

    if let Some(parent) = dest_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&dest_path, &bytes).await?;

    CacheFolderManager::bind(db, cache_folder.id, collection_id, bytes.len() as i64).await?;

    FileProcessingJobStateStore::upsert_cache_image(
        db,
        FileProcessingJobStateStore::get_or_create(db, collection_id, image_id)
            .await?
            .id,
        Derivative {
            cache_folder_id: cache_folder.id,
            relative_path: derivative_relpath,
            width,
            height,
            quality,
            size_bytes: bytes.len() as u64,
        },
    )
    .await?;

    CollectionStore::increment_statistics(
        db,
        collection_id,
        StatisticsDelta {
            cache_images_generated: 1,
            ..Default::default()
        },
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::test_context;
    use crate::store::cache_folder_store::CacheFolderStore;

    #[tokio::test]
    async fn generate_and_store_resizes_to_fit_1920x1080() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let library_root = tempfile::tempdir().unwrap();
        std::fs::create_dir(library_root.path().join("vol-1")).unwrap();
        let source_path = library_root.path().join("vol-1").join("page-001.png");
        image::RgbImage::new(2000, 1500)
            .save(&source_path)
            .expect("write fixture image");

        let library = LibraryStore::create(db, "Comics", &library_root.path().to_string_lossy(), None)
            .await
            .unwrap();
        let collection = CollectionStore::create(db, library.id, "vol-1", "directory")
            .await
            .unwrap();

        let cache_dir = tempfile::tempdir().unwrap();
        CacheFolderStore::create(db, &cache_dir.path().to_string_lossy(), 100_000_000, 0.9, 1)
            .await
            .unwrap();

        let image_id = image_processing::image_id(collection.id, "page-001.png");
        generate_and_store(&ctx, collection.id, &image_id, "page-001.png")
            .await
            .expect("cache image generation should succeed");

        let state = FileProcessingJobStateStore::get(db, collection.id, &image_id)
            .await
            .unwrap();
        let cache_images: Vec<Derivative> = rmp_serde::from_slice(&state.cache_images).unwrap();
        assert_eq!(cache_images.len(), 1);
        // A 2000x1500 source exceeds the 1920x1080 box on both axes, so it
        // is resized down rather than preserved at full resolution.
        assert!(cache_images[0].width <= 1920 && cache_images[0].height <= 1080);
        assert!(cache_images[0].width < 2000);
    }

    #[tokio::test]
    async fn generate_and_store_preserves_small_images_at_quality_100() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let library_root = tempfile::tempdir().unwrap();
        std::fs::create_dir(library_root.path().join("vol-1")).unwrap();
        let source_path = library_root.path().join("vol-1").join("page-001.png");
        image::RgbImage::new(800, 600)
            .save(&source_path)
            .expect("write fixture image");

        let library = LibraryStore::create(db, "Comics", &library_root.path().to_string_lossy(), None)
            .await
            .unwrap();
        let collection = CollectionStore::create(db, library.id, "vol-1", "directory")
            .await
            .unwrap();

        let cache_dir = tempfile::tempdir().unwrap();
        CacheFolderStore::create(db, &cache_dir.path().to_string_lossy(), 100_000_000, 0.9, 1)
            .await
            .unwrap();

        let image_id = image_processing::image_id(collection.id, "page-001.png");
        generate_and_store(&ctx, collection.id, &image_id, "page-001.png")
            .await
            .expect("cache image generation should succeed");

        let state = FileProcessingJobStateStore::get(db, collection.id, &image_id)
            .await
            .unwrap();
        let cache_images: Vec<Derivative> = rmp_serde::from_slice(&state.cache_images).unwrap();
        assert_eq!((cache_images[0].width, cache_images[0].height), (800, 600));
        assert_eq!(cache_images[0].quality, 100);
    }
}
