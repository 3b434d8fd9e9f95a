//! Thumbnail worker (C5): generates a small preview derivative for one
//! source image.

use super::run_queue_worker;
use crate::broker::{ClaimedMessage, QueuePayload};
use crate::cache_folders::CacheFolderManager;
use crate::context::WorkerContext;
use crate::image_processing::{self, generator, ImageOutcome};
use crate::store::background_job_store::BackgroundJobStore;
use crate::store::collection_store::CollectionStore;
use crate::store::entities::file_processing_job_state::Derivative;
use crate::store::file_processing_job_state_store::FileProcessingJobStateStore;
use crate::store::library_store::LibraryStore;
use std::path::PathBuf;
use tracing::instrument;
use uuid::Uuid;

const STAGE: &str = "thumbnail";

pub async fn run(ctx: WorkerContext, worker_id: String) {
    let concurrency = ctx.config.read().await.workers.thumbnail_concurrency;
    run_queue_worker(ctx, "thumbnail", worker_id, concurrency, handle).await
}

#[instrument(skip(ctx), fields(message_id = %message.id))]
async fn handle(ctx: WorkerContext, message: ClaimedMessage) -> Result<(), String> {
    let QueuePayload::Thumbnail {
        collection_id,
        job_id,
        image_id,
        relative_path,
    } = message.payload
    else {
        return Err("thumbnail worker received a non-thumbnail message".to_string());
    };

    if BackgroundJobStore::is_terminal(ctx.db.conn(), job_id)
        .await
        .unwrap_or(false)
    {
        tracing::debug!(%job_id, "parent job already terminal, skipping thumbnail");
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
            crate::store::collection_store::StatisticsDelta {
                errors: 1,
                ..Default::default()
            },
        )
        .await;
        tracing::warn!(%collection_id, %image_id, %error, "thumbnail generation failed");
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

    let (max_dimension, min_quality, max_quality) = {
        let config = ctx.config.read().await;
        (
            config.thumbnail_defaults.max_dimension,
            config.thumbnail_defaults.min_quality,
            config.thumbnail_defaults.max_quality,
        )
    };

    let source_path_owned = source_path.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        generator::generate_outcome(
            &source_path_owned,
            max_dimension,
            max_dimension,
            min_quality,
            max_quality,
        )
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

    FileProcessingJobStateStore::upsert_thumbnail(
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
        crate::store::collection_store::StatisticsDelta {
            thumbnails_generated: 1,
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
    async fn generate_and_store_writes_a_derivative_and_records_it() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let library_root = tempfile::tempdir().unwrap();
        std::fs::create_dir(library_root.path().join("vol-1")).unwrap();
        let source_path = library_root.path().join("vol-1").join("page-001.png");
        image::RgbImage::new(400, 300)
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
            .expect("thumbnail generation should succeed");

        let state = FileProcessingJobStateStore::get(db, collection.id, &image_id)
            .await
            .unwrap();
        let thumbnails: Vec<Derivative> = rmp_serde::from_slice(&state.thumbnails).unwrap();
        assert_eq!(thumbnails.len(), 1);
        assert!(thumbnails[0].width <= 1024 && thumbnails[0].height <= 1024);

        let written_path = PathBuf::from(&cache_dir.path()).join(&thumbnails[0].relative_path);
        assert!(written_path.exists());
    }

    #[tokio::test]
    async fn generate_and_store_fails_without_cache_capacity() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let library_root = tempfile::tempdir().unwrap();
        std::fs::create_dir(library_root.path().join("vol-1")).unwrap();
        let source_path = library_root.path().join("vol-1").join("page-001.png");
        image::RgbImage::new(400, 300)
            .save(&source_path)
            .expect("write fixture image");

        let library = LibraryStore::create(db, "Comics", &library_root.path().to_string_lossy(), None)
            .await
            .unwrap();
        let collection = CollectionStore::create(db, library.id, "vol-1", "directory")
            .await
            .unwrap();
        // No cache folders registered at all.

        let image_id = image_processing::image_id(collection.id, "page-001.png");
        let result = generate_and_store(&ctx, collection.id, &image_id, "page-001.png").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn generate_and_store_preserves_an_animated_gif_untouched() {
        let (_tmp, ctx) = test_context().await;
        let db = ctx.db.conn();

        let library_root = tempfile::tempdir().unwrap();
        std::fs::create_dir(library_root.path().join("vol-1")).unwrap();
        let source_path = library_root.path().join("vol-1").join("sticker.gif");
        write_two_frame_gif(&source_path);

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

        let image_id = image_processing::image_id(collection.id, "sticker.gif");
        generate_and_store(&ctx, collection.id, &image_id, "sticker.gif")
            .await
            .expect("animated gif should be preserved, not rejected");

        let state = FileProcessingJobStateStore::get(db, collection.id, &image_id)
            .await
            .unwrap();
        let thumbnails: Vec<Derivative> = rmp_serde::from_slice(&state.thumbnails).unwrap();
        assert!(thumbnails[0].relative_path.ends_with(".gif"));
        assert_eq!(thumbnails[0].quality, 100);
    }

    fn write_two_frame_gif(path: &std::path::Path) {
        use image::codecs::gif::GifEncoder;
        use image::{Delay, Frame, RgbaImage};

        let file = std::fs::File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        for _ in 0..2 {
            let image = RgbaImage::new(20, 20);
            let frame = Frame::from_parts(image, 0, 0, Delay::from_numer_denom_ms(100, 1));
            encoder.encode_frame(frame).unwrap();
        }
    }
}
