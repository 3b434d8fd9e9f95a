//! Atomic operators over the `file_processing_job_states` table.
//!
//! `images`, `thumbnails` and `cache_images` are MessagePack-encoded
//! vectors. Push/addToSet semantics are implemented as a transaction-scoped
//! read-modify-write keyed by `(collection_id, image_id)`.

use super::entities::file_processing_job_state::{
    self, Derivative, Entity as FileProcessingJobState, SourceImage,
};
use super::error::{StoreError, StoreResult};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

pub struct FileProcessingJobStateStore;

impl FileProcessingJobStateStore {
    pub async fn get_or_create(
        db: &DatabaseConnection,
        collection_id: Uuid,
        image_id: &str,
    ) -> StoreResult<file_processing_job_state::Model> {
        if let Some(existing) = FileProcessingJobState::find()
            .filter(file_processing_job_state::Column::CollectionId.eq(collection_id))
            .filter(file_processing_job_state::Column::ImageId.eq(image_id))
            .one(db)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let empty: Vec<u8> = rmp_serde::to_vec::<Vec<()>>(&vec![])?;
        let model = file_processing_job_state::ActiveModel {
            id: Set(Uuid::new_v4()),
            collection_id: Set(collection_id),
            image_id: Set(image_id.to_string()),
            images: Set(empty.clone()),
            thumbnails: Set(empty.clone()),
            cache_images: Set(empty),
            status: Set("pending".to_string()),
            updated_at: Set(now.into()),
        };
        Ok(model.insert(db).await?)
    }

    pub async fn get(
        db: &DatabaseConnection,
        collection_id: Uuid,
        image_id: &str,
    ) -> StoreResult<file_processing_job_state::Model> {
        FileProcessingJobState::find()
            .filter(file_processing_job_state::Column::CollectionId.eq(collection_id))
            .filter(file_processing_job_state::Column::ImageId.eq(image_id))
            .one(db)
            .await?
            .ok_or_else(|| StoreError::not_found("file_processing_job_state", image_id))
    }

    pub async fn list_by_collection(
        db: &DatabaseConnection,
        collection_id: Uuid,
    ) -> StoreResult<Vec<file_processing_job_state::Model>> {
        Ok(FileProcessingJobState::find()
            .filter(file_processing_job_state::Column::CollectionId.eq(collection_id))
            .all(db)
            .await?)
    }

    /// Append a discovered source file if it is not already recorded.
    pub async fn push_image(
        db: &DatabaseConnection,
        id: Uuid,
        image: SourceImage,
    ) -> StoreResult<file_processing_job_state::Model> {
        Self::mutate(db, id, |images, _, _| {
            if !images.iter().any(|existing| existing.relative_path == image.relative_path) {
                images.push(image.clone());
            }
        })
        .await
    }

    /// Insert a generated thumbnail, replacing any existing derivative for
    /// the same cache folder + relative path (re-generation overwrites).
    pub async fn upsert_thumbnail(
        db: &DatabaseConnection,
        id: Uuid,
        derivative: Derivative,
    ) -> StoreResult<file_processing_job_state::Model> {
        Self::mutate(db, id, |_, thumbnails, _| {
            upsert_derivative(thumbnails, derivative.clone());
        })
        .await
    }

    /// Insert a generated cache image, same upsert semantics as
    /// [`Self::upsert_thumbnail`].
    pub async fn upsert_cache_image(
        db: &DatabaseConnection,
        id: Uuid,
        derivative: Derivative,
    ) -> StoreResult<file_processing_job_state::Model> {
        Self::mutate(db, id, |_, _, cache_images| {
            upsert_derivative(cache_images, derivative.clone());
        })
        .await
    }

    pub async fn set_status(
        db: &DatabaseConnection,
        id: Uuid,
        status: &str,
    ) -> StoreResult<file_processing_job_state::Model> {
        let existing = FileProcessingJobState::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| StoreError::not_found("file_processing_job_state", id))?;
        let mut model: file_processing_job_state::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(db).await?)
    }

    async fn mutate(
        db: &DatabaseConnection,
        id: Uuid,
        f: impl FnOnce(&mut Vec<SourceImage>, &mut Vec<Derivative>, &mut Vec<Derivative>),
    ) -> StoreResult<file_processing_job_state::Model> {
        let txn = db.begin().await?;

        let existing = FileProcessingJobState::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("file_processing_job_state", id))?;

        let mut images: Vec<SourceImage> = rmp_serde::from_slice(&existing.images)?;
        let mut thumbnails: Vec<Derivative> = rmp_serde::from_slice(&existing.thumbnails)?;
        let mut cache_images: Vec<Derivative> = rmp_serde::from_slice(&existing.cache_images)?;

        f(&mut images, &mut thumbnails, &mut cache_images);

        let images_enc = rmp_serde::to_vec(&images)?;
        let thumbnails_enc = rmp_serde::to_vec(&thumbnails)?;
        let cache_images_enc = rmp_serde::to_vec(&cache_images)?;

        let mut model: file_processing_job_state::ActiveModel = existing.into();
        model.images = Set(images_enc);
        model.thumbnails = Set(thumbnails_enc);
        model.cache_images = Set(cache_images_enc);
        model.updated_at = Set(Utc::now().into());
        let updated = model.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }
}

fn upsert_derivative(list: &mut Vec<Derivative>, derivative: Derivative) {
    if let Some(existing) = list.iter_mut().find(|d| {
        d.cache_folder_id == derivative.cache_folder_id && d.relative_path == derivative.relative_path
    }) {
        *existing = derivative;
    } else {
        list.push(derivative);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collection_store::CollectionStore;
    use crate::store::library_store::LibraryStore;
    use crate::store::test_db;

    async fn seed_collection(db: &DatabaseConnection) -> Uuid {
        let library_id = LibraryStore::create(db, "Comics", "/media/comics", None)
            .await
            .unwrap()
            .id;
        CollectionStore::create(db, library_id, "vol-1", "directory").await.unwrap().id
    }

    #[tokio::test]
    async fn push_image_is_idempotent_on_relative_path() {
        let db = test_db().await;
        let collection_id = seed_collection(&db).await;
        let state = FileProcessingJobStateStore::get_or_create(&db, collection_id, "abc123")
            .await
            .unwrap();

        let image = SourceImage {
            relative_path: "page-001.jpg".to_string(),
            size_bytes: 1024,
            width: Some(800),
            height: Some(600),
        };
        FileProcessingJobStateStore::push_image(&db, state.id, image.clone())
            .await
            .unwrap();
        let updated = FileProcessingJobStateStore::push_image(&db, state.id, image)
            .await
            .unwrap();

        let images: Vec<SourceImage> = rmp_serde::from_slice(&updated.images).unwrap();
        assert_eq!(images.len(), 1);
    }

    #[tokio::test]
    async fn upsert_thumbnail_replaces_same_cache_folder_and_path() {
        let db = test_db().await;
        let collection_id = seed_collection(&db).await;
        let state = FileProcessingJobStateStore::get_or_create(&db, collection_id, "abc123")
            .await
            .unwrap();
        let cache_folder_id = Uuid::new_v4();

        FileProcessingJobStateStore::upsert_thumbnail(
            &db,
            state.id,
            Derivative {
                cache_folder_id,
                relative_path: "ab/cd/abc123.webp".to_string(),
                size_bytes: 2048,
                width: 300,
                height: 300,
                quality: 90,
            },
        )
        .await
        .unwrap();
        let updated = FileProcessingJobStateStore::upsert_thumbnail(
            &db,
            state.id,
            Derivative {
                cache_folder_id,
                relative_path: "ab/cd/abc123.webp".to_string(),
                size_bytes: 4096,
                width: 300,
                height: 300,
                quality: 90,
            },
        )
        .await
        .unwrap();

        let thumbnails: Vec<Derivative> = rmp_serde::from_slice(&updated.thumbnails).unwrap();
        assert_eq!(thumbnails.len(), 1);
        assert_eq!(thumbnails[0].size_bytes, 4096);
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_row_on_repeat_calls() {
        let db = test_db().await;
        let collection_id = seed_collection(&db).await;
        let first = FileProcessingJobStateStore::get_or_create(&db, collection_id, "abc123")
            .await
            .unwrap();
        let second = FileProcessingJobStateStore::get_or_create(&db, collection_id, "abc123")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }
}
