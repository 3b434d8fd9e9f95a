//! Atomic operators over the `collections` table.
//!
//! `statistics` is a MessagePack blob, so the increment operator is a
//! transaction-scoped read-modify-write rather than a single `UPDATE` -
//! SQLite's `BEGIN IMMEDIATE` serializes concurrent writers on the same
//! row, which is what makes this safe without an explicit row lock.

use super::entities::collection::{self, CollectionStatistics, Entity as Collection};
use super::error::{StoreError, StoreResult};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

pub struct CollectionStore;

/// Per-field deltas applied atomically to a collection's statistics.
#[derive(Debug, Clone, Default)]
pub struct StatisticsDelta {
    pub discovered_files: i64,
    pub ingested_files: i64,
    pub thumbnails_generated: i64,
    pub cache_images_generated: i64,
    pub errors: i64,
    pub total_bytes: i64,
}

fn apply_delta(stats: &mut CollectionStatistics, delta: &StatisticsDelta) {
    stats.discovered_files = stats.discovered_files.saturating_add_signed(delta.discovered_files);
    stats.ingested_files = stats.ingested_files.saturating_add_signed(delta.ingested_files);
    stats.thumbnails_generated = stats
        .thumbnails_generated
        .saturating_add_signed(delta.thumbnails_generated);
    stats.cache_images_generated = stats
        .cache_images_generated
        .saturating_add_signed(delta.cache_images_generated);
    stats.errors = stats.errors.saturating_add_signed(delta.errors);
    stats.total_bytes = stats.total_bytes.saturating_add_signed(delta.total_bytes);
}

impl CollectionStore {
    /// `kind` is "directory" or "archive". The display name defaults to the
    /// final path segment.
    pub async fn create(
        db: &DatabaseConnection,
        library_id: Uuid,
        path: &str,
        kind: &str,
    ) -> StoreResult<collection::Model> {
        let now = Utc::now();
        let stats = rmp_serde::to_vec(&CollectionStatistics::default())?;
        let name = path
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or(path)
            .to_string();
        let model = collection::ActiveModel {
            id: Set(Uuid::new_v4()),
            library_id: Set(library_id),
            path: Set(path.to_string()),
            name: Set(name),
            kind: Set(kind.to_string()),
            status: Set("discovered".to_string()),
            statistics: Set(stats),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(model.insert(db).await?)
    }

    pub async fn get(db: &DatabaseConnection, id: Uuid) -> StoreResult<collection::Model> {
        Collection::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| StoreError::not_found("collection", id))
    }

    pub async fn find_by_library_and_path(
        db: &DatabaseConnection,
        library_id: Uuid,
        path: &str,
    ) -> StoreResult<Option<collection::Model>> {
        Ok(Collection::find()
            .filter(collection::Column::LibraryId.eq(library_id))
            .filter(collection::Column::Path.eq(path))
            .one(db)
            .await?)
    }

    pub async fn list_by_library(
        db: &DatabaseConnection,
        library_id: Uuid,
    ) -> StoreResult<Vec<collection::Model>> {
        Ok(Collection::find()
            .filter(collection::Column::LibraryId.eq(library_id))
            .all(db)
            .await?)
    }

    pub fn statistics(model: &collection::Model) -> StoreResult<CollectionStatistics> {
        Ok(rmp_serde::from_slice(&model.statistics)?)
    }

    pub async fn set_status(
        db: &DatabaseConnection,
        id: Uuid,
        status: &str,
    ) -> StoreResult<collection::Model> {
        let existing = Self::get(db, id).await?;
        let mut model: collection::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(db).await?)
    }

    /// Stamp `last_scanned_at` on the collection's statistics - called once
    /// a scan finishes, successfully or not.
    pub async fn mark_scanned(db: &DatabaseConnection, id: Uuid) -> StoreResult<collection::Model> {
        let txn = db.begin().await?;

        let existing = Collection::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("collection", id))?;

        let mut stats: CollectionStatistics = rmp_serde::from_slice(&existing.statistics)?;
        stats.last_scanned_at = Some(Utc::now().into());
        let encoded = rmp_serde::to_vec(&stats)?;

        let mut model: collection::ActiveModel = existing.into();
        model.statistics = Set(encoded);
        model.updated_at = Set(Utc::now().into());
        let updated = model.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }

    /// Apply a delta to the collection's rolled-up statistics as a single
    /// serialized transaction.
    pub async fn increment_statistics(
        db: &DatabaseConnection,
        id: Uuid,
        delta: StatisticsDelta,
    ) -> StoreResult<collection::Model> {
        let txn = db.begin().await?;

        let existing = Collection::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("collection", id))?;

        let mut stats: CollectionStatistics = rmp_serde::from_slice(&existing.statistics)?;
        apply_delta(&mut stats, &delta);
        let encoded = rmp_serde::to_vec(&stats)?;

        let mut model: collection::ActiveModel = existing.into();
        model.statistics = Set(encoded);
        model.updated_at = Set(Utc::now().into());
        let updated = model.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::library_store::LibraryStore;
    use crate::store::test_db;

    async fn seed_library(db: &DatabaseConnection) -> Uuid {
        LibraryStore::create(db, "Comics", "/media/comics", None)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_derives_name_from_the_final_path_segment() {
        let db = test_db().await;
        let library_id = seed_library(&db).await;
        let collection = CollectionStore::create(&db, library_id, "comics/vol-1", "archive")
            .await
            .unwrap();

        assert_eq!(collection.name, "vol-1");
        assert_eq!(collection.kind, "archive");
    }

    #[tokio::test]
    async fn statistics_start_at_zero() {
        let db = test_db().await;
        let library_id = seed_library(&db).await;
        let collection = CollectionStore::create(&db, library_id, "vol-1", "directory")
            .await
            .unwrap();

        let stats = CollectionStore::statistics(&collection).unwrap();
        assert_eq!(stats.discovered_files, 0);
        assert_eq!(stats.total_bytes, 0);
    }

    #[tokio::test]
    async fn increment_statistics_accumulates_across_calls() {
        let db = test_db().await;
        let library_id = seed_library(&db).await;
        let collection = CollectionStore::create(&db, library_id, "vol-1", "directory")
            .await
            .unwrap();

        CollectionStore::increment_statistics(
            &db,
            collection.id,
            StatisticsDelta {
                discovered_files: 3,
                total_bytes: 900,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let updated = CollectionStore::increment_statistics(
            &db,
            collection.id,
            StatisticsDelta {
                thumbnails_generated: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let stats = CollectionStore::statistics(&updated).unwrap();
        assert_eq!(stats.discovered_files, 3);
        assert_eq!(stats.total_bytes, 900);
        assert_eq!(stats.thumbnails_generated, 2);
    }

    #[tokio::test]
    async fn find_by_library_and_path_is_scoped_per_library() {
        let db = test_db().await;
        let library_id = seed_library(&db).await;
        let other_library_id = LibraryStore::create(&db, "Manga", "/media/manga", None)
            .await
            .unwrap()
            .id;
        CollectionStore::create(&db, library_id, "vol-1", "directory").await.unwrap();

        assert!(
            CollectionStore::find_by_library_and_path(&db, library_id, "vol-1")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            CollectionStore::find_by_library_and_path(&db, other_library_id, "vol-1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
