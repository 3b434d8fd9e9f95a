//! Atomic operators over the `cache_folders` table.
//!
//! `used_bytes` accounting is the one counter in the whole store that maps
//! directly onto a single `UPDATE ... SET used_bytes = used_bytes + ?`
//! round-trip, since it is a plain integer column rather than a blob.

use super::entities::cache_folder::{self, Entity as CacheFolder};
use super::error::{StoreError, StoreResult};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set, Statement,
};
use uuid::Uuid;

pub struct CacheFolderStore;

impl CacheFolderStore {
    pub async fn create(
        db: &DatabaseConnection,
        path: &str,
        capacity_bytes: i64,
        high_watermark_ratio: f64,
        priority: i32,
    ) -> StoreResult<cache_folder::Model> {
        let now = Utc::now();
        let model = cache_folder::ActiveModel {
            id: Set(Uuid::new_v4()),
            path: Set(path.to_string()),
            capacity_bytes: Set(capacity_bytes),
            used_bytes: Set(0),
            high_watermark_ratio: Set(high_watermark_ratio),
            priority: Set(priority),
            cached_collection_ids: Set(None),
            status: Set("active".to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(model.insert(db).await?)
    }

    pub async fn get(db: &DatabaseConnection, id: Uuid) -> StoreResult<cache_folder::Model> {
        CacheFolder::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| StoreError::not_found("cache_folder", id))
    }

    pub async fn list(db: &DatabaseConnection) -> StoreResult<Vec<cache_folder::Model>> {
        Ok(CacheFolder::find().all(db).await?)
    }

    /// Record a write of `bytes` into this cache folder, flipping it to
    /// `full` in the same statement if it now sits at or above its high
    /// watermark.
    pub async fn account_write(
        db: &DatabaseConnection,
        id: Uuid,
        bytes: i64,
    ) -> StoreResult<cache_folder::Model> {
        db.execute(Statement::from_sql_and_values(
            sea_orm::DatabaseBackend::Sqlite,
            r#"
            UPDATE cache_folders
            SET used_bytes = used_bytes + ?,
                status = CASE
                    WHEN (used_bytes + ?) >= CAST(capacity_bytes AS REAL) * high_watermark_ratio
                        THEN 'full'
                    ELSE status
                END,
                updated_at = ?
            WHERE id = ?
            "#,
            [
                bytes.into(),
                bytes.into(),
                Utc::now().to_rfc3339().into(),
                id.to_string().into(),
            ],
        ))
        .await?;

        Self::get(db, id).await
    }

    /// Record a deletion of `bytes` from this cache folder, clamped at
    /// zero, flipping it back to `active` if it drops below watermark.
    pub async fn account_delete(
        db: &DatabaseConnection,
        id: Uuid,
        bytes: i64,
    ) -> StoreResult<cache_folder::Model> {
        db.execute(Statement::from_sql_and_values(
            sea_orm::DatabaseBackend::Sqlite,
            r#"
            UPDATE cache_folders
            SET used_bytes = MAX(0, used_bytes - ?),
                status = CASE
                    WHEN status = 'full'
                         AND MAX(0, used_bytes - ?) < CAST(capacity_bytes AS REAL) * high_watermark_ratio
                        THEN 'active'
                    ELSE status
                END,
                updated_at = ?
            WHERE id = ?
            "#,
            [
                bytes.into(),
                bytes.into(),
                Utc::now().to_rfc3339().into(),
                id.to_string().into(),
            ],
        ))
        .await?;

        Self::get(db, id).await
    }

    /// Overwrite `used_bytes` with a freshly measured value (the orphan
    /// sweep calls this after reconciling against the filesystem).
    pub async fn recalculate(
        db: &DatabaseConnection,
        id: Uuid,
        actual_bytes: i64,
    ) -> StoreResult<cache_folder::Model> {
        let existing = Self::get(db, id).await?;
        let watermark = existing.capacity_bytes as f64 * existing.high_watermark_ratio;
        let status = if (actual_bytes as f64) >= watermark {
            "full"
        } else {
            "active"
        };

        let mut model: cache_folder::ActiveModel = existing.into();
        model.used_bytes = Set(actual_bytes);
        model.status = Set(status.to_string());
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(db).await?)
    }

    /// Pin a collection to this cache folder, idempotently. Future writes
    /// for the same collection should stick here via
    /// `CacheFolderManager::pick`'s sticky lookup.
    pub async fn add_cached_collection(
        db: &DatabaseConnection,
        id: Uuid,
        collection_id: Uuid,
    ) -> StoreResult<cache_folder::Model> {
        let existing = Self::get(db, id).await?;
        let mut collections = existing.cached_collection_ids();
        if !collections.contains(&collection_id) {
            collections.push(collection_id);
        }
        let encoded = rmp_serde::to_vec(&collections)?;

        let mut model: cache_folder::ActiveModel = existing.into();
        model.cached_collection_ids = Set(Some(encoded));
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(db).await?)
    }

    pub async fn set_status(
        db: &DatabaseConnection,
        id: Uuid,
        status: &str,
    ) -> StoreResult<cache_folder::Model> {
        let existing = Self::get(db, id).await?;
        let mut model: cache_folder::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_db;

    #[tokio::test]
    async fn account_write_flips_to_full_at_watermark() {
        let db = test_db().await;
        let folder = CacheFolderStore::create(&db, "/cache/a", 1000, 0.9, 1).await.unwrap();

        let updated = CacheFolderStore::account_write(&db, folder.id, 500).await.unwrap();
        assert_eq!(updated.used_bytes, 500);
        assert_eq!(updated.status, "active");

        let updated = CacheFolderStore::account_write(&db, folder.id, 450).await.unwrap();
        assert_eq!(updated.used_bytes, 950);
        assert_eq!(updated.status, "full");
    }

    #[tokio::test]
    async fn account_delete_clamps_at_zero_and_reactivates() {
        let db = test_db().await;
        let folder = CacheFolderStore::create(&db, "/cache/a", 1000, 0.9, 1).await.unwrap();
        CacheFolderStore::account_write(&db, folder.id, 950).await.unwrap();

        let updated = CacheFolderStore::account_delete(&db, folder.id, 100).await.unwrap();
        assert_eq!(updated.used_bytes, 850);
        assert_eq!(updated.status, "active");

        let updated = CacheFolderStore::account_delete(&db, folder.id, 10_000).await.unwrap();
        assert_eq!(updated.used_bytes, 0);
    }

    #[tokio::test]
    async fn recalculate_overwrites_used_bytes_and_status() {
        let db = test_db().await;
        let folder = CacheFolderStore::create(&db, "/cache/a", 1000, 0.9, 1).await.unwrap();
        CacheFolderStore::account_write(&db, folder.id, 100).await.unwrap();

        let updated = CacheFolderStore::recalculate(&db, folder.id, 950).await.unwrap();
        assert_eq!(updated.used_bytes, 950);
        assert_eq!(updated.status, "full");
    }

    #[tokio::test]
    async fn add_cached_collection_is_idempotent() {
        let db = test_db().await;
        let folder = CacheFolderStore::create(&db, "/cache/a", 1000, 0.9, 1).await.unwrap();
        let collection_id = Uuid::new_v4();

        CacheFolderStore::add_cached_collection(&db, folder.id, collection_id)
            .await
            .unwrap();
        let updated = CacheFolderStore::add_cached_collection(&db, folder.id, collection_id)
            .await
            .unwrap();

        assert_eq!(updated.cached_collection_ids(), vec![collection_id]);
    }
}
