//! Cache folder manager: picks a destination cache folder for a new
//! derivative write, favouring folders with more headroom while staying
//! "sticky" to a collection's previously bound folder so a single
//! collection's derivatives don't scatter across every disk.

use crate::store::cache_folder_store::CacheFolderStore;
use crate::store::entities::cache_folder;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheFolderError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("no active cache folder has capacity for {0} bytes")]
    NoCapacity(i64),
}

pub type CacheFolderResult<T> = Result<T, CacheFolderError>;

pub struct CacheFolderManager;

impl CacheFolderManager {
    /// Pick a cache folder for a write of approximately `estimated_bytes`
    /// on behalf of `collection_id`.
    ///
    /// If a folder already has `collection_id` pinned in its
    /// `cached_collection_ids` and still qualifies on capacity, it is
    /// reused so a collection's derivatives all land on the same disk.
    /// Otherwise folders are chosen by weighted random selection over
    /// `priority` - a folder with priority 0 is only used when no
    /// qualifying folder has a positive priority, i.e. it is the last
    /// resort rather than a candidate in the normal weighted draw.
    pub async fn pick(
        db: &DatabaseConnection,
        collection_id: Uuid,
        estimated_bytes: i64,
    ) -> CacheFolderResult<cache_folder::Model> {
        let folders = CacheFolderStore::list(db).await?;
        let candidates: Vec<_> = folders
            .into_iter()
            .filter(|f| f.status == "active")
            .filter(|f| headroom(f) >= estimated_bytes)
            .collect();

        if candidates.is_empty() {
            return Err(CacheFolderError::NoCapacity(estimated_bytes));
        }

        if let Some(folder) = candidates
            .iter()
            .find(|f| f.cached_collection_ids().contains(&collection_id))
        {
            return Ok(folder.clone());
        }

        let prioritized: Vec<&cache_folder::Model> =
            candidates.iter().filter(|f| f.priority > 0).collect();
        let pool: Vec<&cache_folder::Model> = if prioritized.is_empty() {
            candidates.iter().collect()
        } else {
            prioritized
        };

        let weights: Vec<i32> = pool.iter().map(|f| f.priority.max(1)).collect();
        let dist =
            WeightedIndex::new(&weights).map_err(|_| CacheFolderError::NoCapacity(estimated_bytes))?;
        let mut rng = thread_rng();
        let index = dist.sample(&mut rng);
        Ok(pool[index].clone())
    }

    /// Record a write against the chosen folder and pin `collection_id` to
    /// it, returning the folder's updated accounting.
    pub async fn bind(
        db: &DatabaseConnection,
        cache_folder_id: Uuid,
        collection_id: Uuid,
        bytes: i64,
    ) -> CacheFolderResult<cache_folder::Model> {
        CacheFolderStore::add_cached_collection(db, cache_folder_id, collection_id).await?;
        Ok(CacheFolderStore::account_write(db, cache_folder_id, bytes).await?)
    }

    /// Record a deletion against a folder (orphan sweep, re-generation).
    pub async fn release(
        db: &DatabaseConnection,
        cache_folder_id: Uuid,
        bytes: i64,
    ) -> CacheFolderResult<cache_folder::Model> {
        Ok(CacheFolderStore::account_delete(db, cache_folder_id, bytes).await?)
    }
}

fn headroom(folder: &cache_folder::Model) -> i64 {
    let watermark = (folder.capacity_bytes as f64 * folder.high_watermark_ratio) as i64;
    (watermark - folder.used_bytes).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn folder(used: i64, capacity: i64, ratio: f64, status: &str) -> cache_folder::Model {
        folder_with_priority(used, capacity, ratio, status, 1)
    }

    fn folder_with_priority(
        used: i64,
        capacity: i64,
        ratio: f64,
        status: &str,
        priority: i32,
    ) -> cache_folder::Model {
        cache_folder::Model {
            id: Uuid::new_v4(),
            path: "/tmp/cache".into(),
            capacity_bytes: capacity,
            used_bytes: used,
            high_watermark_ratio: ratio,
            priority,
            cached_collection_ids: None,
            status: status.into(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn headroom_is_clamped_to_zero_past_watermark() {
        assert_eq!(headroom(&folder(999, 1000, 0.9, "active")), 0);
    }

    #[test]
    fn headroom_reflects_remaining_space_under_watermark() {
        assert_eq!(headroom(&folder(0, 1000, 0.9, "active")), 900);
    }

    #[tokio::test]
    async fn pick_avoids_zero_priority_folders_while_another_qualifies() {
        let db = crate::store::test_db().await;
        let last_resort = CacheFolderStore::create(&db, "/cache/last-resort", 1000, 0.9, 0)
            .await
            .unwrap();
        let preferred = CacheFolderStore::create(&db, "/cache/preferred", 1000, 0.9, 5)
            .await
            .unwrap();

        for _ in 0..10 {
            let picked = CacheFolderManager::pick(&db, Uuid::new_v4(), 10).await.unwrap();
            assert_eq!(picked.id, preferred.id);
        }
        let _ = last_resort;
    }

    #[tokio::test]
    async fn pick_falls_back_to_zero_priority_when_nothing_else_qualifies() {
        let db = crate::store::test_db().await;
        let last_resort = CacheFolderStore::create(&db, "/cache/last-resort", 1000, 0.9, 0)
            .await
            .unwrap();

        let picked = CacheFolderManager::pick(&db, Uuid::new_v4(), 10).await.unwrap();
        assert_eq!(picked.id, last_resort.id);
    }

    #[tokio::test]
    async fn pick_stays_sticky_to_a_collections_existing_folder() {
        let db = crate::store::test_db().await;
        let sticky = CacheFolderStore::create(&db, "/cache/a", 1000, 0.9, 1).await.unwrap();
        let other = CacheFolderStore::create(&db, "/cache/b", 1000, 0.9, 10).await.unwrap();
        let collection_id = Uuid::new_v4();
        CacheFolderStore::add_cached_collection(&db, sticky.id, collection_id)
            .await
            .unwrap();

        // Despite `other` carrying the higher priority, the collection
        // stays pinned to the folder it is already bound to.
        let picked = CacheFolderManager::pick(&db, collection_id, 10).await.unwrap();
        assert_eq!(picked.id, sticky.id);
        let _ = other;
    }
}
