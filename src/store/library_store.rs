//! Atomic operators over the `libraries` table.

use super::entities::library::{self, Entity as Library};
use super::error::{StoreError, StoreResult};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

pub struct LibraryStore;

impl LibraryStore {
    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        root_path: &str,
        cron_expression: Option<String>,
    ) -> StoreResult<library::Model> {
        let now = Utc::now();
        let model = library::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            root_path: Set(root_path.to_string()),
            cron_expression: Set(cron_expression),
            status: Set("active".to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(model.insert(db).await?)
    }

    pub async fn get(db: &DatabaseConnection, id: Uuid) -> StoreResult<library::Model> {
        Library::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| StoreError::not_found("library", id))
    }

    pub async fn list(db: &DatabaseConnection) -> StoreResult<Vec<library::Model>> {
        Ok(Library::find().all(db).await?)
    }

    pub async fn set_status(
        db: &DatabaseConnection,
        id: Uuid,
        status: &str,
    ) -> StoreResult<library::Model> {
        let existing = Self::get(db, id).await?;
        let mut model: library::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(db).await?)
    }

    pub async fn find_by_root_path(
        db: &DatabaseConnection,
        root_path: &str,
    ) -> StoreResult<Option<library::Model>> {
        Ok(Library::find()
            .filter(library::Column::RootPath.eq(root_path))
            .one(db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_db;

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let db = test_db().await;
        let created = LibraryStore::create(&db, "Comics", "/media/comics", None)
            .await
            .unwrap();
        assert_eq!(created.status, "active");

        let fetched = LibraryStore::get(&db, created.id).await.unwrap();
        assert_eq!(fetched.root_path, "/media/comics");
    }

    #[tokio::test]
    async fn get_missing_library_is_not_found() {
        let db = test_db().await;
        let err = LibraryStore::get(&db, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "library", .. }));
    }

    #[tokio::test]
    async fn find_by_root_path_is_exact() {
        let db = test_db().await;
        LibraryStore::create(&db, "Comics", "/media/comics", Some("0 */6 * * *".to_string()))
            .await
            .unwrap();

        assert!(LibraryStore::find_by_root_path(&db, "/media/comics")
            .await
            .unwrap()
            .is_some());
        assert!(LibraryStore::find_by_root_path(&db, "/media/other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn set_status_persists() {
        let db = test_db().await;
        let created = LibraryStore::create(&db, "Comics", "/media/comics", None)
            .await
            .unwrap();
        let updated = LibraryStore::set_status(&db, created.id, "paused")
            .await
            .unwrap();
        assert_eq!(updated.status, "paused");
    }
}
