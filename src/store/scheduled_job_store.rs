//! Atomic operators over the `scheduled_jobs` table - the next-fire
//! bookkeeping driving the library scheduler's cron loop.

use super::entities::{library, scheduled_job};
use super::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter,
    QuerySelect, RelationTrait, Set,
};
use uuid::Uuid;

pub struct ScheduledJobStore;

impl ScheduledJobStore {
    pub async fn create_for_library(
        db: &DatabaseConnection,
        library_id: Uuid,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<scheduled_job::Model> {
        let now = Utc::now();
        let model = scheduled_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            library_id: Set(library_id),
            next_run_at: Set(next_run_at.into()),
            last_run_at: Set(None),
            last_result: Set(None),
            enabled: Set(true),
            run_count: Set(0),
            success_count: Set(0),
            failure_count: Set(0),
            last_run_duration_ms: Set(None),
            external_binding: Set(None),
            parameters: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(model.insert(db).await?)
    }

    /// Scheduled jobs whose `next_run_at` has elapsed and that are enabled,
    /// joined with their owning library for the cron expression and root
    /// path.
    pub async fn due(
        db: &DatabaseConnection,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<(scheduled_job::Model, library::Model)>> {
        let rows = scheduled_job::Entity::find()
            .filter(scheduled_job::Column::NextRunAt.lte(now))
            .filter(scheduled_job::Column::Enabled.eq(true))
            .join(JoinType::InnerJoin, scheduled_job::Relation::Library.def())
            .select_also(library::Entity)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(job, lib)| lib.map(|lib| (job, lib)))
            .collect())
    }

    pub async fn find_by_library(
        db: &DatabaseConnection,
        library_id: Uuid,
    ) -> StoreResult<Option<scheduled_job::Model>> {
        Ok(scheduled_job::Entity::find()
            .filter(scheduled_job::Column::LibraryId.eq(library_id))
            .one(db)
            .await?)
    }

    /// Record that a scheduled job fired and advance it to its next
    /// occurrence. `result` is prefixed `"ok"` or `"error"` by convention
    /// (see `scheduler::fire_due`), which is what drives the
    /// success/failure counters.
    pub async fn advance(
        db: &DatabaseConnection,
        id: Uuid,
        next_run_at: DateTime<Utc>,
        result: &str,
        duration_ms: i64,
    ) -> StoreResult<scheduled_job::Model> {
        let existing = scheduled_job::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| StoreError::not_found("scheduled_job", id))?;

        let succeeded = result.starts_with("ok");
        let now = Utc::now();
        let mut model: scheduled_job::ActiveModel = existing.into();
        model.next_run_at = Set(next_run_at.into());
        model.last_run_at = Set(Some(now.into()));
        model.last_result = Set(Some(result.to_string()));
        model.run_count = Set(model.run_count.unwrap() + 1);
        if succeeded {
            model.success_count = Set(model.success_count.unwrap() + 1);
        } else {
            model.failure_count = Set(model.failure_count.unwrap() + 1);
        }
        model.last_run_duration_ms = Set(Some(duration_ms));
        model.updated_at = Set(now.into());
        Ok(model.update(db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::library_store::LibraryStore;
    use crate::store::test_db;

    #[tokio::test]
    async fn due_only_returns_jobs_whose_next_run_has_elapsed() {
        let db = test_db().await;
        let library_id = LibraryStore::create(&db, "Comics", "/media/comics", Some("0 0 * * *".to_string()))
            .await
            .unwrap()
            .id;

        let past = Utc::now() - chrono::Duration::minutes(5);
        ScheduledJobStore::create_for_library(&db, library_id, past).await.unwrap();

        let due = ScheduledJobStore::due(&db, Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.id, library_id);
    }

    #[tokio::test]
    async fn due_excludes_jobs_scheduled_in_the_future() {
        let db = test_db().await;
        let library_id = LibraryStore::create(&db, "Comics", "/media/comics", None)
            .await
            .unwrap()
            .id;
        let future = Utc::now() + chrono::Duration::hours(1);
        ScheduledJobStore::create_for_library(&db, library_id, future).await.unwrap();

        let due = ScheduledJobStore::due(&db, Utc::now()).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn advance_records_last_run_and_moves_next_run_forward() {
        let db = test_db().await;
        let library_id = LibraryStore::create(&db, "Comics", "/media/comics", None)
            .await
            .unwrap()
            .id;
        let past = Utc::now() - chrono::Duration::minutes(5);
        let job = ScheduledJobStore::create_for_library(&db, library_id, past).await.unwrap();

        let next_run = Utc::now() + chrono::Duration::hours(1);
        let updated = ScheduledJobStore::advance(&db, job.id, next_run, "ok: 3 collections", 150)
            .await
            .unwrap();

        assert!(updated.last_run_at.is_some());
        assert_eq!(updated.last_result.as_deref(), Some("ok: 3 collections"));
        assert_eq!(updated.run_count, 1);
        assert_eq!(updated.success_count, 1);
        assert_eq!(updated.failure_count, 0);
        assert_eq!(updated.last_run_duration_ms, Some(150));
        assert!(ScheduledJobStore::due(&db, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn advance_increments_failure_count_on_error_results() {
        let db = test_db().await;
        let library_id = LibraryStore::create(&db, "Comics", "/media/comics", None)
            .await
            .unwrap()
            .id;
        let past = Utc::now() - chrono::Duration::minutes(5);
        let job = ScheduledJobStore::create_for_library(&db, library_id, past).await.unwrap();

        let next_run = Utc::now() + chrono::Duration::hours(1);
        let updated = ScheduledJobStore::advance(&db, job.id, next_run, "error: root path missing", 20)
            .await
            .unwrap();

        assert_eq!(updated.run_count, 1);
        assert_eq!(updated.success_count, 0);
        assert_eq!(updated.failure_count, 1);
    }
}
