//! Atomic operators over the `background_jobs` table - the multi-stage job
//! tracker. Every operator that touches `stages` runs as a single
//! transaction: read the blob, mutate the in-memory map, write it back.
//! SQLite's default transaction isolation serializes concurrent writers on
//! the same row, so two workers racing to update the same job's stage
//! never interleave.

use super::entities::background_job::{self, Entity as BackgroundJob, StageState};
use super::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::collections::BTreeMap;
use uuid::Uuid;

pub struct BackgroundJobStore;

type Stages = BTreeMap<String, StageState>;

fn decode_stages(model: &background_job::Model) -> StoreResult<Stages> {
    Ok(rmp_serde::from_slice(&model.stages)?)
}

impl BackgroundJobStore {
    /// Create a job in the `pending` state with the given stages, each
    /// initialised to `pending`/`0/0`.
    pub async fn create_job(
        db: &DatabaseConnection,
        collection_id: Uuid,
        job_type: &str,
        stage_names: &[&str],
    ) -> StoreResult<background_job::Model> {
        let now = Utc::now();
        let stages: Stages = stage_names
            .iter()
            .map(|name| (name.to_string(), StageState::default()))
            .collect();

        let model = background_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            collection_id: Set(collection_id),
            job_type: Set(job_type.to_string()),
            status: Set("pending".to_string()),
            stages: Set(rmp_serde::to_vec(&stages)?),
            attempt: Set(0),
            error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            started_at: Set(None),
            completed_at: Set(None),
        };
        Ok(model.insert(db).await?)
    }

    pub async fn get(db: &DatabaseConnection, id: Uuid) -> StoreResult<background_job::Model> {
        BackgroundJob::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| StoreError::not_found("background_job", id))
    }

    pub fn stages(model: &background_job::Model) -> StoreResult<Stages> {
        decode_stages(model)
    }

    /// pending -> in_progress
    pub async fn start_job(db: &DatabaseConnection, id: Uuid) -> StoreResult<background_job::Model> {
        let existing = Self::get(db, id).await?;
        if existing.status != "pending" {
            return Err(StoreError::invalid_transition(
                "background_job",
                id,
                format!("cannot start job in status {}", existing.status),
            ));
        }
        let now = Utc::now();
        let mut model: background_job::ActiveModel = existing.into();
        model.status = Set("in_progress".to_string());
        model.attempt = Set(model.attempt.unwrap() + 1);
        model.started_at = Set(Some(now.into()));
        model.updated_at = Set(now.into());
        Ok(model.update(db).await?)
    }

    pub async fn start_stage(
        db: &DatabaseConnection,
        id: Uuid,
        stage: &str,
        total: u64,
    ) -> StoreResult<background_job::Model> {
        Self::mutate_stage(db, id, stage, |state| {
            state.status = "in_progress".to_string();
            state.total = total;
        })
        .await
    }

    /// `completed` and `failed` are accounted separately so a worker can
    /// tell the store which bucket a processed item belongs in rather than
    /// folding failures into the same counter as successes.
    pub async fn increment_stage(
        db: &DatabaseConnection,
        id: Uuid,
        stage: &str,
        completed: u64,
        failed: u64,
    ) -> StoreResult<background_job::Model> {
        Self::mutate_stage(db, id, stage, |state| {
            state.completed = state.completed.saturating_add(completed);
            state.failed = state.failed.saturating_add(failed);
        })
        .await
    }

    pub async fn complete_stage(
        db: &DatabaseConnection,
        id: Uuid,
        stage: &str,
    ) -> StoreResult<background_job::Model> {
        Self::mutate_stage(db, id, stage, |state| {
            state.status = "completed".to_string();
            if state.total == 0 {
                state.total = state.processed();
            }
        })
        .await
    }

    /// Fails a single stage. The job itself only moves to `failed` if no
    /// other stage is still `in_progress` - a stage failing while a sibling
    /// stage is actively making progress must not abort the whole job out
    /// from under it.
    pub async fn fail_stage(
        db: &DatabaseConnection,
        id: Uuid,
        stage: &str,
        error: &str,
    ) -> StoreResult<background_job::Model> {
        let txn = db.begin().await?;

        let existing = BackgroundJob::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("background_job", id))?;

        let mut stages = decode_stages(&existing)?;
        if let Some(state) = stages.get_mut(stage) {
            state.status = "failed".to_string();
        }
        let other_stage_in_progress = stages
            .iter()
            .any(|(name, state)| name != stage && state.status == "in_progress");
        let encoded = rmp_serde::to_vec(&stages)?;

        let now = Utc::now();
        let mut model: background_job::ActiveModel = existing.into();
        model.stages = Set(encoded);
        model.updated_at = Set(now.into());
        if !other_stage_in_progress {
            model.status = Set("failed".to_string());
            model.error = Set(Some(error.to_string()));
            model.completed_at = Set(Some(now.into()));
        }
        let updated = model.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }

    pub async fn complete_job(
        db: &DatabaseConnection,
        id: Uuid,
    ) -> StoreResult<background_job::Model> {
        let existing = Self::get(db, id).await?;
        let now = Utc::now();
        let mut model: background_job::ActiveModel = existing.into();
        model.status = Set("completed".to_string());
        model.completed_at = Set(Some(now.into()));
        model.updated_at = Set(now.into());
        Ok(model.update(db).await?)
    }

    /// Increment a stage's completed/failed counts and, if it has now
    /// reached its declared total, flip that stage to `completed`.
    pub async fn increment_stage_and_check(
        db: &DatabaseConnection,
        id: Uuid,
        stage: &str,
        completed: u64,
        failed: u64,
    ) -> StoreResult<background_job::Model> {
        let updated = Self::increment_stage(db, id, stage, completed, failed).await?;
        let stages = decode_stages(&updated)?;
        if let Some(state) = stages.get(stage) {
            if state.total > 0 && state.processed() >= state.total && state.status != "completed" {
                return Self::complete_stage(db, id, stage).await;
            }
        }
        Ok(updated)
    }

    /// Complete the job once every declared stage has reached `completed`.
    /// A no-op (returns `Ok(None)`) if the job is already terminal or any
    /// stage is still outstanding.
    pub async fn maybe_complete_job(
        db: &DatabaseConnection,
        id: Uuid,
    ) -> StoreResult<Option<background_job::Model>> {
        let existing = Self::get(db, id).await?;
        if matches!(existing.status.as_str(), "completed" | "failed" | "cancelled") {
            return Ok(None);
        }
        let stages = decode_stages(&existing)?;
        if stages.is_empty() || stages.values().any(|s| s.status != "completed") {
            return Ok(None);
        }
        Ok(Some(Self::complete_job(db, id).await?))
    }

    /// Whether a job has reached a terminal status - used by workers as a
    /// parent-job gate so a message for an already-cancelled or -failed job
    /// is acked and skipped rather than doing pointless work.
    pub async fn is_terminal(db: &DatabaseConnection, id: Uuid) -> StoreResult<bool> {
        let job = Self::get(db, id).await?;
        Ok(matches!(job.status.as_str(), "completed" | "failed" | "cancelled"))
    }

    /// Jobs still in a non-terminal status whose `updated_at` predates
    /// `cutoff` - candidates for the reconciler's staleness sweep.
    pub async fn find_stale(
        db: &DatabaseConnection,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<background_job::Model>> {
        Ok(BackgroundJob::find()
            .filter(background_job::Column::Status.is_in(["pending", "in_progress"]))
            .filter(background_job::Column::UpdatedAt.lt(cutoff))
            .all(db)
            .await?)
    }

    /// Overwrite a stage's recorded `completed`/`total` counts directly,
    /// bypassing the incremental add - used by the reconciler to correct
    /// drift against ground truth rather than accumulate another delta.
    /// `failed` is left untouched since ground truth only observes
    /// successfully-recorded derivatives.
    pub async fn set_stage_counts(
        db: &DatabaseConnection,
        id: Uuid,
        stage: &str,
        completed: u64,
        total: u64,
    ) -> StoreResult<background_job::Model> {
        Self::mutate_stage(db, id, stage, |state| {
            state.completed = completed;
            state.total = total;
        })
        .await
    }

    /// Mark a job `failed` without requiring a live stage context - used by
    /// the reconciler when a job has made no progress past the fatal
    /// staleness threshold.
    pub async fn fail_job(
        db: &DatabaseConnection,
        id: Uuid,
        error: &str,
    ) -> StoreResult<background_job::Model> {
        let existing = Self::get(db, id).await?;
        let now = Utc::now();
        let mut model: background_job::ActiveModel = existing.into();
        model.status = Set("failed".to_string());
        model.error = Set(Some(error.to_string()));
        model.completed_at = Set(Some(now.into()));
        model.updated_at = Set(now.into());
        Ok(model.update(db).await?)
    }

    /// Cancellation is allowed from any non-terminal state.
    pub async fn cancel(db: &DatabaseConnection, id: Uuid) -> StoreResult<background_job::Model> {
        let existing = Self::get(db, id).await?;
        if matches!(existing.status.as_str(), "completed" | "failed" | "cancelled") {
            return Err(StoreError::invalid_transition(
                "background_job",
                id,
                format!("cannot cancel job in terminal status {}", existing.status),
            ));
        }
        let now = Utc::now();
        let mut model: background_job::ActiveModel = existing.into();
        model.status = Set("cancelled".to_string());
        model.completed_at = Set(Some(now.into()));
        model.updated_at = Set(now.into());
        Ok(model.update(db).await?)
    }

    async fn mutate_stage(
        db: &DatabaseConnection,
        id: Uuid,
        stage: &str,
        f: impl FnOnce(&mut StageState),
    ) -> StoreResult<background_job::Model> {
        let txn = db.begin().await?;

        let existing = BackgroundJob::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("background_job", id))?;

        let mut stages = decode_stages(&existing)?;
        let state = stages
            .entry(stage.to_string())
            .or_insert_with(StageState::default);
        f(state);
        let encoded = rmp_serde::to_vec(&stages)?;

        let mut model: background_job::ActiveModel = existing.into();
        model.stages = Set(encoded);
        model.updated_at = Set(Utc::now().into());
        let updated = model.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }
}
