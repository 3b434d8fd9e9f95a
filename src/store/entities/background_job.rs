//! BackgroundJob entity - the multi-stage job tracker. Stage-level
//! progress lives in the `stages` blob rather than child rows, since a
//! single worker owns it for the job's lifetime and every read/write is
//! whole-document.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "background_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub collection_id: Uuid,
    /// "collection_scan" | "bulk_add" | "thumbnail" | "cache_image"
    pub job_type: String,
    /// "pending" | "in_progress" | "completed" | "failed" | "cancelled"
    pub status: String,
    /// MessagePack-encoded `BTreeMap<String, StageState>`.
    pub stages: Vec<u8>,
    pub attempt: i32,
    pub error: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::collection::Entity",
        from = "Column::CollectionId",
        to = "super::collection::Column::Id"
    )]
    Collection,
}

impl Related<super::collection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Collection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Per-stage progress, keyed by stage name inside `Model::stages`.
///
/// `completed` and `failed` are tracked separately so a stage whose items
/// all errored out is distinguishable from one that succeeded - both
/// still advance `processed()` toward `total`, but only `completed` items
/// represent usable derivatives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageState {
    pub status: String,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

impl StageState {
    /// Items accounted for so far, whether they succeeded or failed.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }
}
