//! ScheduledJob entity - the next-fire bookkeeping for a library's cron
//! schedule. One row per library; the scheduler loop claims due rows and
//! advances `next_run_at` using the library's cron expression.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scheduled_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub library_id: Uuid,
    pub next_run_at: DateTimeUtc,
    pub last_run_at: Option<DateTimeUtc>,
    pub last_result: Option<String>,
    /// Disabled bindings are skipped by the `due()` scan but kept around so
    /// the orphan sweep doesn't recreate them.
    pub enabled: bool,
    pub run_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_run_duration_ms: Option<i64>,
    /// Opaque identifier of an external scheduler/runtime that owns this
    /// binding's cadence, if the fire was triggered externally rather than
    /// by this process's own cron loop.
    pub external_binding: Option<String>,
    /// MessagePack-encoded `BTreeMap<String, String>` of operator-supplied
    /// parameters forwarded to the fired scan (e.g. a path prefix filter).
    pub parameters: Option<Vec<u8>>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::library::Entity",
        from = "Column::LibraryId",
        to = "super::library::Column::Id"
    )]
    Library,
}

impl Related<super::library::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Library.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
