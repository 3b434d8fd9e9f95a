//! Collection entity - one scanned subtree of a library (an archive, a
//! folder of images) plus its rolled-up statistics.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "collections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub library_id: Uuid,
    pub path: String,
    /// Display name - defaults to the final path segment at creation time.
    pub name: String,
    /// "directory" | "archive"
    pub kind: String,
    /// "discovered" | "scanning" | "ready" | "error"
    pub status: String,
    /// MessagePack-encoded `CollectionStatistics`.
    pub statistics: Vec<u8>,
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
    #[sea_orm(has_many = "super::background_job::Entity")]
    BackgroundJobs,
    #[sea_orm(has_many = "super::file_processing_job_state::Entity")]
    FileProcessingJobStates,
}

impl Related<super::library::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Library.def()
    }
}

impl Related<super::background_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BackgroundJobs.def()
    }
}

impl Related<super::file_processing_job_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileProcessingJobStates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Rolled-up counters kept alongside a collection, serialized into
/// `Model::statistics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStatistics {
    pub discovered_files: u64,
    pub ingested_files: u64,
    pub thumbnails_generated: u64,
    pub cache_images_generated: u64,
    pub errors: u64,
    pub total_bytes: u64,
    pub last_scanned_at: Option<DateTimeUtc>,
}
