//! FileProcessingJobState entity - per-image derivative tracking within a
//! collection (source images, generated thumbnails, generated cache
//! images).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_processing_job_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub collection_id: Uuid,
    /// blake3(collection_id || relative_path), truncated - see
    /// `crate::image_processing::image_id`.
    pub image_id: String,
    /// MessagePack-encoded `Vec<SourceImage>`.
    pub images: Vec<u8>,
    /// MessagePack-encoded `Vec<Derivative>`.
    pub thumbnails: Vec<u8>,
    /// MessagePack-encoded `Vec<Derivative>`.
    pub cache_images: Vec<u8>,
    /// "pending" | "partial" | "complete" | "error"
    pub status: String,
    pub updated_at: DateTimeUtc,
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

/// A source file discovered during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceImage {
    pub relative_path: String,
    pub size_bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A generated derivative (thumbnail or cache image) bound to a cache
/// folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Derivative {
    pub cache_folder_id: Uuid,
    pub relative_path: String,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub size_bytes: u64,
}
