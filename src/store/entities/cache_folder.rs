//! CacheFolder entity - a disk location the cache folder manager writes
//! generated derivatives into, with live capacity accounting.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cache_folders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub path: String,
    pub capacity_bytes: i64,
    pub used_bytes: i64,
    pub high_watermark_ratio: f64,
    /// Selection weight among folders with enough headroom. 0 means "only
    /// use this folder if nothing else qualifies".
    pub priority: i32,
    /// MessagePack-encoded `Vec<Uuid>` of collections whose derivatives are
    /// pinned to this folder, so a collection's images land together.
    pub cached_collection_ids: Option<Vec<u8>>,
    /// "active" | "full" | "offline"
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn cached_collection_ids(&self) -> Vec<uuid::Uuid> {
        self.cached_collection_ids
            .as_deref()
            .and_then(|bytes| rmp_serde::from_slice(bytes).ok())
            .unwrap_or_default()
    }
}
