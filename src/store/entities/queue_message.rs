//! QueueMessage entity - the durable broker queue backing the worker
//! pools. Messages are claimed with an atomic lease (see
//! [`crate::broker::queue`]) rather than dequeued destructively, so a
//! crashed worker's claim simply expires and the message becomes visible
//! again.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "queue_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub queue: String,
    /// MessagePack-encoded message envelope, see `crate::broker::message`.
    pub payload: Vec<u8>,
    /// "ready" | "leased" | "done"
    pub status: String,
    pub available_at: DateTimeUtc,
    pub attempts: i32,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
