//! Message envelopes carried by the broker, one variant per worker queue.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The payload of a queued message. Each variant corresponds to exactly
/// one queue name, so a worker pool only ever sees the shape it expects -
/// there is no dynamic dispatch by a job-type string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueuePayload {
    /// Scan a collection: discover files, diff against known state.
    CollectionScan { collection_id: Uuid, job_id: Uuid },

    /// Bulk-add (C8): walk `root_path` one level deep and register a
    /// collection for each immediate directory/archive entry found,
    /// optionally triggering a scan for each one registered.
    BulkAdd {
        root_path: String,
        library_id: Uuid,
        /// Path prefix prepended to each registered collection's stored
        /// path, e.g. to file everything found under a shared label.
        prefix: Option<String>,
        /// Re-register (and re-scan) a collection that already exists at
        /// the computed path, rather than skipping it.
        overwrite_existing: bool,
        /// Actually register discovered entries as collections. When
        /// false this is a dry run that only reports what would be added.
        auto_add: bool,
        /// Enqueue a `CollectionScan` for each collection registered.
        /// Ignored when `auto_add` is false.
        trigger_scan: bool,
        job_id: Uuid,
    },

    /// Generate a thumbnail for one source image.
    Thumbnail {
        collection_id: Uuid,
        job_id: Uuid,
        image_id: String,
        relative_path: String,
    },

    /// Generate a cache image (full-resolution re-encode) for one source
    /// image.
    CacheImage {
        collection_id: Uuid,
        job_id: Uuid,
        image_id: String,
        relative_path: String,
    },
}

impl QueuePayload {
    /// The queue this payload belongs on.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::CollectionScan { .. } => "collection_scan",
            Self::BulkAdd { .. } => "bulk_add",
            Self::Thumbnail { .. } => "thumbnail",
            Self::CacheImage { .. } => "cache_image",
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            Self::CollectionScan { job_id, .. }
            | Self::BulkAdd { job_id, .. }
            | Self::Thumbnail { job_id, .. }
            | Self::CacheImage { job_id, .. } => *job_id,
        }
    }
}

/// A message handed to a worker after a successful claim. Carries enough
/// bookkeeping for the worker to `ack`/`nack` it when done.
#[derive(Debug, Clone)]
pub struct ClaimedMessage {
    pub id: Uuid,
    pub queue: String,
    pub payload: QueuePayload,
    pub attempts: i32,
}
