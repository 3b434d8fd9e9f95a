//! Application configuration.

pub mod app_config;
pub mod migration;

pub use app_config::AppConfig;
pub use migration::Migrate;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Resolve the default data directory for the daemon.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("pictura"))
        .ok_or_else(|| anyhow::anyhow!("could not determine a default data directory"))
}

/// Defaults applied to a newly registered cache folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDefaults {
    pub capacity_bytes: u64,
    pub high_watermark_ratio: f64,
}

impl Default for CacheDefaults {
    fn default() -> Self {
        Self {
            capacity_bytes: 50 * 1024 * 1024 * 1024,
            high_watermark_ratio: 0.9,
        }
    }
}

/// Thumbnail / cache-image generation tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailDefaults {
    pub max_dimension: u32,
    pub min_quality: u8,
    pub max_quality: u8,
}

impl Default for ThumbnailDefaults {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            min_quality: 40,
            max_quality: 90,
        }
    }
}

/// Cache-image generation tunables: the larger, full-resolution-ish
/// derivative used for reading, as opposed to the small thumbnail grid
/// tile `ThumbnailDefaults` governs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheImageDefaults {
    pub max_width: u32,
    pub max_height: u32,
    pub min_quality: u8,
    pub max_quality: u8,
}

impl Default for CacheImageDefaults {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            min_quality: 40,
            max_quality: 90,
        }
    }
}

/// Per-queue worker pool sizing and claim/lease behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub thumbnail_concurrency: usize,
    pub cache_concurrency: usize,
    pub collection_scan_concurrency: usize,
    pub bulk_add_concurrency: usize,
    pub claim_batch_size: u32,
    pub lease_seconds: i64,
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thumbnail_concurrency: 4,
            cache_concurrency: 4,
            collection_scan_concurrency: 2,
            bulk_add_concurrency: 2,
            claim_batch_size: 64,
            lease_seconds: 900,
            max_attempts: 5,
        }
    }
}

/// Reconciler sweep cadence (stuck job detection, crash recovery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub interval_seconds: u64,
    pub stale_job_seconds: i64,
    /// No-progress duration past which a stalled job is given up on and
    /// marked failed, rather than merely re-synced against ground truth.
    pub fatal_stale_seconds: i64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            stale_job_seconds: 300,
            fatal_stale_seconds: 1800,
        }
    }
}

/// Orphaned cache-file sweep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanSweepConfig {
    pub cron_expression: String,
    pub grace_period_seconds: i64,
}

impl Default for OrphanSweepConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 3 * * * *".to_string(),
            grace_period_seconds: 3600,
        }
    }
}

/// Broker durability knobs shared by every queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    pub dead_letter_after_attempts: u32,
    pub visibility_timeout_seconds: i64,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            dead_letter_after_attempts: 5,
            visibility_timeout_seconds: 900,
        }
    }
}
