//! Image decoding, resizing and re-encoding for thumbnails and cache
//! images, plus the content-addressed naming scheme derivatives are
//! written under.

pub mod error;
pub mod generator;
pub mod mime;
pub mod quality;

pub use error::{ImageError, ImageResult};
pub use generator::{generate, generate_outcome, GeneratedImage, ImageOutcome};

use uuid::Uuid;

/// Deterministic, short, collision-resistant id for a source file within a
/// collection: `blake3(collection_id || relative_path)`, truncated to 16
/// hex characters. Stable across rescans so re-running a scan doesn't
/// orphan and regenerate every derivative.
pub fn image_id(collection_id: Uuid, relative_path: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(collection_id.as_bytes());
    hasher.update(relative_path.as_bytes());
    let hash = hasher.finalize();
    hash.to_hex()[..16].to_string()
}

/// Relative path a derivative is written under inside its cache folder,
/// sharded two levels deep by the first four hex characters of its id to
/// keep any one directory from accumulating too many entries.
pub fn derivative_path(image_id: &str, extension: &str) -> String {
    let (a, rest) = image_id.split_at(2);
    let (b, _) = rest.split_at(2);
    format!("{a}/{b}/{image_id}.{extension}")
}
