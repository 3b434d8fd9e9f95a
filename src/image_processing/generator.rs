//! Derivative generation: decode a source image, resize it to fit within a
//! bounding box while preserving aspect ratio, and re-encode as WebP - or,
//! for animated sources, preserve the original bytes untouched.

use super::error::{ImageError, ImageResult};
use super::quality::{effective_quality, quality_ceiling};
use super::{mime, mime::extension_of};
use image::imageops::FilterType;
use image::GenericImageView;
use std::path::Path;

/// Dimensions and encoded bytes of a generated derivative.
pub struct GeneratedImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Result of processing one source image: either a generated static WebP
/// derivative, or the original bytes preserved verbatim because the source
/// is an animated/time-based container that re-encoding would break.
pub enum ImageOutcome {
    Generated(GeneratedImage),
    AnimatedPreserved {
        bytes: Vec<u8>,
        width: u32,
        height: u32,
        /// Source extension, so the derivative keeps playing as the same
        /// container rather than being written out as `.webp`.
        extension: String,
    },
}

/// Decide how to process one source file, dispatching to [`generate`] for
/// static images and to verbatim byte preservation for animated ones.
///
/// Decoding and encoding are CPU-bound; callers run this inside
/// `tokio::task::spawn_blocking`.
pub fn generate_outcome(
    source_path: &Path,
    max_width: u32,
    max_height: u32,
    min_quality: u8,
    max_quality: u8,
) -> ImageResult<ImageOutcome> {
    if mime::is_animated(source_path) {
        let bytes = std::fs::read(source_path)?;
        let (width, height) = image::image_dimensions(source_path).unwrap_or((0, 0));
        let extension = extension_of(source_path).unwrap_or_else(|| "bin".to_string());
        return Ok(ImageOutcome::AnimatedPreserved {
            bytes,
            width,
            height,
            extension,
        });
    }

    Ok(ImageOutcome::Generated(generate(
        source_path,
        max_width,
        max_height,
        min_quality,
        max_quality,
    )?))
}

/// Generate a derivative that fits within `max_width` x `max_height`,
/// encoded as WebP. When the source already fits and no resize happens,
/// the derivative is encoded at literal quality 100 rather than the
/// configured quality - there is no compression-artefact tradeoff to make
/// when no pixels are being discarded.
pub fn generate(
    source_path: &Path,
    max_width: u32,
    max_height: u32,
    min_quality: u8,
    max_quality: u8,
) -> ImageResult<GeneratedImage> {
    let source_bytes = std::fs::metadata(source_path)?.len();
    let source = image::open(source_path)?;
    let (source_w, source_h) = source.dimensions();

    let (target_w, target_h) = calculate_dimensions(source_w, source_h, max_width, max_height);
    let needs_resize = target_w != source_w || target_h != source_h;

    let resized = if needs_resize {
        source.resize(target_w, target_h, FilterType::Lanczos3)
    } else {
        source
    };

    let quality = if needs_resize {
        let ceiling = quality_ceiling(source_bytes, source_w, source_h);
        effective_quality(max_quality, min_quality, ceiling)
    } else {
        100
    };

    let rgba = resized.to_rgba8();
    let encoder = webp::Encoder::from_rgba(&rgba, resized.width(), resized.height());
    let encoded = encoder.encode(quality as f32);

    Ok(GeneratedImage {
        width: resized.width(),
        height: resized.height(),
        bytes: encoded.to_vec(),
    })
}

/// Scale `(width, height)` down to fit within `max_width` x `max_height`,
/// preserving aspect ratio. Never upscales.
fn calculate_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let width_ratio = max_width as f64 / width as f64;
    let height_ratio = max_height as f64 / height as f64;
    let ratio = width_ratio.min(height_ratio);

    let new_width = (width as f64 * ratio).round().max(1.0) as u32;
    let new_height = (height as f64 * ratio).round().max(1.0) as u32;
    (new_width, new_height)
}
