//! Quality-ceiling rules for generated derivatives.
//!
//! Quality is capped by a bytes-per-pixel density table computed from the
//! *source* image: a densely-detailed source (high bpp - scans, flat-color
//! art compresses smaller than painted/photographic pages) tolerates a
//! higher encode quality without the derivative ballooning in size, while a
//! sparse source gets a lower ceiling since little detail is lost.

/// Bytes-per-pixel density bands and the quality ceiling each implies.
const DENSITY_BANDS: &[(f64, u8)] = &[(2.0, 95), (1.0, 85), (0.5, 75)];
const FLOOR_QUALITY: u8 = 60;

/// Quality ceiling implied by the source image's bytes-per-pixel density.
pub fn quality_ceiling(source_bytes: u64, source_width: u32, source_height: u32) -> u8 {
    let pixels = (source_width as u64 * source_height as u64).max(1);
    let bpp = source_bytes as f64 / pixels as f64;

    for (threshold, quality) in DENSITY_BANDS {
        if bpp >= *threshold {
            return *quality;
        }
    }
    FLOOR_QUALITY
}

/// The quality actually used: never above the ceiling, never below the
/// configured floor.
pub fn effective_quality(configured_quality: u8, min_quality: u8, ceiling: u8) -> u8 {
    configured_quality.min(ceiling).max(min_quality)
}
