//! Extension-based content typing. Media containers don't carry embedded
//! type sniffing in this pipeline - a collection is scanned by walking the
//! filesystem, so the extension is all there is to go on until the file is
//! actually decoded.

use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"];
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "cbz"];
#[cfg(feature = "rar")]
const RAR_EXTENSIONS: &[&str] = &["rar", "cbr"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "mkv"];

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_image(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_zip_archive(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(feature = "rar")]
pub fn is_rar_archive(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| RAR_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(not(feature = "rar"))]
pub fn is_rar_archive(_path: &Path) -> bool {
    false
}

pub fn is_archive(path: &Path) -> bool {
    is_zip_archive(path) || is_rar_archive(path)
}

/// Whether a discovered source is an animated or time-based container that
/// must be preserved byte-for-byte rather than re-encoded as a static WebP
/// derivative. Videos are always preserved; GIF/WebP containers are only
/// preserved if they actually carry more than one frame.
pub fn is_animated(path: &Path) -> bool {
    match extension_of(path).as_deref() {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => true,
        Some("gif") => gif_has_multiple_frames(path),
        Some("webp") => webp_has_animation_chunk(path),
        _ => false,
    }
}

fn gif_has_multiple_frames(path: &Path) -> bool {
    use image::AnimationDecoder;

    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    let Ok(decoder) = image::codecs::gif::GifDecoder::new(file) else {
        return false;
    };
    let mut frames = decoder.into_frames();
    frames.next().is_some() && frames.next().is_some()
}

/// WebP's RIFF container marks an animated file with a `VP8X` extended
/// header whose flags byte has the animation bit set, rather than a bare
/// `VP8 `/`VP8L` chunk - cheaper to sniff than decoding the whole file.
fn webp_has_animation_chunk(path: &Path) -> bool {
    const ANIMATION_FLAG: u8 = 0b0000_0010;

    let Ok(bytes) = std::fs::read(path) else {
        return false;
    };
    if bytes.len() < 21 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return false;
    }
    if &bytes[12..16] != b"VP8X" {
        return false;
    }
    bytes[20] & ANIMATION_FLAG != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn recognises_common_image_extensions() {
        assert!(is_image(&PathBuf::from("page-001.JPG")));
        assert!(is_image(&PathBuf::from("cover.png")));
        assert!(!is_image(&PathBuf::from("archive.cbz")));
    }

    #[test]
    fn recognises_zip_style_archives() {
        assert!(is_zip_archive(&PathBuf::from("volume-01.cbz")));
        assert!(is_archive(&PathBuf::from("volume-01.zip")));
    }

    #[test]
    fn video_extensions_are_always_animated() {
        assert!(is_animated(&PathBuf::from("trailer.mp4")));
        assert!(is_animated(&PathBuf::from("clip.webm")));
    }

    #[test]
    fn static_webp_without_an_anim_chunk_is_not_animated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.webp");
        // RIFF/WEBP/VP8X header with the animation flag bit cleared.
        let mut bytes = b"RIFF\x00\x00\x00\x00WEBPVP8X".to_vec();
        bytes.extend_from_slice(&[0u8; 9]);
        std::fs::write(&path, &bytes).unwrap();

        assert!(!is_animated(&path));
    }

    #[test]
    fn animated_webp_with_the_anim_flag_set_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sticker.webp");
        let mut bytes = b"RIFF\x00\x00\x00\x00WEBPVP8X".to_vec();
        bytes.extend_from_slice(&[0b0000_0010, 0, 0, 0, 0, 0, 0, 0, 0]);
        std::fs::write(&path, &bytes).unwrap();

        assert!(is_animated(&path));
    }
}
