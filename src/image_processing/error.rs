//! Error types for derivative generation

use thiserror::Error;

pub type ImageResult<T> = Result<T, ImageError>;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to decode source image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to encode webp: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported source format for {0}")]
    Unsupported(String),
}

impl ImageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
