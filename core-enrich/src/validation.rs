//! Image validation ahead of detection.
//!
//! An asset is worth sending to the detector only if it exists, is at least
//! `min_bytes` long and decodes as an image. Truncated downloads usually fail
//! the size check; anything else that is not a picture fails decoding.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

/// Why an asset was rejected before detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidImage {
    Missing,
    TooSmall { bytes: u64, min_bytes: u64 },
    Unreadable(String),
    Undecodable(String),
}

impl fmt::Display for InvalidImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("file missing"),
            Self::TooSmall { bytes, min_bytes } => {
                write!(f, "{} bytes, below minimum of {}", bytes, min_bytes)
            }
            Self::Unreadable(e) => write!(f, "unreadable: {}", e),
            Self::Undecodable(e) => write!(f, "not a decodable image: {}", e),
        }
    }
}

/// Check that `path` holds a usable image.
pub async fn validate_image(path: &Path, min_bytes: u64) -> Result<(), InvalidImage> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(InvalidImage::Missing),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(InvalidImage::Missing),
        Err(e) => return Err(InvalidImage::Unreadable(e.to_string())),
    };

    if metadata.len() < min_bytes {
        return Err(InvalidImage::TooSmall {
            bytes: metadata.len(),
            min_bytes,
        });
    }

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| InvalidImage::Unreadable(e.to_string()))?;

    image::load_from_memory(&data)
        .map(|_| ())
        .map_err(|e| InvalidImage::Undecodable(e.to_string()))
}
