use std::{io, path::PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use thiserror::Error;
use tokio::fs;
use tracing::info;

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("Only image files can be attached (got {0})")]
    NotAnImage(String),
    #[error("The file is not a JPEG, PNG, GIF, WebP or HEIC image")]
    Unsupported,
    #[error("Photo is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("The photo is empty")]
    Empty,
    #[error("Could not store the photo: {0}")]
    Io(#[from] io::Error),
}

/// Raster formats a photo may be stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Heic,
}

impl PhotoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "jpg",
            PhotoFormat::Png => "png",
            PhotoFormat::Gif => "gif",
            PhotoFormat::WebP => "webp",
            PhotoFormat::Heic => "heic",
        }
    }

    /// Detects the format from the file's leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => Some(PhotoFormat::Jpeg),
            Ok(ImageFormat::Png) => Some(PhotoFormat::Png),
            Ok(ImageFormat::Gif) => Some(PhotoFormat::Gif),
            Ok(ImageFormat::WebP) => Some(PhotoFormat::WebP),
            _ => is_heic(bytes).then_some(PhotoFormat::Heic),
        }
    }
}

// ISO base media file with an HEIF brand: `....ftypheic`.
fn is_heic(bytes: &[u8]) -> bool {
    const BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];

    bytes.len() >= 12
        && &bytes[4..8] == b"ftyp"
        && BRANDS.iter().any(|brand| &bytes[8..12] == *brand)
}

/// Accepts a single image upload of at most `limit` bytes. The declared type
/// must be `image/*` and the content must be one of the [`PhotoFormat`]s.
pub fn check(content_type: &str, bytes: &[u8], limit: usize) -> Result<PhotoFormat, PhotoError> {
    if !content_type.starts_with("image/") {
        return Err(PhotoError::NotAnImage(content_type.to_string()));
    }
    if bytes.is_empty() {
        return Err(PhotoError::Empty);
    }
    if bytes.len() > limit {
        return Err(PhotoError::TooLarge {
            size: bytes.len(),
            limit,
        });
    }

    PhotoFormat::sniff(bytes).ok_or(PhotoError::Unsupported)
}

#[async_trait]
pub trait PhotoStorage: Send + Sync {
    /// Stores the image and returns the URL it is served under.
    async fn store(&self, content_type: &str, bytes: &[u8]) -> Result<String, PhotoError>;
}

/// Writes photos into a directory under their content hash.
pub struct DirPhotoStorage {
    dir: PathBuf,
    url_prefix: String,
    limit: usize,
}

impl DirPhotoStorage {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &str, limit: usize) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            limit,
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl PhotoStorage for DirPhotoStorage {
    async fn store(&self, content_type: &str, bytes: &[u8]) -> Result<String, PhotoError> {
        let format = check(content_type, bytes, self.limit)?;

        let hash = blake3::hash(bytes).to_hex();
        let name = format!("{}.{}", &hash[..32], format.extension());
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(&name);
        if !fs::try_exists(&path).await? {
            fs::write(&path, bytes).await?;
            info!(file = %path.display(), size = bytes.len(), "stored photo");
        }

        Ok(format!("{}/{}", self.url_prefix, name))
    }
}
