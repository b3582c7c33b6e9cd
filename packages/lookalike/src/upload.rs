//! Uploaded image payloads and their validation.

use std::path::Path;

use crate::error::{TransformError, TransformResult};

/// Largest accepted upload (the provider's inline data limit).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Image types accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Webp,
}

impl ImageMime {
    /// Parse a MIME type string. `image/jpg` is accepted as an alias.
    pub fn from_mime(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Infer the type from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl std::fmt::Display for ImageMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated image held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    mime: ImageMime,
}

impl UploadedImage {
    /// Validate and wrap an image payload.
    pub fn new(bytes: Vec<u8>, mime: &str) -> TransformResult<Self> {
        let mime = ImageMime::from_mime(mime)
            .ok_or_else(|| TransformError::validation("Invalid file type"))?;
        Self::with_mime(bytes, mime)
    }

    pub fn with_mime(bytes: Vec<u8>, mime: ImageMime) -> TransformResult<Self> {
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(TransformError::validation("File size exceeds 20MB limit"));
        }
        Ok(Self { bytes, mime })
    }

    /// Read an image from disk, inferring its type from the extension.
    pub async fn read_file(path: &Path) -> TransformResult<Self> {
        let mime = file_mime(path)?;
        // Check the size before pulling the whole file into memory.
        check_file_len(tokio::fs::metadata(path).await?.len())?;
        Self::with_mime(tokio::fs::read(path).await?, mime)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

fn file_mime(path: &Path) -> TransformResult<ImageMime> {
    ImageMime::from_path(path).ok_or_else(|| TransformError::validation("Invalid file type"))
}

fn check_file_len(len: u64) -> TransformResult<()> {
    if len > MAX_UPLOAD_BYTES as u64 {
        return Err(TransformError::validation("File size exceeds 20MB limit"));
    }
    Ok(())
}

/// Human readable byte count, base 1024, rounded to two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut i = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && i < UNITS.len() - 1 {
        scaled /= 1024.0;
        i += 1;
    }
    let value = (scaled * 100.0).round() / 100.0;
    format!("{} {}", value, UNITS[i])
}
