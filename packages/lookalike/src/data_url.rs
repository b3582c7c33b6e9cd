//! `data:` URL encoding for image payloads.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};

use crate::error::{TransformError, TransformResult};

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            mime: "image/png".to_string(),
            bytes,
        }
    }

    /// Parse an image data URL. Only base64 payloads are supported, and an
    /// empty payload counts as no image.
    pub fn parse(url: &str) -> TransformResult<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| TransformError::validation("not a data URL"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| TransformError::validation("data URL has no payload"))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| TransformError::validation("data URL is not base64 encoded"))?;
        if !mime.starts_with("image/") {
            return Err(TransformError::validation(format!(
                "data URL is not an image: {}",
                mime
            )));
        }
        let bytes = BASE64_STANDARD
            .decode(payload.trim())
            .map_err(|e| TransformError::validation(format!("invalid base64 payload: {}", e)))?;
        if bytes.is_empty() {
            return Err(TransformError::MissingImage);
        }
        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }
}

impl std::fmt::Display for DataUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data:{};base64,{}", self.mime, BASE64_STANDARD.encode(&self.bytes))
    }
}
