//! JSON bodies exchanged with the transform endpoint.

use serde::{Deserialize, Serialize};

/// Multipart field carrying the uploaded image.
pub const IMAGE_FIELD: &str = "image";

/// Body of a successful `POST /transform`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    /// `data:image/png;base64,...`, or from other deployments an http URL
    /// that clients fetch the PNG from.
    pub transformed_image: String,
    pub message: String,
}

/// Body of any non-200 answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
