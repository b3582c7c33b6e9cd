//! Generative image provider.
//!
//! The transform service only needs "prompt + images in, PNG out". The
//! [`ImageProvider`] trait captures that contract; [`GeminiProvider`] is the
//! production implementation talking to the Gemini `generateContent` REST API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};

/// Default model used for image generation.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Default REST base URL for the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Instruction sent ahead of the two images.
pub const MASTER_PROMPT: &str = "Transform the subject in the second image to look like they're impersonating the person in the first reference image.

Copy these features from the reference (first image):
- The glasses style
- The facial features (eyes, hairline, smile)
- The exact hand gesture shown in the reference image

If the second image is a simple object, drawing, logo, or non-human subject, get creative! Turn it into a character or scene that incorporates all the features above in a fun, imaginative way.

Make it look natural and fun, like a playful cosplay or impersonation.";

/// An image passed inline to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Text prompt followed by images, in order.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<InlineImage>,
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate an image. Returns the decoded PNG bytes.
    async fn generate(&self, request: GenerationRequest) -> TransformResult<Vec<u8>>;
}

// ============================================================================
// Gemini wire format
// ============================================================================

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataOut<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataOut<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<InlineDataIn>,
}

#[derive(Deserialize, Debug)]
struct InlineDataIn {
    data: String,
}

impl GenerateContentResponse {
    /// Base64 payload of the first non-empty inline image in the first candidate.
    pub(crate) fn first_image(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.trim())
            .find(|data| !data.is_empty())
    }
}

// ============================================================================
// Gemini client
// ============================================================================

/// REST client for Gemini image generation.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    async fn generate(&self, request: GenerationRequest) -> TransformResult<Vec<u8>> {
        let mut parts = Vec::with_capacity(request.images.len() + 1);
        parts.push(RequestPart::Text { text: &request.prompt });
        for image in &request.images {
            parts.push(RequestPart::Inline {
                inline_data: InlineDataOut {
                    mime_type: &image.mime,
                    data: BASE64_STANDARD.encode(&image.bytes),
                },
            });
        }
        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
        };

        log::info!("Calling {} with {} image(s)", self.model, request.images.len());
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let details: Option<serde_json::Value> = serde_json::from_str(&text).ok();
            let message = details
                .as_ref()
                .and_then(|d| d.pointer("/error/message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("provider returned {}", status));
            return Err(TransformError::Upstream {
                status: status.as_u16(),
                message,
                details,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| TransformError::transport(format!("malformed provider response: {}", e)))?;
        let payload = parsed.first_image().ok_or(TransformError::MissingImage)?;
        let bytes = BASE64_STANDARD
            .decode(payload)
            .map_err(|e| TransformError::transport(format!("provider image is not base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(TransformError::MissingImage);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_inline_image() {
        let json = r#"{
            "candidates": [{
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "AQID" } },
                    { "inlineData": { "mimeType": "image/png", "data": "BAUG" } }
                ]}
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.first_image(), Some("AQID"));
    }

    #[test]
    fn text_only_response_has_no_image() {
        let json = r#"{ "candidates": [{ "content": { "parts": [{ "text": "sorry" }] } }] }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.first_image(), None);

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.first_image(), None);
    }

    #[test]
    fn empty_inline_data_is_not_an_image() {
        let json = r#"{ "candidates": [{ "content": { "parts": [
            { "inlineData": { "mimeType": "image/png", "data": "" } }
        ] } }] }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.first_image(), None);

        let json = r#"{ "candidates": [{ "content": { "parts": [
            { "inlineData": { "mimeType": "image/png", "data": "" } },
            { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
        ] } }] }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.first_image(), Some("AQID"));
    }

    async fn stub_gemini(body: serde_json::Value) -> String {
        use axum::routing::post;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/v1beta/models/:model",
            post(move || {
                let body = body.clone();
                async move { axum::Json(body) }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "p".to_string(),
            images: vec![InlineImage {
                mime: "image/png".to_string(),
                bytes: vec![1],
            }],
        }
    }

    #[tokio::test]
    async fn empty_image_payload_is_missing_image() {
        let base = stub_gemini(serde_json::json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "" } }
            ] } }]
        }))
        .await;
        let provider = GeminiProvider::new("key").with_base_url(base);

        let err = provider.generate(request()).await.unwrap_err();
        assert!(matches!(err, TransformError::MissingImage));
        assert_eq!(err.user_message(), "Failed to transform image");
    }

    #[tokio::test]
    async fn inline_image_is_decoded() {
        let base = stub_gemini(serde_json::json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
            ] } }]
        }))
        .await;
        let provider = GeminiProvider::new("key").with_base_url(base);

        assert_eq!(provider.generate(request()).await.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn request_parts_serialize_in_gemini_shape() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text { text: "hi" },
                    RequestPart::Inline {
                        inline_data: InlineDataOut {
                            mime_type: "image/png",
                            data: "AQID".to_string(),
                        },
                    },
                ],
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(value["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn endpoint_includes_model() {
        let provider = GeminiProvider::new("key").with_base_url("http://localhost:9/").with_model("m");
        assert_eq!(provider.endpoint(), "http://localhost:9/v1beta/models/m:generateContent");
    }
}
