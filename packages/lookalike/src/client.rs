//! Client side of the transform endpoint.

use std::time::Duration;

use async_trait::async_trait;

use crate::api::{ErrorResponse, TransformResponse, IMAGE_FIELD};
use crate::data_url::DataUrl;
use crate::error::{TransformError, TransformResult};
use crate::upload::UploadedImage;

/// Default endpoint used by the batch tool.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/transform";

/// Something that can turn a staged image into a transformed one.
///
/// `transform` returns the `transformedImage` field as sent by the endpoint:
/// a PNG data URL, or an http URL the result can be fetched from.
#[async_trait]
pub trait TransformClient {
    async fn transform(&self, image: &UploadedImage, file_name: &str) -> TransformResult<String>;

    /// Download a result that was returned as a URL.
    async fn fetch_url(&self, url: &str) -> TransformResult<Vec<u8>>;
}

/// Turn a `transformedImage` value into image bytes, fetching URLs through `client`.
pub async fn resolve_image<C: TransformClient + ?Sized>(client: &C, transformed: &str) -> TransformResult<DataUrl> {
    if transformed.starts_with("data:") {
        return DataUrl::parse(transformed);
    }
    if !(transformed.starts_with("http://") || transformed.starts_with("https://")) {
        return Err(TransformError::MissingImage);
    }
    log::debug!("Fetching result from {}", transformed);
    let bytes = client.fetch_url(transformed).await?;
    if bytes.is_empty() {
        return Err(TransformError::MissingImage);
    }
    Ok(DataUrl::png(bytes))
}

/// Posts uploads to a transform endpoint as multipart form data.
#[derive(Debug, Clone)]
pub struct HttpTransformClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTransformClient {
    /// `timeout` bounds the whole request; `None` waits indefinitely.
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> TransformResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TransformClient for HttpTransformClient {
    async fn transform(&self, image: &UploadedImage, file_name: &str) -> TransformResult<String> {
        let part = reqwest::multipart::Part::bytes(image.bytes().to_vec())
            .file_name(file_name.to_string())
            .mime_str(image.mime().as_str())?;
        let form = reqwest::multipart::Form::new().part(IMAGE_FIELD, part);

        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let (message, details) = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(body) => (body.error, body.details),
                Err(_) => (format!("API error ({}): {}", status.as_u16(), text), None),
            };
            return Err(TransformError::Upstream {
                status: status.as_u16(),
                message,
                details,
            });
        }

        let body: TransformResponse = serde_json::from_str(&text)
            .map_err(|e| TransformError::transport(format!("malformed response: {}", e)))?;
        if body.transformed_image.is_empty() {
            return Err(TransformError::MissingImage);
        }
        Ok(body.transformed_image)
    }

    async fn fetch_url(&self, url: &str) -> TransformResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransformError::upstream(
                status.as_u16(),
                format!("download failed ({})", status),
            ));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
