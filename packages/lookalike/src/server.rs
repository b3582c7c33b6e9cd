//! HTTP surface of the transform service.
//!
//! `POST /transform` accepts a multipart upload (field `image`), combines it
//! with the fixed reference image and asks the provider for a composite.
//! `OPTIONS /transform` answers CORS preflights. Both routes are mounted under
//! `/api/transform` too, which is where the web page and the batch tool post.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use crate::api::{ErrorResponse, TransformResponse, IMAGE_FIELD};
use crate::data_url::DataUrl;
use crate::error::{TransformError, TransformResult};
use crate::provider::{GenerationRequest, ImageProvider, InlineImage, MASTER_PROMPT};
use crate::upload::{format_file_size, ImageMime, UploadedImage, MAX_UPLOAD_BYTES};

/// Request body cap. Larger than the upload limit so oversized images reach
/// the size check and get a JSON answer.
const BODY_LIMIT: usize = MAX_UPLOAD_BYTES * 3;

/// Message returned when the provider credential is absent.
pub const MISSING_CREDENTIAL: &str = "API configuration missing. Please contact support.";

/// Server settings resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// The fixed image every upload is composited against.
    pub reference_path: PathBuf,
    pub prompt: String,
}

impl ServerConfig {
    pub fn new(bind: SocketAddr, reference_path: PathBuf) -> Self {
        Self {
            bind,
            reference_path,
            prompt: MASTER_PROMPT.to_string(),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no credential is configured; every transform then fails
    /// with a configuration error but the process keeps serving.
    provider: Option<Arc<dyn ImageProvider>>,
    reference_path: Arc<PathBuf>,
    prompt: Arc<str>,
}

impl AppState {
    pub fn new(config: &ServerConfig, provider: Option<Arc<dyn ImageProvider>>) -> Self {
        Self {
            provider,
            reference_path: Arc::new(config.reference_path.clone()),
            prompt: Arc::from(config.prompt.as_str()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transform", post(transform).options(preflight))
        .route("/api/transform", post(transform).options(preflight))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: ServerConfig, provider: Option<Arc<dyn ImageProvider>>) -> std::io::Result<()> {
    if provider.is_none() {
        log::warn!("GEMINI_API_KEY is not set; transform requests will fail with a configuration error");
    }
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(AppState::new(&config, provider))).await
}

async fn preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn transform(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    log::info!("Starting transformation request");
    let result = match multipart {
        Ok(multipart) => run_transform(&state, multipart).await,
        Err(rejection) => Err(TransformError::validation(rejection.body_text())),
    };

    match result {
        Ok(png) => {
            log::info!("Transformation succeeded ({})", format_file_size(png.len() as u64));
            let body = TransformResponse {
                transformed_image: DataUrl::png(png).to_string(),
                message: "Image transformed successfully".to_string(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn error_response(err: TransformError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        log::error!("Transformation failed: {}", err);
    } else {
        log::warn!("Rejected upload: {}", err);
    }
    let details = match &err {
        TransformError::Upstream { details, .. } => details.clone(),
        _ => None,
    };
    let body = ErrorResponse {
        error: err.user_message(),
        details,
    };
    (status, Json(body)).into_response()
}

async fn run_transform(state: &AppState, multipart: Multipart) -> TransformResult<Vec<u8>> {
    let image = read_image_field(multipart).await?;
    log::info!(
        "Image received: type={}, size={}",
        image.mime(),
        format_file_size(image.size() as u64)
    );

    let provider = state
        .provider
        .as_ref()
        .ok_or_else(|| TransformError::configuration(MISSING_CREDENTIAL))?;

    let reference = tokio::fs::read(state.reference_path.as_ref())
        .await
        .map_err(|e| {
            TransformError::ReferenceImage(format!("{}: {}", state.reference_path.display(), e))
        })?;
    log::info!("Reference image loaded ({} bytes)", reference.len());

    let request = GenerationRequest {
        prompt: state.prompt.to_string(),
        images: vec![
            InlineImage {
                mime: "image/png".to_string(),
                bytes: reference,
            },
            InlineImage {
                mime: image.mime().as_str().to_string(),
                bytes: image.bytes().to_vec(),
            },
        ],
    };
    let png = provider.generate(request).await?;
    if png.is_empty() {
        return Err(TransformError::MissingImage);
    }
    Ok(png)
}

/// Pull the `image` field out of the form and validate it.
async fn read_image_field(mut multipart: Multipart) -> TransformResult<UploadedImage> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(TransformError::validation("No image provided")),
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(TransformError::validation("File size exceeds 20MB limit"));
            }
            Err(e) => return Err(TransformError::validation(e.body_text())),
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // Only the declared part type counts; the file name is ignored.
        let mime = field
            .content_type()
            .and_then(ImageMime::from_mime)
            .ok_or_else(|| TransformError::validation("Invalid file type"))?;

        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                TransformError::validation("File size exceeds 20MB limit")
            } else {
                TransformError::validation(e.body_text())
            }
        })?;
        return UploadedImage::with_mime(bytes.to_vec(), mime);
    }
}
