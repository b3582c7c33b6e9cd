//! Upload → transform → download state machine.
//!
//! ```text
//!  Empty ──stage──▶ Ready ──begin──▶ Processing ──ok──▶ Done
//!    ▲                ▲                  │
//!    │                └──────begin───── Error ◀──fail──┘
//!    └───────────── reset (from any other state) ─────────
//! ```
//!
//! The network call itself lives outside the machine: [`UploadWorkflow::begin_transform`]
//! hands out a [`TransformTicket`] and [`UploadWorkflow::complete`] applies the
//! outcome. A ticket issued before a reset is stale and its outcome is dropped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::client::{resolve_image, TransformClient};
use crate::data_url::DataUrl;
use crate::error::{TransformError, TransformResult};
use crate::upload::UploadedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// Nothing staged.
    Empty,
    /// Image staged, not sent yet.
    Ready,
    /// Request in flight.
    Processing,
    /// Result available.
    Done,
    /// Request failed; staged image kept for retry.
    Error,
}

/// Permission to run one transform request for the image it carries.
#[derive(Debug, Clone)]
pub struct TransformTicket {
    generation: u64,
    image: UploadedImage,
}

impl TransformTicket {
    pub fn image(&self) -> &UploadedImage {
        &self.image
    }

    /// Name the upload is sent under.
    pub fn file_name(&self) -> String {
        format!("upload.{}", self.image.mime().extension())
    }
}

#[derive(Debug, Default)]
pub struct UploadWorkflow {
    staged: Option<UploadedImage>,
    result: Option<DataUrl>,
    error: Option<String>,
    busy: bool,
    /// Bumped on reset so in-flight tickets go stale.
    generation: u64,
}

impl UploadWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkflowState {
        if self.staged.is_none() {
            WorkflowState::Empty
        } else if self.busy {
            WorkflowState::Processing
        } else if self.result.is_some() {
            WorkflowState::Done
        } else if self.error.is_some() {
            WorkflowState::Error
        } else {
            WorkflowState::Ready
        }
    }

    pub fn staged(&self) -> Option<&UploadedImage> {
        self.staged.as_ref()
    }

    pub fn result(&self) -> Option<&DataUrl> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Stage a validated image, replacing any previous upload and result.
    pub fn stage(&mut self, image: UploadedImage) -> TransformResult<()> {
        if self.busy {
            return Err(TransformError::validation("A transformation is already in progress"));
        }
        log::debug!("Staged {} ({} bytes)", image.mime(), image.size());
        self.staged = Some(image);
        self.result = None;
        self.error = None;
        Ok(())
    }

    /// Validate raw bytes and stage them. A rejected payload leaves the
    /// workflow untouched.
    pub fn stage_bytes(&mut self, bytes: Vec<u8>, mime: &str) -> TransformResult<()> {
        let image = UploadedImage::new(bytes, mime)?;
        self.stage(image)
    }

    /// Read a file (type from its extension) and stage it.
    pub async fn stage_file(&mut self, path: &Path) -> TransformResult<()> {
        let image = UploadedImage::read_file(path).await?;
        self.stage(image)
    }

    /// Move to `Processing` and hand out the request to run.
    ///
    /// Returns `None` (and changes nothing) while a request is already in
    /// flight, when nothing is staged, or when a result is already shown.
    pub fn begin_transform(&mut self) -> Option<TransformTicket> {
        if self.busy || self.result.is_some() {
            return None;
        }
        let image = self.staged.clone()?;
        self.busy = true;
        self.error = None;
        Some(TransformTicket {
            generation: self.generation,
            image,
        })
    }

    /// Apply the outcome of a ticket's request. The value must be a data URL;
    /// URL results go through [`Self::complete_resolved`] after fetching.
    ///
    /// Returns `false` when the ticket is stale and the outcome was dropped.
    pub fn complete(&mut self, ticket: TransformTicket, outcome: TransformResult<String>) -> bool {
        self.complete_resolved(ticket, outcome.and_then(|url| DataUrl::parse(&url)))
    }

    /// Apply an already decoded outcome.
    pub fn complete_resolved(&mut self, ticket: TransformTicket, outcome: TransformResult<DataUrl>) -> bool {
        if ticket.generation != self.generation || !self.busy {
            log::debug!("Dropping response for stale transform request");
            return false;
        }
        self.busy = false;

        match outcome {
            Ok(result) => {
                log::info!("Transform finished ({} bytes)", result.bytes.len());
                self.result = Some(result);
                self.error = None;
            }
            Err(err) => {
                log::warn!("Transform failed: {}", err);
                self.result = None;
                self.error = Some(err.user_message());
            }
        }
        true
    }

    /// Run one transform through `client`. No-op if [`Self::begin_transform`] refuses.
    pub async fn transform<C: TransformClient + ?Sized>(&mut self, client: &C) -> bool {
        let Some(ticket) = self.begin_transform() else {
            return false;
        };
        let outcome = match client.transform(ticket.image(), &ticket.file_name()).await {
            Ok(transformed) => resolve_image(client, &transformed).await,
            Err(err) => Err(err),
        };
        self.complete_resolved(ticket, outcome)
    }

    /// Drop everything and return to `Empty`.
    pub fn reset(&mut self) {
        self.staged = None;
        self.result = None;
        self.error = None;
        self.busy = false;
        self.generation += 1;
    }

    /// Write the result into `dir` under a timestamped name. State is unchanged.
    pub fn download_to(&self, dir: &Path, now: DateTime<Utc>) -> TransformResult<PathBuf> {
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| TransformError::validation("No transformed image to download"))?;
        let path = dir.join(download_file_name(now));
        std::fs::write(&path, &result.bytes)?;
        log::info!("Saved {}", path.display());
        Ok(path)
    }
}

/// `cz-style-<unix millis>.png`
pub fn download_file_name(now: DateTime<Utc>) -> String {
    format!("cz-style-{}.png", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedClient {
        answer: Mutex<Vec<TransformResult<String>>>,
        sent: Mutex<Vec<Vec<u8>>>,
        hosted: Vec<u8>,
    }

    impl FixedClient {
        fn new(answers: Vec<TransformResult<String>>) -> Self {
            Self {
                answer: Mutex::new(answers),
                sent: Mutex::new(Vec::new()),
                hosted: Vec::new(),
            }
        }

        fn hosting(mut self, bytes: Vec<u8>) -> Self {
            self.hosted = bytes;
            self
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransformClient for FixedClient {
        async fn transform(&self, image: &UploadedImage, _file_name: &str) -> TransformResult<String> {
            self.sent.lock().unwrap().push(image.bytes().to_vec());
            self.answer.lock().unwrap().remove(0)
        }

        async fn fetch_url(&self, _url: &str) -> TransformResult<Vec<u8>> {
            Ok(self.hosted.clone())
        }
    }

    fn png_url() -> String {
        DataUrl::png(vec![0x89, b'P', b'N', b'G']).to_string()
    }

    #[test]
    fn starts_empty() {
        let wf = UploadWorkflow::new();
        assert_eq!(wf.state(), WorkflowState::Empty);
        assert!(wf.staged().is_none());
    }

    #[test]
    fn rejected_upload_keeps_empty() {
        let mut wf = UploadWorkflow::new();
        assert!(wf.stage_bytes(vec![0; 10], "image/gif").is_err());
        assert!(wf
            .stage_bytes(vec![0; crate::upload::MAX_UPLOAD_BYTES + 1], "image/png")
            .is_err());
        assert_eq!(wf.state(), WorkflowState::Empty);
        assert!(wf.error_message().is_none());
    }

    #[test]
    fn begin_is_guarded_while_busy() {
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1, 2, 3], "image/jpeg").unwrap();
        let first = wf.begin_transform();
        assert!(first.is_some());
        assert_eq!(wf.state(), WorkflowState::Processing);
        assert!(wf.begin_transform().is_none());
        assert_eq!(wf.state(), WorkflowState::Processing);
    }

    #[test]
    fn cannot_stage_while_processing() {
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1], "image/png").unwrap();
        let _ticket = wf.begin_transform().unwrap();
        assert!(wf.stage_bytes(vec![2], "image/png").is_err());
        assert_eq!(wf.staged().unwrap().bytes(), &[1]);
    }

    #[test]
    fn stale_response_after_reset_is_dropped() {
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1], "image/png").unwrap();
        let ticket = wf.begin_transform().unwrap();
        wf.reset();
        wf.stage_bytes(vec![2], "image/png").unwrap();

        assert!(!wf.complete(ticket, Ok(png_url())));
        assert_eq!(wf.state(), WorkflowState::Ready);
        assert!(wf.result().is_none());
    }

    #[test]
    fn reset_clears_everything() {
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1], "image/png").unwrap();
        let ticket = wf.begin_transform().unwrap();
        wf.complete(ticket, Err(TransformError::upstream(500, "boom")));
        assert_eq!(wf.state(), WorkflowState::Error);

        wf.reset();
        assert_eq!(wf.state(), WorkflowState::Empty);
        assert!(wf.staged().is_none());
        assert!(wf.result().is_none());
        assert!(wf.error_message().is_none());
        assert!(!wf.is_busy());
    }

    #[test]
    fn undecodable_result_is_an_error() {
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1], "image/png").unwrap();
        let ticket = wf.begin_transform().unwrap();
        wf.complete(ticket, Ok("not a data url".to_string()));
        assert_eq!(wf.state(), WorkflowState::Error);
        assert!(wf.result().is_none());
    }

    #[tokio::test]
    async fn failure_keeps_staged_image_for_retry() {
        let client = FixedClient::new(vec![
            Err(TransformError::upstream(500, "model overloaded")),
            Ok(png_url()),
        ]);
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![7, 7, 7], "image/jpeg").unwrap();

        assert!(wf.transform(&client).await);
        assert_eq!(wf.state(), WorkflowState::Error);
        assert_eq!(wf.error_message(), Some("model overloaded"));
        assert_eq!(wf.staged().unwrap().bytes(), &[7, 7, 7]);

        assert!(wf.transform(&client).await);
        assert_eq!(wf.state(), WorkflowState::Done);
        assert_eq!(client.sent(), vec![vec![7, 7, 7], vec![7, 7, 7]]);
    }

    #[test]
    fn empty_data_url_is_an_error() {
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1], "image/png").unwrap();
        let ticket = wf.begin_transform().unwrap();
        wf.complete(ticket, Ok("data:image/png;base64,".to_string()));
        assert_eq!(wf.state(), WorkflowState::Error);
        assert_eq!(wf.error_message(), Some("Failed to transform image"));
        assert!(wf.result().is_none());
    }

    #[tokio::test]
    async fn url_result_is_fetched() {
        let client = FixedClient::new(vec![Ok("https://cdn.example/result.png".to_string())])
            .hosting(vec![0x89, b'P', b'N', b'G']);
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1], "image/png").unwrap();

        assert!(wf.transform(&client).await);
        assert_eq!(wf.state(), WorkflowState::Done);
        assert_eq!(wf.result().unwrap().bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn empty_url_download_is_an_error() {
        let client = FixedClient::new(vec![Ok("https://cdn.example/result.png".to_string())]);
        let mut wf = UploadWorkflow::new();
        wf.stage_bytes(vec![1], "image/png").unwrap();

        wf.transform(&client).await;
        assert_eq!(wf.state(), WorkflowState::Error);
        assert!(wf.result().is_none());
        assert!(wf.staged().is_some());
    }

    #[tokio::test]
    async fn nothing_staged_means_no_request() {
        let client = FixedClient::new(vec![]);
        let mut wf = UploadWorkflow::new();
        assert!(!wf.transform(&client).await);
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn stage_file_reads_by_extension() {
        let dir = std::env::temp_dir().join(format!("lookalike-stage-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("me.jpeg"), [4, 5, 6]).unwrap();
        std::fs::write(dir.join("me.bmp"), [4, 5, 6]).unwrap();

        let mut wf = UploadWorkflow::new();
        assert!(wf.stage_file(&dir.join("me.bmp")).await.is_err());
        assert_eq!(wf.state(), WorkflowState::Empty);

        wf.stage_file(&dir.join("me.jpeg")).await.unwrap();
        assert_eq!(wf.state(), WorkflowState::Ready);
        assert_eq!(wf.staged().unwrap().bytes(), &[4, 5, 6]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn download_name_uses_millis() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(download_file_name(now), "cz-style-1700000000123.png");
    }

    #[test]
    fn download_requires_result() {
        let wf = UploadWorkflow::new();
        assert!(wf.download_to(&std::env::temp_dir(), Utc::now()).is_err());
    }
}
