//! Offline batch transformation of a directory of images.
//!
//! Every image in the input directory is sent through the public transform
//! endpoint one at a time, with a fixed pause between requests. Failures are
//! logged and collected; they never stop the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{resolve_image, HttpTransformClient, TransformClient};
use crate::error::{TransformError, TransformResult};
use crate::upload::{ImageMime, UploadedImage};

/// Default pause between two requests.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

/// Settings for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobSpec {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Pause between requests, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY.as_millis() as u64
}

impl BatchJobSpec {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            input_dir,
            output_dir,
            delay_ms: default_delay_ms(),
        }
    }

    pub async fn validate(&self) -> Result<(), String> {
        match tokio::fs::metadata(&self.input_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(format!("Input folder not found: {}", self.input_dir.display())),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    /// (input file name, output file name)
    pub successful: Vec<(String, String)>,
    pub failed: Vec<String>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

/// Image files in `dir`, sorted by name. Other files are ignored.
pub async fn collect_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if ImageMime::from_path(&path).is_none() {
            continue;
        }
        if tokio::fs::metadata(&path).await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `cz-<stem>.png`
pub fn output_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    format!("cz-{}.png", stem)
}

/// Run the batch against `client`.
pub async fn run_batch(spec: &BatchJobSpec, client: &HttpTransformClient) -> TransformResult<BatchSummary> {
    spec.validate().await.map_err(TransformError::validation)?;
    tokio::fs::create_dir_all(&spec.output_dir).await?;

    let files = collect_images(&spec.input_dir).await?;
    let mut summary = BatchSummary::default();
    if files.is_empty() {
        log::warn!("No image files found in {}", spec.input_dir.display());
        return Ok(summary);
    }

    log::info!(
        "Found {} images in {}, writing to {}",
        files.len(),
        spec.input_dir.display(),
        spec.output_dir.display()
    );

    for (i, path) in files.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        log::info!("[{}/{}] Processing {}", i + 1, files.len(), name);

        match transform_one(client, path, &name, &spec.output_dir).await {
            Ok(output) => {
                log::info!("Saved {}", output);
                summary.successful.push((name, output));
            }
            Err(err) => {
                log::error!("Error processing {}: {}", name, err);
                summary.failed.push(name);
            }
        }

        if i + 1 < files.len() && !spec.delay().is_zero() {
            log::debug!("Waiting {:?} before next image", spec.delay());
            tokio::time::sleep(spec.delay()).await;
        }
    }

    Ok(summary)
}

async fn transform_one(
    client: &HttpTransformClient,
    path: &Path,
    name: &str,
    output_dir: &Path,
) -> TransformResult<String> {
    let image = UploadedImage::read_file(path).await?;
    let transformed = client.transform(&image, name).await?;
    let result = resolve_image(client, &transformed).await?;

    let output = output_file_name(path);
    tokio::fs::write(output_dir.join(&output), result.bytes).await?;
    Ok(output)
}

/// Print the summary the way the batch tool reports it.
pub fn print_summary(summary: &BatchSummary, output_dir: &Path) {
    println!("{}", "=".repeat(60));
    println!("Batch transformation complete");
    println!("Successful: {}", summary.successful.len());
    println!("Failed: {}", summary.failed.len());
    if !summary.successful.is_empty() {
        println!("\nTransformed:");
        for (input, output) in &summary.successful {
            println!("   {} -> {}", input, output);
        }
    }
    if !summary.failed.is_empty() {
        println!("\nFailed to transform:");
        for input in &summary.failed {
            println!("   {}", input);
        }
    }
    println!("\nOutput location: {}", output_dir.display());
}
