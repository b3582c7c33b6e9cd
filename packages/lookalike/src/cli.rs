use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::background::{BackgroundConfig, BackgroundScene};
use crate::batch::{self, BatchJobSpec};
use crate::client::{HttpTransformClient, DEFAULT_ENDPOINT};
use crate::gpu::renderer::BlobRenderer;
use crate::lifecycle::{BackgroundHost, ManualScheduler};
use crate::provider::{GeminiProvider, ImageProvider, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::server::{self, ServerConfig};
use crate::upload::format_file_size;
use crate::workflow::{UploadWorkflow, WorkflowState};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the transform endpoint
    Serve {
        /// Address to listen on
        #[arg(long, env = "LOOKALIKE_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Reference image every upload is styled after
        #[arg(long, env = "LOOKALIKE_REFERENCE", default_value = "public/reference.png")]
        reference: PathBuf,

        /// Image generation model
        #[arg(long, env = "LOOKALIKE_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        /// Provider API base URL
        #[arg(long, env = "LOOKALIKE_PROVIDER_URL", default_value = DEFAULT_BASE_URL)]
        provider_url: String,
    },

    /// Transform a single image through the endpoint and download the result
    Transform {
        /// Image to upload
        #[arg(long)]
        input: PathBuf,

        /// Directory the result is saved into
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Transform endpoint
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Request timeout in seconds (waits indefinitely if omitted)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Transform every image in a directory
    Batch {
        /// Input directory
        #[arg(long)]
        input: PathBuf,

        /// Output directory
        #[arg(long, default_value = "public/placeholder-images")]
        out: PathBuf,

        /// Transform endpoint
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Pause between requests in milliseconds
        #[arg(long, default_value_t = 2000)]
        delay_ms: u64,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },

    /// Render background frames to disk
    Render {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Number of frames
        #[arg(long, default_value_t = 120)]
        frames: u32,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Seed for noise and blob placement
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Pointer height (0 = top, 1 = bottom) the animation eases toward
        #[arg(long)]
        pointer_y: Option<f32>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, reference, model, provider_url } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(bind, reference, model, provider_url))?;
        }
        Commands::Transform { input, out, endpoint, timeout_secs } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(transform_single(input, out, endpoint, timeout_secs.map(Duration::from_secs)))?;
        }
        Commands::Batch { input, out, endpoint, delay_ms, timeout_secs } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_batch(input, out, endpoint, delay_ms, timeout_secs))?;
        }
        Commands::Render { out, frames, fps, width, height, seed, pointer_y } => {
            pollster::block_on(render_offline(out, frames, fps, width, height, seed, pointer_y))?;
        }
    }
    Ok(())
}

async fn serve(bind: SocketAddr, reference: PathBuf, model: String, provider_url: String) -> Result<()> {
    let provider: Option<Arc<dyn ImageProvider>> = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Some(Arc::new(
            GeminiProvider::new(key).with_model(model).with_base_url(provider_url),
        )),
        _ => None,
    };

    if !reference.is_file() {
        log::warn!("Reference image {} not found", reference.display());
    }

    let config = ServerConfig::new(bind, reference);
    server::serve(config, provider)
        .await
        .with_context(|| format!("Server on {} failed", bind))
}

async fn transform_single(input: PathBuf, out: PathBuf, endpoint: String, timeout: Option<Duration>) -> Result<()> {
    let client = HttpTransformClient::new(endpoint, timeout)?;
    let mut workflow = UploadWorkflow::new();
    workflow.stage_file(&input).await?;
    let size = workflow.staged().map(|s| s.size()).unwrap_or_default();
    println!("Transforming {} ({})...", input.display(), format_file_size(size as u64));
    workflow.transform(&client).await;

    match workflow.state() {
        WorkflowState::Done => {
            tokio::fs::create_dir_all(&out).await?;
            let path = workflow.download_to(&out, chrono::Utc::now())?;
            let size = workflow.result().map(|r| r.bytes.len()).unwrap_or_default();
            println!("Saved {} ({})", path.display(), format_file_size(size as u64));
            Ok(())
        }
        _ => {
            let message = workflow.error_message().unwrap_or("Failed to transform image");
            anyhow::bail!("{}", message)
        }
    }
}

async fn run_batch(input: PathBuf, out: PathBuf, endpoint: String, delay_ms: u64, timeout_secs: u64) -> Result<()> {
    let spec = BatchJobSpec {
        input_dir: input,
        output_dir: out,
        delay_ms,
    };
    let client = HttpTransformClient::new(endpoint, Some(Duration::from_secs(timeout_secs)))?;

    println!("Starting batch transformation via {}", client.endpoint());
    let summary = batch::run_batch(&spec, &client).await?;
    batch::print_summary(&summary, &spec.output_dir);
    Ok(())
}

async fn render_offline(
    out_dir: PathBuf,
    frames: u32,
    fps: f32,
    width: u32,
    height: u32,
    seed: u64,
    pointer_y: Option<f32>,
) -> Result<()> {
    if fps <= 0.0 {
        anyhow::bail!("--fps must be positive");
    }
    std::fs::create_dir_all(&out_dir)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let scene = BackgroundScene::new(BackgroundConfig::default(), &mut rng);
    let renderer = BlobRenderer::headless(width, height, &scene).await?;
    let (width, height) = renderer.size();

    let mut host = BackgroundHost::mount(ManualScheduler::new(), renderer, scene, (width, height));
    if let Some(y) = pointer_y {
        let pointer_x = host.pointer().target().x * width as f32;
        host.on_pointer_move(pointer_x, y.clamp(0.0, 1.0) * height as f32);
    }

    println!("Rendering {} frames to {:?}...", frames, out_dir);

    let frame_ms = 1000.0 / fps as f64;
    for i in 0..frames {
        host.on_frame(i as f64 * frame_ms, Instant::now());

        let pixels = host
            .surface_mut()
            .ok_or_else(|| anyhow::anyhow!("Renderer released before frame {}", i))?
            .read_pixels()?;

        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        image::save_buffer(&frame_path, &pixels, width, height, image::ColorType::Rgba8)?;

        if i % 10 == 0 {
            log::info!("Rendered frame {}/{}", i + 1, frames);
        }
    }

    host.unmount();
    println!("Done.");
    Ok(())
}
