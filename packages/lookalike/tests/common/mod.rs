//! Shared fixtures: a scripted image provider and a real server on an ephemeral port.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lookalike::error::{TransformError, TransformResult};
use lookalike::provider::{GenerationRequest, ImageProvider};
use lookalike::server::{router, AppState, ServerConfig};

/// What the scripted provider answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Png(Vec<u8>),
    Missing,
    Upstream {
        status: u16,
        message: String,
        details: serde_json::Value,
    },
}

/// Answers with `replies` in order; the last reply repeats.
pub struct MockProvider {
    replies: Mutex<Vec<Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockProvider {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn png(bytes: Vec<u8>) -> Arc<Self> {
        Self::new(vec![Reply::Png(bytes)])
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    async fn generate(&self, request: GenerationRequest) -> TransformResult<Vec<u8>> {
        self.requests.lock().unwrap().push(request);
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            }
        };
        match reply {
            Reply::Png(bytes) => Ok(bytes),
            Reply::Missing => Err(TransformError::MissingImage),
            Reply::Upstream { status, message, details } => Err(TransformError::Upstream {
                status,
                message,
                details: Some(details),
            }),
        }
    }
}

/// Fresh, empty scratch directory unique to `name` and this process.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lookalike-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write a reference image into `dir` and return its path.
pub fn write_reference(dir: &Path) -> PathBuf {
    let path = dir.join("reference.png");
    std::fs::write(&path, reference_bytes()).unwrap();
    path
}

pub fn reference_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3]
}

/// Serve the real router on 127.0.0.1 with an OS-assigned port.
pub async fn spawn_server(provider: Option<Arc<dyn ImageProvider>>, reference: PathBuf) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::new(addr, reference);
    let app = router(AppState::new(&config, provider));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn endpoint(addr: SocketAddr) -> String {
    format!("http://{}/api/transform", addr)
}

pub fn shared(provider: &Arc<MockProvider>) -> Option<Arc<dyn ImageProvider>> {
    Some(provider.clone())
}
