pub mod error;

// Upload / transform
pub mod upload;
pub mod data_url;
pub mod api;
pub mod provider;
pub mod server;
pub mod client;
pub mod workflow;
pub mod batch;

// Background animation
pub mod noise;
pub mod pointer;
pub mod lighting;
pub mod camera;
pub mod background;
pub mod lifecycle;
pub mod gpu;

pub mod cli;
