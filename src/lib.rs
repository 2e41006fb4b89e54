#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # remove-bg
//!
//! Background removal for single images: a U²-Net segmentation model run
//! through ONNX Runtime or Tract, refined by closed-form alpha matting, and a
//! small command-line shell around it.
//!
//! ## Features
//!
//! - **Segmentation models**: `u2net`, `u2net_human_seg`, `u2netp`, downloaded
//!   on first use and cached under `$U2NET_HOME` or the user cache directory
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Alpha matting**: trimap erosion, matting Laplacian solve and
//!   Blur-Fusion foreground estimation for soft, color-clean edges
//! - **Format Support**: JPEG, PNG, WebP, BMP, TIFF input; PNG output
//! - **CLI Integration**: the `remove-bg` binary (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use remove_bg::{remove_background_from_bytes, RuntimeConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let input = tokio::fs::read("photo.jpg").await?;
//! let config = RuntimeConfig::default();
//! let png = remove_background_from_bytes(&input, &config).await?;
//! tokio::fs::write("photo-cutout.png", png).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! - **Library Usage**: [`BackgroundRemovalProcessor`] implements
//!   [`BackgroundRemover`]; [`shell`] drives any implementation of it
//! - **CLI Usage**: enable the `cli` feature for the binary, download progress
//!   bars and the tracing subscriber
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface and progress reporting
//! - `webp-support` (default): WebP image format support

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod matting;
pub mod models;
pub mod processor;
pub mod remover;
pub mod shell;
pub mod tracing_config;
pub mod utils;

// Public API exports
pub use backends::*;
pub use cache::{CachedModelInfo, ModelCache, ModelManifest};
pub use config::{
    BackendType, ExecutionProvider, ModelVariant, RemovalParameters, RuntimeConfig,
    RuntimeConfigBuilder,
};
pub use download::ModelDownloader;
pub use error::{BgRemovalError, RemoveError, Result};
pub use inference::{BackendRegistry, InferenceBackend};
pub use models::{model_info, ModelInfo, ModelManager};
pub use processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory};
pub use remover::BackgroundRemover;
pub use shell::{remove_background_from_file, resolve_invocation};
pub use tracing_config::{TracingConfig, TracingFormat};
pub use utils::{ExecutionProviderManager, ImagePreprocessor};

/// Remove the background from encoded image bytes and return a PNG
///
/// Builds a one-off [`BackgroundRemovalProcessor`] for `config` and runs it
/// with [`RemovalParameters::FIXED`]. Keep a processor around instead when
/// handling several images so the model is loaded once.
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RuntimeConfig,
) -> Result<Vec<u8>> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor
        .remove(image_bytes, RemovalParameters::FIXED)
        .await
}
