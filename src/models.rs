//! Segmentation model registry and model resolution

use crate::cache::ModelCache;
use crate::config::{ModelVariant, RuntimeConfig};
use crate::download::ModelDownloader;
use crate::error::{BgRemovalError, Result};
use std::path::PathBuf;

/// Square side of the U²-Net input tensor
pub const U2NET_INPUT_SIZE: u32 = 320;

/// Input normalization of a model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    /// Target size `[height, width]` the image is resized to
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to [0,1]
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation divided by after subtracting the mean
    pub normalization_std: [f32; 3],
}

impl PreprocessingConfig {
    /// ImageNet normalization at the U²-Net input size
    pub const U2NET: PreprocessingConfig = PreprocessingConfig {
        target_size: [U2NET_INPUT_SIZE, U2NET_INPUT_SIZE],
        normalization_mean: [0.485, 0.456, 0.406],
        normalization_std: [0.229, 0.224, 0.225],
    };
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub variant: ModelVariant,
    /// Where the ONNX file is downloaded from
    pub url: &'static str,
    pub input_shape: (usize, usize, usize, usize), // NCHW
    pub output_shape: (usize, usize, usize, usize),
    pub preprocessing: PreprocessingConfig,
}

/// Registry entry for a model variant
#[must_use]
pub fn model_info(variant: ModelVariant) -> ModelInfo {
    let url = match variant {
        ModelVariant::U2Net => "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx",
        ModelVariant::U2NetHumanSeg => "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net_human_seg.onnx",
        ModelVariant::U2NetP => "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2netp.onnx",
    };
    let side = U2NET_INPUT_SIZE as usize;

    ModelInfo {
        variant,
        url,
        input_shape: (1, 3, side, side),
        output_shape: (1, 1, side, side),
        preprocessing: PreprocessingConfig::U2NET,
    }
}

/// Resolves model variants to model bytes, downloading on first use
#[derive(Debug)]
pub struct ModelManager {
    cache: ModelCache,
    offline: bool,
    show_progress: bool,
}

impl ModelManager {
    #[must_use]
    pub fn new(cache: ModelCache, offline: bool, show_progress: bool) -> Self {
        Self {
            cache,
            offline,
            show_progress,
        }
    }

    /// Create a manager for the cache directory and download policy of `config`
    ///
    /// # Errors
    /// - Cache directory cannot be determined or created
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let cache = ModelCache::from_override(config.model_dir.as_deref())?;
        Ok(Self::new(
            cache,
            config.offline,
            config.show_download_progress,
        ))
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Make sure the model file for `variant` is present and return its path
    ///
    /// # Errors
    /// - Model missing while offline
    /// - Download failures
    pub async fn ensure_model(&self, variant: ModelVariant) -> Result<PathBuf> {
        if self.cache.is_model_cached(variant) {
            return Ok(self.cache.model_path(variant));
        }

        if self.offline {
            return Err(BgRemovalError::model(format!(
                "Model '{}' is not cached at {} and downloads are disabled",
                variant,
                self.cache.model_path(variant).display()
            )));
        }

        let downloader = ModelDownloader::new(self.cache.clone())?;
        let cached = downloader
            .download_model(&model_info(variant), self.show_progress)
            .await?;
        Ok(cached.path)
    }

    /// Load the ONNX bytes of `variant`, fetching the model if needed
    ///
    /// # Errors
    /// - Any [`ModelManager::ensure_model`] failure
    /// - Model file unreadable
    pub async fn load_model(&self, variant: ModelVariant) -> Result<Vec<u8>> {
        let path = self.ensure_model(variant).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("read model file", &path, &e))?;

        log::debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }
}
