//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Segmentation model variants of the U²-Net family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelVariant {
    /// General-purpose salient object segmentation
    #[serde(rename = "u2net")]
    U2Net,
    /// Variant trained for human segmentation
    #[serde(rename = "u2net_human_seg")]
    U2NetHumanSeg,
    /// Lightweight variant
    #[serde(rename = "u2netp")]
    U2NetP,
}

impl ModelVariant {
    /// Every known variant
    pub const ALL: [ModelVariant; 3] = [Self::U2Net, Self::U2NetHumanSeg, Self::U2NetP];

    /// Stable name used for cache file names and logging
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::U2Net => "u2net",
            Self::U2NetHumanSeg => "u2net_human_seg",
            Self::U2NetP => "u2netp",
        }
    }

    /// Look a variant up by its stable name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|variant| variant.name() == name)
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters handed to the removal capability on every call
///
/// The command-line shell only ever uses [`RemovalParameters::FIXED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalParameters {
    /// Segmentation model to run
    pub model: ModelVariant,
    /// Refine the mask boundary with alpha matting
    pub alpha_matting: bool,
    /// Mask values above this are certain foreground
    pub foreground_threshold: u8,
    /// Mask values below this are certain background
    pub background_threshold: u8,
    /// Side of the square structuring element used to erode the trimap regions
    pub erode_structure_size: u32,
    /// Longest side the matting step operates at
    pub base_size: u32,
}

impl RemovalParameters {
    /// The compiled-in parameter set used by the `remove-bg` shell
    pub const FIXED: RemovalParameters = RemovalParameters {
        model: ModelVariant::U2Net,
        alpha_matting: true,
        foreground_threshold: 240,
        background_threshold: 10,
        erode_structure_size: 10,
        base_size: 1000,
    };

    /// Check that the thresholds and sizes are usable
    ///
    /// # Errors
    /// - Background threshold not below the foreground threshold
    /// - Zero matting base size
    pub fn validate(&self) -> Result<()> {
        if self.background_threshold >= self.foreground_threshold {
            return Err(BgRemovalError::config_value_error(
                "background threshold",
                u32::from(self.background_threshold),
                "below the foreground threshold",
                Some(10),
            ));
        }

        if self.base_size == 0 {
            return Err(BgRemovalError::config_value_error(
                "matting base size",
                self.base_size,
                "1 or more",
                Some(1000),
            ));
        }

        Ok(())
    }
}

impl Default for RemovalParameters {
    fn default() -> Self {
        Self::FIXED
    }
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used to run the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Runtime settings of the removal capability
///
/// None of these influence the removal parameters; they only choose how and
/// where the model runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Model cache directory override (None = `U2NET_HOME` or platform cache)
    pub model_dir: Option<PathBuf>,

    /// Never download missing models
    pub offline: bool,

    /// Show a progress bar while downloading models
    pub show_download_progress: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            model_dir: None,
            offline: false,
            show_download_progress: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use remove_bg::config::{BackendType, ExecutionProvider, RuntimeConfig};
    ///
    /// let config = RuntimeConfig::builder()
    ///     .backend_type(BackendType::Onnx)
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .offline(true)
    ///     .build()
    ///     .unwrap();
    /// assert!(config.offline);
    /// ```
    #[must_use]
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Validate that backend and provider fit together
    ///
    /// # Errors
    /// - A GPU execution provider requested for the Tract backend
    pub fn validate(&self) -> Result<()> {
        if self.backend_type == BackendType::Tract
            && !matches!(
                self.execution_provider,
                ExecutionProvider::Cpu | ExecutionProvider::Auto
            )
        {
            return Err(BgRemovalError::invalid_config(format!(
                "Tract backend only supports CPU execution, got '{}'",
                self.execution_provider
            )));
        }

        Ok(())
    }
}

/// Builder for `RuntimeConfig`
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both thread counts; inter-op threads get half, at least one
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        if threads == 0 {
            self.config.intra_threads = 0;
            self.config.inter_threads = 0;
        } else {
            self.config.intra_threads = threads;
            self.config.inter_threads = (threads / 2).max(1);
        }
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn offline(mut self, offline: bool) -> Self {
        self.config.offline = offline;
        self
    }

    #[must_use]
    pub fn show_download_progress(mut self, show: bool) -> Self {
        self.config.show_download_progress = show;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Backend and execution provider do not fit together
    pub fn build(self) -> Result<RuntimeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_parameters_literal_values() {
        let params = RemovalParameters::FIXED;
        assert_eq!(params.model, ModelVariant::U2Net);
        assert!(params.alpha_matting);
        assert_eq!(params.foreground_threshold, 240);
        assert_eq!(params.background_threshold, 10);
        assert_eq!(params.erode_structure_size, 10);
        assert_eq!(params.base_size, 1000);
        assert_eq!(RemovalParameters::default(), params);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parameter_validation() {
        let mut params = RemovalParameters::FIXED;
        params.background_threshold = 240;
        assert!(params.validate().is_err());

        let mut params = RemovalParameters::FIXED;
        params.base_size = 0;
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("matting base size"));
    }

    #[test]
    fn test_model_variant_names_round_trip() {
        for variant in ModelVariant::ALL {
            assert_eq!(ModelVariant::from_name(variant.name()), Some(variant));
        }
        assert_eq!(ModelVariant::from_name("isnet"), None);
        assert_eq!(
            serde_json::to_string(&ModelVariant::U2NetHumanSeg).unwrap(),
            "\"u2net_human_seg\""
        );
    }

    #[test]
    fn test_runtime_config_builder() {
        let config = RuntimeConfig::builder()
            .backend_type(BackendType::Tract)
            .execution_provider(ExecutionProvider::Cpu)
            .num_threads(8)
            .model_dir("/tmp/models")
            .build()
            .unwrap();

        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 4);
        assert_eq!(config.model_dir, Some(PathBuf::from("/tmp/models")));
        assert!(!config.offline);
    }

    #[test]
    fn test_tract_rejects_gpu_provider() {
        let result = RuntimeConfig::builder()
            .backend_type(BackendType::Tract)
            .execution_provider(ExecutionProvider::Cuda)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_thread_auto_detection() {
        let config = RuntimeConfig::builder().num_threads(0).build().unwrap();
        assert_eq!(config.intra_threads, 0);
        assert_eq!(config.inter_threads, 0);
    }
}
