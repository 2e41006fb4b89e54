//! Background removal processor
//!
//! [`BackgroundRemovalProcessor`] owns the model manager and one initialized
//! inference backend per model variant, and runs the full pipeline: decode,
//! segment, matte, encode.

use crate::{
    config::{BackendType, ModelVariant, RemovalParameters, RuntimeConfig},
    error::{BgRemovalError, Result},
    inference::{BackendRegistry, InferenceBackend},
    matting::{alpha_matting_cutout, naive_cutout, MattingParams},
    models::{model_info, ModelManager},
    remover::BackgroundRemover,
    utils::ImagePreprocessor,
};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use instant::Instant;
use log::{debug, info};
use std::io::Cursor;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Level};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the specified type
    ///
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled by crate features
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new())),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(BgRemovalError::invalid_config(format!(
                "Backend '{other}' is not available in this build"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// The concrete background removal capability
pub struct BackgroundRemovalProcessor {
    config: RuntimeConfig,
    backend_factory: Box<dyn BackendFactory>,
    model_manager: ModelManager,
    backends: BackendRegistry,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("model_manager", &self.model_manager)
            .field("backends", &self.backends)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor using the feature-enabled backends
    ///
    /// No model is loaded until the first image is processed.
    ///
    /// # Errors
    /// - Invalid runtime configuration
    /// - Model cache directory cannot be created
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid runtime configuration
    /// - Model cache directory cannot be created
    pub fn with_factory(
        config: RuntimeConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let model_manager = ModelManager::from_config(&config)?;

        Ok(Self {
            config,
            backend_factory,
            model_manager,
            backends: BackendRegistry::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn model_manager(&self) -> &ModelManager {
        &self.model_manager
    }

    /// Load and initialize the backend for `variant` unless already done
    ///
    /// # Errors
    /// - Model unavailable
    /// - Backend creation or initialization failures
    pub async fn prepare(&mut self, variant: ModelVariant) -> Result<()> {
        if self.backends.contains(variant) {
            return Ok(());
        }

        info!("Initializing {} backend for model {}", self.config.backend_type, variant);
        let model_bytes = self.model_manager.load_model(variant).await?;

        let mut backend = self.backend_factory.create_backend(self.config.backend_type)?;
        let load_time = backend.initialize(&model_bytes, &self.config)?;
        if let Some(load_time) = load_time {
            debug!("Model {} loaded in {:.2}s", variant, load_time.as_secs_f64());
        }

        self.backends.register(variant, backend);
        Ok(())
    }

    /// Run the segmentation model on `image` and return a mask at its size
    ///
    /// # Errors
    /// - Backend not prepared
    /// - Preprocessing or inference failures
    pub fn segment(&mut self, image: &RgbImage, variant: ModelVariant) -> Result<image::GrayImage> {
        let info = model_info(variant);

        let input_tensor = {
            let _span = span!(
                Level::DEBUG,
                "preprocessing",
                width = image.width(),
                height = image.height()
            )
            .entered();
            ImagePreprocessor::preprocess_for_inference(image, &info.preprocessing)?
        };

        let output_tensor = {
            let _span = span!(Level::INFO, "inference", model = %variant).entered();
            let backend = self.backends.get(variant).ok_or_else(|| {
                BgRemovalError::internal(format!("Backend for {variant} was not initialized"))
            })?;
            backend.infer(&input_tensor)?
        };

        ImagePreprocessor::mask_from_output(&output_tensor, image.width(), image.height())
    }

    /// Decode, segment, cut out and encode one image
    ///
    /// # Errors
    /// - Invalid parameters
    /// - Decode, model, inference, matting or encode failures
    #[instrument(skip(self, data), fields(bytes = data.len(), model = %params.model))]
    pub async fn process_bytes(&mut self, data: &[u8], params: RemovalParameters) -> Result<Vec<u8>> {
        params.validate()?;
        let total_start = Instant::now();

        let image = image::load_from_memory(data)?.to_rgb8();
        trace_debug!(width = image.width(), height = image.height(), "Decoded input image");

        self.prepare(params.model).await?;
        let mask = self.segment(&image, params.model)?;

        let cutout = {
            let _span = span!(Level::DEBUG, "cutout", alpha_matting = params.alpha_matting).entered();
            if params.alpha_matting {
                alpha_matting_cutout(&image, &mask, &MattingParams::from(&params))?
            } else {
                naive_cutout(&image, &mask)?
            }
        };

        let encoded = encode_png(cutout)?;
        trace_info!(
            elapsed_ms = total_start.elapsed().as_millis() as u64,
            output_bytes = encoded.len(),
            "Background removed"
        );
        Ok(encoded)
    }
}

#[async_trait]
impl BackgroundRemover for BackgroundRemovalProcessor {
    async fn remove(&mut self, data: &[u8], params: RemovalParameters) -> Result<Vec<u8>> {
        self.process_bytes(data, params).await
    }
}

fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackendFactory;
    use crate::cache::ModelManifest;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn cached_model_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let variant = ModelVariant::U2Net;
        let cache = crate::cache::ModelCache::with_dir(temp_dir.path()).unwrap();
        std::fs::write(cache.model_path(variant), b"mock-onnx").unwrap();
        cache
            .write_manifest(&ModelManifest {
                variant,
                url: model_info(variant).url.to_string(),
                sha256: "00".repeat(32),
                size_bytes: 9,
                downloaded_at: chrono::Utc::now(),
            })
            .unwrap();
        temp_dir
    }

    fn offline_config(dir: &TempDir) -> RuntimeConfig {
        RuntimeConfig::builder()
            .model_dir(dir.path())
            .offline(true)
            .build()
            .unwrap()
    }

    fn png_input(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 3) as u8, (y * 3) as u8, 128])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_output_is_png_with_alpha_at_input_size() {
        let dir = cached_model_dir();
        let factory = MockBackendFactory::new();
        let mut processor =
            BackgroundRemovalProcessor::with_factory(offline_config(&dir), Box::new(factory))
                .unwrap();

        let output = processor
            .remove(&png_input(80, 60), RemovalParameters::FIXED)
            .await
            .unwrap();

        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (80, 60));
        assert!(decoded.color().has_alpha());
    }

    #[tokio::test]
    async fn test_processing_is_deterministic() {
        let dir = cached_model_dir();
        let mut processor = BackgroundRemovalProcessor::with_factory(
            offline_config(&dir),
            Box::new(MockBackendFactory::new()),
        )
        .unwrap();

        let input = png_input(64, 64);
        let first = processor.remove(&input, RemovalParameters::FIXED).await.unwrap();
        let second = processor.remove(&input, RemovalParameters::FIXED).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_backend_created_once_per_variant() {
        let dir = cached_model_dir();
        let factory = MockBackendFactory::new();
        let mut processor =
            BackgroundRemovalProcessor::with_factory(offline_config(&dir), Box::new(factory.clone()))
                .unwrap();

        let input = png_input(32, 32);
        processor.remove(&input, RemovalParameters::FIXED).await.unwrap();
        processor.remove(&input, RemovalParameters::FIXED).await.unwrap();

        let calls = factory.calls();
        let creations = calls.iter().filter(|c| c.starts_with("create:")).count();
        let inferences = calls.iter().filter(|c| c.as_str() == "infer").count();
        assert_eq!(creations, 1);
        assert_eq!(inferences, 2);
        assert_eq!(calls.first().map(String::as_str), Some("create:onnx"));
    }

    #[tokio::test]
    async fn test_naive_cutout_when_matting_disabled() {
        let dir = cached_model_dir();
        let mut processor = BackgroundRemovalProcessor::with_factory(
            offline_config(&dir),
            Box::new(MockBackendFactory::new()),
        )
        .unwrap();

        let params = RemovalParameters {
            alpha_matting: false,
            ..RemovalParameters::FIXED
        };
        let output = processor.remove(&png_input(90, 90), params).await.unwrap();
        let rgba = image::load_from_memory(&output).unwrap().to_rgba8();

        assert!(rgba.get_pixel(45, 45)[3] >= 250);
        assert!(rgba.get_pixel(0, 0)[3] <= 5);
    }

    #[tokio::test]
    async fn test_failing_backend_initialization_is_reported() {
        let dir = cached_model_dir();
        let mut processor = BackgroundRemovalProcessor::with_factory(
            offline_config(&dir),
            Box::new(MockBackendFactory::new_failing()),
        )
        .unwrap();

        let result = processor.remove(&png_input(16, 16), RemovalParameters::FIXED).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_model_offline_is_reported() {
        let dir = TempDir::new().unwrap();
        let factory = MockBackendFactory::new();
        let mut processor =
            BackgroundRemovalProcessor::with_factory(offline_config(&dir), Box::new(factory.clone()))
                .unwrap();

        let err = processor
            .remove(&png_input(16, 16), RemovalParameters::FIXED)
            .await
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
        assert!(factory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_input_is_an_image_error() {
        let dir = cached_model_dir();
        let mut processor = BackgroundRemovalProcessor::with_factory(
            offline_config(&dir),
            Box::new(MockBackendFactory::new()),
        )
        .unwrap();

        let err = processor
            .remove(b"definitely not an image", RemovalParameters::FIXED)
            .await
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Image(_)));
    }

    #[test]
    fn test_default_factory_lists_enabled_backends() {
        let factory = DefaultBackendFactory;
        let available = factory.available_backends();
        for backend in &available {
            assert!(factory.create_backend(*backend).is_ok());
        }
    }
}
