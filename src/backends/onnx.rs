//! ONNX Runtime backend for U²-Net segmentation models
//!
//! Supports the CPU, CUDA and `CoreML` execution providers. A requested
//! accelerator that is not available falls back to CPU with a warning.

use crate::config::{ExecutionProvider, RuntimeConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::U2NET_INPUT_SIZE;
use instant::{Duration, Instant};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
}

impl OnnxBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List ONNX Runtime execution providers with availability and description
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available(),
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available(),
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    fn execution_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();

        match requested {
            ExecutionProvider::Auto => {
                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    log::info!("Using CUDA execution provider");
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    log::info!("Using CoreML execution provider");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
        }

        providers
    }

    fn create_session(model_bytes: &[u8], config: &RuntimeConfig) -> Result<Session> {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };

        let mut builder = Session::builder()
            .map_err(|e| BgRemovalError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::execution_providers(config.execution_provider);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                BgRemovalError::inference(format!("Failed to set execution providers: {e}"))
            })?;
        }

        log::debug!("ONNX threading: {intra_threads} intra-op, {inter_threads} inter-op");

        builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(model_bytes)
            .map_err(|e| BgRemovalError::model(format!("Failed to load ONNX model: {e}")))
    }
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

impl InferenceBackend for OnnxBackend {
    fn initialize(
        &mut self,
        model_bytes: &[u8],
        config: &RuntimeConfig,
    ) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }

        let start = Instant::now();
        self.session = Some(Self::create_session(model_bytes, config)?);
        let elapsed = start.elapsed();

        log::info!(
            "ONNX model loaded in {:.0}ms ({} bytes, provider {})",
            elapsed.as_secs_f64() * 1000.0,
            model_bytes.len(),
            config.execution_provider
        );
        Ok(Some(elapsed))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Backend not initialized"))?;

        let start = Instant::now();
        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        // U²-Net emits the fused mask first, followed by six side outputs
        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| BgRemovalError::inference("Model produced no outputs"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| BgRemovalError::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output.shape().to_vec();
        let &[n, c, h, w] = shape.as_slice() else {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let data = output.to_owned().into_raw_vec_and_offset().0;
        let result = Array4::from_shape_vec((n, c, h, w), data).map_err(|e| {
            BgRemovalError::processing(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::debug!(
            "ONNX inference: {:.2}ms, output {:?}",
            start.elapsed().as_secs_f64() * 1000.0,
            result.dim()
        );
        Ok(result)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        let side = U2NET_INPUT_SIZE as usize;
        (1, 3, side, side)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        let side = U2NET_INPUT_SIZE as usize;
        (1, 1, side, side)
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_backend_is_uninitialized() {
        let backend = OnnxBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.input_shape(), (1, 3, 320, 320));
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = OnnxBackend::new();
        let input = Array4::<f32>::zeros((1, 3, 320, 320));
        assert!(backend.infer(&input).is_err());
    }

    #[test]
    fn test_cpu_is_always_listed() {
        let providers = OnnxBackend::list_providers();
        assert_eq!(providers.len(), 3);
        assert!(providers
            .iter()
            .any(|(name, available, _)| name == "CPU" && *available));
    }
}
