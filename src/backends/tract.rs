//! Tract backend: pure Rust CPU inference
//!
//! U²-Net exports carry symbolic batch and spatial dimensions, so the input
//! fact is pinned to `1×3×320×320` before optimization.

use crate::config::RuntimeConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::U2NET_INPUT_SIZE;
use ndarray::Array4;
use tract_onnx::prelude::*;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models without native dependencies
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
}

impl TractBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tract only runs on the CPU
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    fn load(model_bytes: &[u8]) -> Result<TractModel> {
        let side = U2NET_INPUT_SIZE as usize;

        onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .map_err(|e| BgRemovalError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| BgRemovalError::model(format!("Failed to fix input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgRemovalError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| BgRemovalError::model(format!("Failed to create runnable model: {e}")))
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(
        &mut self,
        model_bytes: &[u8],
        config: &RuntimeConfig,
    ) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }

        if config.intra_threads > 0 || config.inter_threads > 0 {
            log::debug!("Thread settings only apply to the ONNX Runtime backend");
        }

        let start = Instant::now();
        self.model = Some(Self::load(model_bytes)?);
        let elapsed = start.elapsed();

        log::info!(
            "Tract model loaded in {}ms ({} bytes)",
            elapsed.as_millis(),
            model_bytes.len()
        );
        Ok(Some(elapsed))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::inference("Tract model not initialized"))?;

        let start = Instant::now();
        let outputs = model
            .run(tvec![Tensor::from(input.clone()).into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();

        let view = output.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let result = view
            .to_owned()
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|_| {
                BgRemovalError::inference(format!(
                    "Expected 4D output tensor, got {}D",
                    view.ndim()
                ))
            })?;

        log::debug!(
            "Tract inference: {}ms, output {:?}",
            start.elapsed().as_millis(),
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
        self.model.is_some()
    }
}
