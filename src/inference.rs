//! Inference backend abstraction and registry

use crate::config::{ModelVariant, RuntimeConfig};
use crate::error::Result;
use ndarray::Array4;
use std::collections::HashMap;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Load the ONNX model and prepare it for inference
    ///
    /// Returns the model load time when the backend measures it.
    ///
    /// # Errors
    /// - Model bytes are not a valid ONNX graph
    /// - Execution provider setup failures
    fn initialize(&mut self, model_bytes: &[u8], config: &RuntimeConfig)
        -> Result<Option<Duration>>;

    /// Run inference on an NCHW input tensor and return the first output
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output tensor has an unexpected rank
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Get the expected input shape for this backend
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Get the expected output shape for this backend
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Initialized backends, one per model variant
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<ModelVariant, Box<dyn InferenceBackend>>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, variant: ModelVariant, backend: Box<dyn InferenceBackend>) {
        self.backends.insert(variant, backend);
    }

    pub fn get(&mut self, variant: ModelVariant) -> Option<&mut Box<dyn InferenceBackend>> {
        self.backends.get_mut(&variant)
    }

    #[must_use]
    pub fn contains(&self, variant: ModelVariant) -> bool {
        self.backends.contains_key(&variant)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("variants", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}
