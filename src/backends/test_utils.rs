//! Mock backends for testing inference without model files
//!
//! The mock produces a radial mask centred on the tensor: 1.0 in the middle,
//! fading to 0.0 at a third of the shorter side. That gives the matting step
//! certain foreground, certain background and an unknown band in between.

use crate::{
    config::{BackendType, RuntimeConfig},
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    processor::BackendFactory,
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Shared record of calls made on mock backends
pub type CallHistory = Arc<Mutex<Vec<String>>>;

/// Mock inference backend
#[derive(Debug, Clone)]
pub struct MockBackend {
    initialized: bool,
    output_shape: (usize, usize, usize, usize),
    call_history: CallHistory,
    should_fail_init: bool,
    should_fail_inference: bool,
    constant_output: Option<f32>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            output_shape: (1, 1, 320, 320),
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
            constant_output: None,
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        Self {
            should_fail_init: true,
            ..Self::new()
        }
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        Self {
            should_fail_inference: true,
            ..Self::new()
        }
    }

    /// Create a mock backend whose output is the same value everywhere
    #[must_use]
    pub fn new_constant(value: f32) -> Self {
        Self {
            constant_output: Some(value),
            ..Self::new()
        }
    }

    /// Record calls into `history` instead of a private log
    #[must_use]
    pub fn with_history(mut self, history: CallHistory) -> Self {
        self.call_history = history;
        self
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_mock_output(&self, batch_size: usize) -> Array4<f32> {
        let (_, channels, height, width) = self.output_shape;

        if let Some(value) = self.constant_output {
            return Array4::from_elem((batch_size, channels, height, width), value);
        }

        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(10.0);

        Array4::from_shape_fn((batch_size, channels, height, width), |(_, _, y, x)| {
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            ((radius - distance) / radius * 2.0).clamp(0.0, 1.0)
        })
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(
        &mut self,
        model_bytes: &[u8],
        _config: &RuntimeConfig,
    ) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock initialization failure"));
        }
        if model_bytes.is_empty() {
            return Err(BgRemovalError::model("Empty model"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgRemovalError::internal("Backend not initialized"));
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock inference failure"));
        }

        let (batch, channels, height, width) = input.dim();
        let (_, expected_channels, expected_height, expected_width) = self.input_shape();
        if (channels, height, width) != (expected_channels, expected_height, expected_width) {
            return Err(BgRemovalError::inference(format!(
                "Unexpected input shape {:?}",
                input.dim()
            )));
        }

        Ok(self.generate_mock_output(batch))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.output_shape.2, self.output_shape.3)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.output_shape
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Factory handing out [`MockBackend`]s that share one call history
#[derive(Debug, Clone, Default)]
pub struct MockBackendFactory {
    pub create_failing_backends: bool,
    pub fail_backend_creation: bool,
    pub constant_output: Option<f32>,
    pub history: CallHistory,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory that produces backends failing at initialization
    #[must_use]
    pub fn new_failing() -> Self {
        Self {
            create_failing_backends: true,
            ..Self::default()
        }
    }

    /// Create a factory that fails to create backends
    #[must_use]
    pub fn new_creation_failing() -> Self {
        Self {
            fail_backend_creation: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        if let Ok(mut history) = self.history.lock() {
            history.push(format!("create:{backend_type}"));
        }

        if self.fail_backend_creation {
            return Err(BgRemovalError::processing(
                "Mock factory configured to fail backend creation",
            ));
        }

        let backend = if self.create_failing_backends {
            MockBackend::new_failing_init()
        } else if let Some(value) = self.constant_output {
            MockBackend::new_constant(value)
        } else {
            MockBackend::new()
        };

        Ok(Box::new(backend.with_history(Arc::clone(&self.history))))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_inference() {
        let mut backend = MockBackend::new();
        backend.initialize(b"model", &RuntimeConfig::default()).unwrap();

        let output = backend.infer(&Array4::zeros((1, 3, 320, 320))).unwrap();
        assert_eq!(output.dim(), (1, 1, 320, 320));
        assert!((output[[0, 0, 160, 160]] - 1.0).abs() < f32::EPSILON);
        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);
        assert_eq!(backend.get_call_history(), vec!["initialize", "infer"]);
    }

    #[test]
    fn test_mock_backend_failure_scenarios() {
        let config = RuntimeConfig::default();

        let mut failing_init = MockBackend::new_failing_init();
        assert!(failing_init.initialize(b"model", &config).is_err());
        assert!(!failing_init.is_initialized());

        let mut failing_inference = MockBackend::new_failing_inference();
        failing_inference.initialize(b"model", &config).unwrap();
        assert!(failing_inference
            .infer(&Array4::zeros((1, 3, 320, 320)))
            .is_err());

        let mut uninitialized = MockBackend::new();
        assert!(uninitialized.infer(&Array4::zeros((1, 3, 320, 320))).is_err());
    }

    #[test]
    fn test_mock_backend_rejects_wrong_input_shape() {
        let mut backend = MockBackend::new();
        backend.initialize(b"model", &RuntimeConfig::default()).unwrap();
        assert!(backend.infer(&Array4::zeros((1, 3, 64, 64))).is_err());
    }

    #[test]
    fn test_mock_backend_factory() {
        let factory = MockBackendFactory::new();
        let backend = factory.create_backend(BackendType::Onnx).unwrap();
        assert!(!backend.is_initialized());
        assert_eq!(factory.calls(), vec!["create:onnx"]);

        assert!(MockBackendFactory::new_creation_failing()
            .create_backend(BackendType::Tract)
            .is_err());

        let mut failing = MockBackendFactory::new_failing()
            .create_backend(BackendType::Onnx)
            .unwrap();
        assert!(failing.initialize(b"model", &RuntimeConfig::default()).is_err());
    }
}
