//! Shared helpers for the processing pipeline

pub mod preprocessing;
pub mod providers;

pub use preprocessing::ImagePreprocessor;
pub use providers::ExecutionProviderManager;
