//! Execution provider strings of the form `backend:provider`

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{BgRemovalError, Result},
};

/// Parsing and formatting of execution provider strings
#[derive(Debug)]
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse `backend:provider` or a bare backend name
    ///
    /// # Examples
    /// ```rust
    /// use remove_bg::config::{BackendType, ExecutionProvider};
    /// use remove_bg::utils::ExecutionProviderManager;
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap();
    /// assert_eq!(backend, BackendType::Tract);
    /// assert_eq!(provider, ExecutionProvider::Cpu);
    /// ```
    ///
    /// # Errors
    /// - Unknown backend or provider name
    /// - A provider the backend cannot run on
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let Some((backend, provider)) = provider_str.split_once(':') else {
            return match provider_str {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(BgRemovalError::invalid_config(format!(
                    "Invalid provider '{provider_str}'. Use backend:provider (e.g., onnx:auto, tract:cpu)"
                ))),
            };
        };

        match (backend, provider) {
            ("onnx", "auto") => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
            ("onnx", "cpu") => Ok((BackendType::Onnx, ExecutionProvider::Cpu)),
            ("onnx", "cuda") => Ok((BackendType::Onnx, ExecutionProvider::Cuda)),
            ("onnx", "coreml") => Ok((BackendType::Onnx, ExecutionProvider::CoreMl)),
            ("onnx", other) => Err(BgRemovalError::invalid_config(format!(
                "Unknown ONNX provider: {other}. Supported: auto, cpu, cuda, coreml"
            ))),
            ("tract", "cpu") => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            ("tract", other) => Err(BgRemovalError::invalid_config(format!(
                "Unknown Tract provider: {other}. Tract only supports 'cpu'"
            ))),
            (other, _) => Err(BgRemovalError::invalid_config(format!(
                "Unknown backend: {other}. Supported backends: onnx, tract"
            ))),
        }
    }

    /// Validate a provider string without keeping the result
    #[must_use]
    pub fn is_valid_provider_string(provider_str: &str) -> bool {
        Self::parse_provider_string(provider_str).is_ok()
    }

    /// Format a backend and provider pair as `backend:provider`
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onnx_providers() {
        for (text, expected) in [
            ("onnx:auto", ExecutionProvider::Auto),
            ("onnx:cpu", ExecutionProvider::Cpu),
            ("onnx:cuda", ExecutionProvider::Cuda),
            ("onnx:coreml", ExecutionProvider::CoreMl),
        ] {
            let (backend, provider) = ExecutionProviderManager::parse_provider_string(text).unwrap();
            assert_eq!(backend, BackendType::Onnx);
            assert_eq!(provider, expected);
        }
    }

    #[test]
    fn test_parse_tract_providers() {
        let (backend, provider) =
            ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap();
        assert_eq!(backend, BackendType::Tract);
        assert_eq!(provider, ExecutionProvider::Cpu);

        assert!(ExecutionProviderManager::parse_provider_string("tract:cuda").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("tract:auto").is_err());
    }

    #[test]
    fn test_parse_backend_only() {
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("onnx").unwrap(),
            (BackendType::Onnx, ExecutionProvider::Auto)
        );
        assert_eq!(
            ExecutionProviderManager::parse_provider_string("tract").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(!ExecutionProviderManager::is_valid_provider_string("invalid"));
        assert!(!ExecutionProviderManager::is_valid_provider_string("onnx:invalid"));
        assert!(!ExecutionProviderManager::is_valid_provider_string("mock:cpu"));
    }

    #[test]
    fn test_provider_to_string_round_trips() {
        for text in ["onnx:auto", "onnx:coreml", "tract:cpu"] {
            let (backend, provider) = ExecutionProviderManager::parse_provider_string(text).unwrap();
            assert_eq!(
                ExecutionProviderManager::provider_to_string(backend, provider),
                text
            );
        }
    }
}
