//! Model cache management for downloaded models
//!
//! Models live as flat files in one directory: `<variant>.onnx` plus a
//! `<variant>.json` manifest describing where the file came from. A model
//! counts as cached only when both are present and the manifest parses.

use crate::config::ModelVariant;
use crate::error::{BgRemovalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const MODEL_DIR_ENV: &str = "U2NET_HOME";

/// Provenance record written next to every downloaded model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Which variant the model file holds
    pub variant: ModelVariant,
    /// Source URL the file was fetched from
    pub url: String,
    /// Lowercase hex SHA-256 of the model file
    pub sha256: String,
    /// Size of the model file in bytes
    pub size_bytes: u64,
    /// When the download finished
    pub downloaded_at: DateTime<Utc>,
}

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model variant
    pub variant: ModelVariant,
    /// Path to the ONNX file
    pub path: PathBuf,
    /// Manifest written at download time
    pub manifest: ModelManifest,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache in the default location
    ///
    /// Uses `U2NET_HOME` when set, otherwise `<platform cache dir>/remove-bg/models`.
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        Self::from_override(None)
    }

    /// Create a cache, preferring an explicit directory over the defaults
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn from_override(dir: Option<&Path>) -> Result<Self> {
        let cache_dir = Self::resolve_cache_dir(dir, std::env::var_os(MODEL_DIR_ENV))?;
        Self::with_dir(cache_dir)
    }

    /// Create a cache rooted at `cache_dir`, creating it if needed
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.into();

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    /// Pick the cache directory: explicit override, then environment, then platform default
    ///
    /// # Errors
    /// - No override, no environment value and no platform cache directory
    pub fn resolve_cache_dir(
        explicit: Option<&Path>,
        env_value: Option<OsString>,
    ) -> Result<PathBuf> {
        if let Some(dir) = explicit {
            return Ok(dir.to_path_buf());
        }

        if let Some(value) = env_value.filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(value));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set the {MODEL_DIR_ENV} environment variable."
                ))
            })?
            .join("remove-bg")
            .join("models"))
    }

    /// Directory holding the cached models
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the ONNX file for a variant (may not exist)
    #[must_use]
    pub fn model_path(&self, variant: ModelVariant) -> PathBuf {
        self.cache_dir.join(format!("{}.onnx", variant.name()))
    }

    /// Path of the manifest for a variant (may not exist)
    #[must_use]
    pub fn manifest_path(&self, variant: ModelVariant) -> PathBuf {
        self.cache_dir.join(format!("{}.json", variant.name()))
    }

    /// Check if a model and its manifest are present
    #[must_use]
    pub fn is_model_cached(&self, variant: ModelVariant) -> bool {
        self.model_path(variant).is_file() && self.read_manifest(variant).is_ok()
    }

    /// Read the manifest of a cached model
    ///
    /// # Errors
    /// - Manifest missing or unreadable
    /// - Manifest is not valid JSON or names another variant
    pub fn read_manifest(&self, variant: ModelVariant) -> Result<ModelManifest> {
        let path = self.manifest_path(variant);
        let contents = fs::read_to_string(&path)
            .map_err(|e| BgRemovalError::file_io_error("read model manifest", &path, &e))?;

        let manifest: ModelManifest = serde_json::from_str(&contents).map_err(|e| {
            BgRemovalError::model(format!("Invalid model manifest {}: {e}", path.display()))
        })?;

        if manifest.variant != variant {
            return Err(BgRemovalError::model(format!(
                "Manifest {} describes '{}', expected '{}'",
                path.display(),
                manifest.variant,
                variant
            )));
        }

        Ok(manifest)
    }

    /// Write the manifest of a model
    ///
    /// # Errors
    /// - Serialization or file write failures
    pub fn write_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let path = self.manifest_path(manifest.variant);
        let contents = serde_json::to_string_pretty(manifest)
            .map_err(|e| BgRemovalError::internal(format!("Failed to serialize manifest: {e}")))?;

        fs::write(&path, contents)
            .map_err(|e| BgRemovalError::file_io_error("write model manifest", &path, &e))
    }
}
