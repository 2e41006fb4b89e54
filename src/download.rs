//! Model downloading with progress reporting and integrity records
//!
//! A download streams into a temporary file inside the cache directory while
//! hashing, then renames it over `<variant>.onnx` and writes the manifest. A
//! failed or interrupted download never leaves a file that looks cached.

use crate::cache::{CachedModelInfo, ModelCache, ModelManifest};
use crate::config::ModelVariant;
use crate::error::{BgRemovalError, Result};
use crate::models::ModelInfo;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const DOWNLOAD_TIMEOUT_SECS: u64 = 600;
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Create an indicator; a no-op unless `show` is set and the CLI feature is on
    #[must_use]
    pub fn new(show: bool) -> Self {
        if show {
            Self::visible()
        } else {
            Self::NoOp
        }
    }

    #[cfg(feature = "cli")]
    fn visible() -> Self {
        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        Self::Indicatif(pb)
    }

    #[cfg(not(feature = "cli"))]
    fn visible() -> Self {
        Self::NoOp
    }

    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

/// Model downloader writing into a [`ModelCache`]
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

impl ModelDownloader {
    /// Create a downloader for the given cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download a model variant into the cache unless it is already there
    ///
    /// # Errors
    /// - Network errors or non-success HTTP status
    /// - Empty response body
    /// - File system errors while writing the model or manifest
    pub async fn download_model(
        &self,
        info: &ModelInfo,
        show_progress: bool,
    ) -> Result<CachedModelInfo> {
        let variant = info.variant;
        if self.cache.is_model_cached(variant) {
            log::info!("Model already cached: {}", variant);
            return Ok(CachedModelInfo {
                variant,
                path: self.cache.model_path(variant),
                manifest: self.cache.read_manifest(variant)?,
            });
        }

        log::info!("Downloading model '{}' from {}", variant, info.url);
        let progress = ProgressIndicator::new(show_progress);
        progress.set_message(format!("Downloading {variant}"));

        match self.fetch(info, &progress).await {
            Ok(cached) => {
                progress.finish_with_message(format!("Downloaded {variant}"));
                log::info!(
                    "Cached {} ({} bytes, sha256 {})",
                    cached.path.display(),
                    cached.manifest.size_bytes,
                    cached.manifest.sha256
                );
                Ok(cached)
            },
            Err(e) => {
                progress.finish_with_message("Download failed".to_string());
                Err(e)
            },
        }
    }

    async fn fetch(&self, info: &ModelInfo, progress: &ProgressIndicator) -> Result<CachedModelInfo> {
        let response = self.client.get(info.url).send().await.map_err(|e| {
            BgRemovalError::network_error(format!("Failed to download {}", info.url), e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgRemovalError::network_error(
                format!("HTTP error {status} for {}", info.url),
                std::io::Error::new(std::io::ErrorKind::Other, status.to_string()),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let cache_dir = self.cache.cache_dir();
        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".onnx.part")
            .tempfile_in(cache_dir)
            .map_err(|e| BgRemovalError::file_io_error("create temporary file in", cache_dir, &e))?;

        let std_file = temp
            .as_file()
            .try_clone()
            .map_err(|e| BgRemovalError::file_io_error("open", temp.path(), &e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write", temp.path(), &e))?;

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush", temp.path(), &e))?;
        drop(file);

        if downloaded == 0 {
            return Err(BgRemovalError::model(format!(
                "Downloaded model '{}' is empty",
                info.variant
            )));
        }

        let manifest = ModelManifest {
            variant: info.variant,
            url: info.url.to_string(),
            sha256: format!("{:x}", hasher.finalize()),
            size_bytes: downloaded,
            downloaded_at: chrono::Utc::now(),
        };

        let path = self.cache.model_path(info.variant);
        temp.persist(&path)
            .map_err(|e| BgRemovalError::file_io_error("move downloaded model to", &path, &e.error))?;
        self.cache.write_manifest(&manifest)?;

        Ok(CachedModelInfo {
            variant: info.variant,
            path,
            manifest,
        })
    }

    /// Get the model cache for other operations
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Hex SHA-256 digest of a file
///
/// # Errors
/// - File read failures
pub fn sha256_file(path: &Path) -> Result<String> {
    let contents = fs::read(path)
        .map_err(|e| BgRemovalError::file_io_error("read file for verification", path, &e))?;
    Ok(format!("{:x}", Sha256::digest(&contents)))
}

/// Check a cached model file against the digest recorded in its manifest
///
/// # Errors
/// - Manifest or model file unreadable
pub fn verify_cached_model(cache: &ModelCache, variant: ModelVariant) -> Result<bool> {
    let manifest = cache.read_manifest(variant)?;
    let actual = sha256_file(&cache.model_path(variant))?;

    if actual == manifest.sha256 {
        Ok(true)
    } else {
        log::warn!(
            "Integrity check failed for {}: expected {}, got {}",
            variant,
            manifest.sha256,
            actual
        );
        Ok(false)
    }
}
