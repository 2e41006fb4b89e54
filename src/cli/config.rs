//! Conversion of CLI arguments into the runtime configuration

use crate::cli::main_impl::Cli;
use crate::{config::RuntimeConfig, utils::ExecutionProviderManager};
use anyhow::{Context, Result};

/// Convert CLI arguments to a [`RuntimeConfig`]
#[derive(Debug)]
pub struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the runtime configuration from CLI arguments
    ///
    /// # Errors
    /// - Unknown execution provider string
    /// - Backend and provider that do not fit together
    pub fn from_cli(cli: &Cli) -> Result<RuntimeConfig> {
        Self::validate_cli(cli)?;

        let (backend_type, execution_provider) =
            ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let mut builder = RuntimeConfig::builder()
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .offline(cli.offline)
            .show_download_progress(true);

        if let Some(dir) = &cli.model_dir {
            builder = builder.model_dir(dir);
        }

        builder.build().context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    ///
    /// # Errors
    /// - Unknown execution provider string
    /// - Empty model directory argument
    pub fn validate_cli(cli: &Cli) -> Result<()> {
        ExecutionProviderManager::parse_provider_string(&cli.execution_provider)
            .context("Invalid execution provider format")?;

        if let Some(dir) = &cli.model_dir {
            anyhow::ensure!(
                !dir.as_os_str().is_empty(),
                "--model-dir must not be empty"
            );
        }

        Ok(())
    }
}
