//! `remove-bg` command-line entry point
//!
//! Parses flags, installs logging, builds the processor and hands the
//! positional arguments to the shell.

use super::config::CliConfigBuilder;
use crate::{
    error::RemoveError,
    processor::BackgroundRemovalProcessor,
    shell,
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

/// Remove the background from an image
///
/// With exactly two PATHS (input image, output file) the command runs
/// directly; otherwise it asks for both paths on the terminal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "remove-bg")]
pub struct Cli {
    /// Input image and output file
    #[arg(value_name = "PATHS")]
    pub paths: Vec<String>,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Directory holding downloaded models [default: $U2NET_HOME or the user cache directory]
    #[arg(long, value_name = "PATH")]
    pub model_dir: Option<PathBuf>,

    /// Never download models; fail if the model is not cached
    #[arg(long)]
    pub offline: bool,

    /// Log output style on stderr
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => Self::Console,
            CliLogFormat::Compact => Self::Compact,
        }
    }
}

/// Run the command line and return the process exit code
pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    let config = match CliConfigBuilder::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    info!(
        backend = %config.backend_type,
        provider = %config.execution_provider,
        offline = config.offline,
        "Starting remove-bg"
    );
    log_provider_diagnostics();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut stdin = stdin.lock();
    let mut stdout = stdout.lock();

    let mut processor = match BackgroundRemovalProcessor::new(config) {
        Ok(processor) => processor,
        Err(e) => {
            let _ = writeln!(stdout, "{}", RemoveError::from(e));
            return ExitCode::FAILURE;
        },
    };

    let code = shell::run(&cli.paths, &mut processor, &mut stdin, &mut stdout).await;
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn init_tracing(cli: &Cli) -> Result<()> {
    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into())
        .with_env_filter_from_env()
        .init()
        .context("Failed to initialize tracing subscriber")?;

    debug!(verbosity = cli.verbose, "Tracing initialized");
    Ok(())
}

fn log_provider_diagnostics() {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    #[cfg(feature = "onnx")]
    for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
        debug!(backend = "onnx", provider = %name, available, "{description}");
    }

    #[cfg(feature = "tract")]
    for (name, available, description) in crate::backends::TractBackend::list_providers() {
        debug!(backend = "tract", provider = %name, available, "{description}");
    }
}
