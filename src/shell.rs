//! The `remove-bg` orchestration shell
//!
//! Resolves the input and output paths (from arguments or interactive
//! prompts), checks the input exists, hands its bytes to a
//! [`BackgroundRemover`] with [`RemovalParameters::FIXED`], writes the result
//! and maps the outcome to an exit code.

use crate::{config::RemovalParameters, error::RemoveError, remover::BackgroundRemover};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument};

/// Prompt asking for the input path
pub const INPUT_PROMPT: &str = "Enter the path to the input image: ";
/// Prompt asking for the output path
pub const OUTPUT_PROMPT: &str = "Enter the path to save the output image (e.g., output.png): ";

/// Exit code of a successful invocation
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code of any failed invocation
pub const EXIT_FAILURE: i32 = 1;

/// Turn positional arguments into `(input, output)` paths
///
/// Exactly two arguments are used as-is. Any other count falls back to two
/// prompts on `stdout`, each answered by one line of `stdin`.
///
/// # Errors
/// - `stdin` ends or fails before both paths are read
pub fn resolve_invocation<R, W>(
    positional: &[String],
    stdin: &mut R,
    stdout: &mut W,
) -> Result<(PathBuf, PathBuf), RemoveError>
where
    R: BufRead,
    W: Write,
{
    if let [input, output] = positional {
        return Ok((PathBuf::from(input), PathBuf::from(output)));
    }

    debug!(count = positional.len(), "Prompting for paths");
    let input = prompt_line(INPUT_PROMPT, stdin, stdout)?;
    let output = prompt_line(OUTPUT_PROMPT, stdin, stdout)?;
    Ok((PathBuf::from(input), PathBuf::from(output)))
}

fn prompt_line<R: BufRead, W: Write>(
    prompt: &str,
    stdin: &mut R,
    stdout: &mut W,
) -> Result<String, RemoveError> {
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    if stdin.read_line(&mut line)? == 0 {
        return Err(RemoveError::OperationFailed(
            "input ended before a path was entered".to_string(),
        ));
    }

    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    Ok(trimmed.to_string())
}

/// Remove the background of the image at `input` and save it to `output`
///
/// The output is written to a temporary file next to `output` and renamed
/// over it, so a failed write leaves no partial file behind. A replaced file
/// keeps its permissions; a new one gets the usual `0o666` minus the umask.
///
/// # Errors
/// - [`RemoveError::NotFound`] when `input` does not exist
/// - [`RemoveError::OperationFailed`] for every other failure
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub async fn remove_background_from_file<B>(
    remover: &mut B,
    input: &Path,
    output: &Path,
) -> Result<(), RemoveError>
where
    B: BackgroundRemover + ?Sized,
{
    if !input.exists() {
        return Err(RemoveError::NotFound(input.to_path_buf()));
    }

    let data = tokio::fs::read(input).await?;
    debug!(bytes = data.len(), "Read input image");

    let result = remover.remove(&data, RemovalParameters::FIXED).await?;
    drop(data);

    write_atomically(output, &result)?;
    info!(bytes = result.len(), "Wrote output image");
    Ok(())
}

fn write_atomically(output: &Path, bytes: &[u8]) -> Result<(), RemoveError> {
    let directory = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // The rename carries the temp file's mode over to `output`
    let existing = std::fs::metadata(output)
        .ok()
        .filter(std::fs::Metadata::is_file)
        .map(|metadata| metadata.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".remove-bg-").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Same mode as a plain create: 0o666 minus the umask
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }

    let mut temp_file = builder
        .tempfile_in(directory)
        .map_err(|e| write_failure(output, &e))?;

    if let Some(permissions) = existing {
        temp_file
            .as_file()
            .set_permissions(permissions)
            .map_err(|e| write_failure(output, &e))?;
    }

    temp_file
        .write_all(bytes)
        .and_then(|()| temp_file.as_file().sync_all())
        .map_err(|e| write_failure(output, &e))?;

    temp_file
        .persist(output)
        .map_err(|e| write_failure(output, &e.error))?;
    Ok(())
}

fn write_failure(output: &Path, error: &std::io::Error) -> RemoveError {
    RemoveError::OperationFailed(format!("Failed to write '{}': {error}", output.display()))
}

/// Run one invocation and return its exit code
///
/// Exactly one status line is printed to `stdout`: the success message or
/// the error.
pub async fn run<B, R, W>(
    positional: &[String],
    remover: &mut B,
    stdin: &mut R,
    stdout: &mut W,
) -> i32
where
    B: BackgroundRemover + ?Sized,
    R: BufRead,
    W: Write,
{
    let outcome = match resolve_invocation(positional, stdin, stdout) {
        Ok((input, output)) => remove_background_from_file(remover, &input, &output)
            .await
            .map(|()| output),
        Err(e) => Err(e),
    };

    let (line, code) = match outcome {
        Ok(output) => (
            format!("Background removed and saved to {}", output.display()),
            EXIT_SUCCESS,
        ),
        Err(e) => {
            error!(error = %e, "Background removal failed");
            (e.to_string(), EXIT_FAILURE)
        },
    };

    // A closed stdout cannot change the outcome
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
    code
}
