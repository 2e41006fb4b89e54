//! Tests against the compiled `remove-bg` binary
//!
//! Only failure paths that never touch the network or a model are covered
//! here; the success path is exercised with a mock remover in
//! `shell_workflows.rs`.

#![cfg(feature = "cli")]

use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn remove_bg(temp_dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_remove-bg"));
    command
        .env("U2NET_HOME", temp_dir.path().join("models"))
        .env_remove("RUST_LOG")
        .arg("--offline");
    command
}

#[test]
fn test_missing_input_exits_with_status_one() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("out.png");

    let output = remove_bg(&temp_dir)
        .arg("/nonexistent/path.jpg")
        .arg(&output_path)
        .output()
        .expect("Failed to run remove-bg");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not found"), "stdout: {stdout}");
    assert!(stdout.contains("/nonexistent/path.jpg"));
    assert!(!output_path.exists());
}

#[test]
fn test_offline_without_model_fails_cleanly() {
    let temp_dir = TempDir::new().unwrap();
    let input_path = temp_dir.path().join("in.png");
    image::RgbImage::new(4, 4).save(&input_path).unwrap();
    let output_path = temp_dir.path().join("out.png");

    let output = remove_bg(&temp_dir)
        .arg(&input_path)
        .arg(&output_path)
        .output()
        .expect("Failed to run remove-bg");

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("An error occurred: "), "stdout: {stdout}");
    assert!(!output_path.exists());
}

#[test]
fn test_single_argument_prompts_for_paths() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("out.png");

    let mut child = remove_bg(&temp_dir)
        .arg("only-one-argument.jpg")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to run remove-bg");

    {
        let mut stdin = child.stdin.take().unwrap();
        writeln!(stdin, "/nonexistent/prompted.jpg").unwrap();
        writeln!(stdin, "{}", output_path.display()).unwrap();
    }

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Enter the path to the input image: "));
    assert!(stdout.contains("Enter the path to save the output image (e.g., output.png): "));
    assert!(stdout.contains("/nonexistent/prompted.jpg"));
}

#[test]
fn test_unknown_flag_is_a_usage_error() {
    let temp_dir = TempDir::new().unwrap();
    let output = remove_bg(&temp_dir)
        .arg("--definitely-not-a-flag")
        .output()
        .expect("Failed to run remove-bg");

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}
