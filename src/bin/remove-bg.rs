//! `remove-bg` command-line tool
//!
//! Removes the background from one image using U²-Net segmentation and
//! closed-form alpha matting.

#[cfg(feature = "cli")]
use remove_bg::cli;

#[cfg(feature = "cli")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
