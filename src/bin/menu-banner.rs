//! Menu banner CLI tool
//!
//! Command-line interface for banner generation and SNS copywriting.

#[cfg(feature = "cli")]
use menu_banner::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
