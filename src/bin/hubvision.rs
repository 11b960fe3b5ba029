//! Hub vision CLI tool
//!
//! Command-line interface for fetching hub models and running preprocessing
//! and classification through the hubvision library.

#[cfg(feature = "cli")]
use hubvision::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> hubvision::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
