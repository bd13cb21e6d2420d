//! Ferrule - builds and serves WebAssembly single-page applications
//!
//! Compiles a Rust crate to WebAssembly, bundles the JavaScript entries that
//! import it together with their stylesheets, copies static files and serves
//! the result during development.
//!
//! # Features
//! - ES module bundling with synchronous WebAssembly imports
//! - SCSS preprocessing, vendor prefixing and CSS extraction
//! - Dev server with live reload and history-API fallback

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ferrule_lib::Cli;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ferrule=debug,ferrule_lib=debug,tower_http=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ferrule=info,ferrule_lib=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
