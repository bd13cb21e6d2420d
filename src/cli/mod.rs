//! Command-line interface for Ferrule
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: One-shot build into the output directory
//! - `dev`: Development server with live reload

mod build;
mod dev;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use crate::config::Config;

pub use build::BuildCommand;
pub use dev::DevCommand;

/// Default configuration file name
pub const DEFAULT_CONFIG: &str = "ferrule.toml";

/// Ferrule - builds and serves WebAssembly single-page applications
#[derive(Parser, Debug)]
#[command(name = "ferrule")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to ferrule.toml config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project into the output directory
    Build(BuildCommand),

    /// Start development server with live reload
    Dev(DevCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Dev(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Load the configuration, using the defaults when the default file is absent
pub(crate) fn load_config(config_path: &str) -> Result<Config> {
    let path = Path::new(config_path);

    if !path.exists() && config_path == DEFAULT_CONFIG {
        let root = std::env::current_dir().context("Failed to read the current directory")?;
        info!("No {} found, using defaults in {}", DEFAULT_CONFIG, root.display());

        let mut config = Config::default_config();
        config.root = root;
        config
            .validate()
            .context("The default project layout does not match this directory")?;
        return Ok(config);
    }

    info!("Loading configuration from {}", config_path);
    Config::load(path).with_context(|| format!("Failed to load {}", config_path))
}

/// Resolve a path given on the command line against the working directory
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(path))
    }
}

/// Print the Ferrule banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚙".cyan(),
        "Ferrule".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
