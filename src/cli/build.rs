//! Build command implementation

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::{absolute, load_config};
use crate::bundler::Bundler;
use crate::config::Mode;
use crate::utils;

/// Build the project into the output directory
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Build mode (development or production)
    #[arg(short, long)]
    pub mode: Option<Mode>,

    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let mut config = load_config(config_path)?;

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(outdir) = &self.outdir {
            config.output.dir = absolute(outdir)?.display().to_string();
        }

        let output_dir = config.output_dir();
        let bundler = Bundler::new(config).context("Invalid build configuration")?;

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let mode = if bundler.config().mode.is_production() {
            "production"
        } else {
            "development"
        };
        spinner.set_message(format!("Building in {} mode...", mode));
        spinner.enable_steady_tick(Duration::from_millis(80));

        let result = bundler.run().await;
        spinner.finish_and_clear();
        let output = result.context("Build failed")?;

        eprintln!(
            "{} Built {} bundle(s) from {} module(s) in {}\n",
            "✓".green().bold(),
            output.bundles.len(),
            output.modules,
            utils::format_duration(output.duration)
        );

        // Print bundle summary
        for bundle in &output.bundles {
            eprintln!(
                "  {} {} {}",
                "•".dimmed(),
                bundle.path.cyan(),
                utils::format_size(bundle.size).dimmed()
            );
            if let Some(stylesheet) = &bundle.stylesheet {
                let size = output.snapshot.get(stylesheet).map(<[u8]>::len).unwrap_or(0);
                eprintln!(
                    "  {} {} {}",
                    "•".dimmed(),
                    stylesheet.cyan(),
                    utils::format_size(size).dimmed()
                );
            }
        }

        if output.copied > 0 {
            eprintln!("  {} {} static file(s)", "•".dimmed(), output.copied);
        }

        eprintln!(
            "\n  {} {} ({})\n",
            "→".blue(),
            output_dir.display(),
            utils::format_size(output.snapshot.size())
        );

        Ok(())
    }
}
