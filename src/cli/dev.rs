//! Development server command implementation

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::load_config;
use crate::server::DevSession;

/// Start development server with live reload
#[derive(Args, Debug)]
pub struct DevCommand {
    /// Port to run the dev server on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,

    /// Disable live reload
    #[arg(long)]
    pub no_live_reload: bool,
}

impl DevCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let mut config = load_config(config_path)?;

        if let Some(port) = self.port {
            config.dev.port = port;
        }
        if let Some(host) = &self.host {
            config.dev.host = host.clone();
        }
        if self.open {
            config.dev.open = true;
        }
        if self.no_live_reload {
            config.dev.live_reload = false;
        }

        let dev = config.dev.clone();
        let mut session = DevSession::new(config).context("Invalid dev server configuration")?;

        eprintln!("{} Starting dev server...\n", "→".blue());

        let addr = session.init().await.context("Dev server failed to start")?;

        eprintln!(
            "\n  {} {}",
            "•".dimmed(),
            format!("http://{}:{}", dev.host, addr.port()).cyan().underline()
        );

        if dev.live_reload {
            eprintln!("  {} Live reload {}", "•".dimmed(), "enabled".green());
        }
        if dev.history_api_fallback {
            eprintln!(
                "  {} Unknown paths serve {}",
                "•".dimmed(),
                dev.index.as_str().dimmed()
            );
        }

        eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        eprintln!();

        session.shutdown().await.context("Dev server did not shut down cleanly")?;
        Ok(())
    }
}
