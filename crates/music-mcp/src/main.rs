//! music-mcp - Spotify remote control for MCP clients.
//!
//! This is the main entry point for the music-mcp CLI.

mod commands;

use clap::Parser;
use music_mcp::cli::{Cli, Commands};
use music_mcp::config::{resolve_config_dir, Config};
use tracing::debug;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = commands::init_logging(cli.verbose, cli.log_file);
    if let Some(path) = &log_file {
        debug!(path = %path.display(), "Logging to file");
    }

    let config_dir = resolve_config_dir(cli.config_dir.clone(), |key| std::env::var(key).ok())?;
    let config = Config::load(&config_dir)?;
    debug!(dir = %config_dir.display(), "Loaded configuration");

    match cli.command() {
        Commands::Serve => commands::handle_serve(&config, &config_dir).await,
        Commands::Setup { force, no_browser } => {
            commands::handle_setup(&config, &config_dir, force, no_browser).await
        }
        Commands::Status { refresh } => commands::handle_status(&config, &config_dir, refresh).await,
        Commands::Logout => commands::handle_logout(&config_dir).await,
        Commands::Tools => commands::handle_tools(),
    }
}
