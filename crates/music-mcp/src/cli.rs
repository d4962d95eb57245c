//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "music-mcp")]
#[command(author, version, about = "MCP server for remote control of a Spotify account", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a file under the platform log directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Directory holding config.json and credentials.json
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Subcommand (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Serve MCP requests on stdin/stdout
    Serve,
    /// Authorize this machine against a Spotify account
    Setup {
        /// Reconfigure without asking when credentials already exist
        #[arg(short, long)]
        force: bool,
        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },
    /// Show stored credentials and the account they belong to
    Status {
        /// Refresh the access token even if it is still valid
        #[arg(long)]
        refresh: bool,
    },
    /// Delete stored credentials
    Logout,
    /// List the tools exposed to MCP clients
    Tools,
}

impl Cli {
    /// The subcommand to run, `serve` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
