//! Logging initialization.
//!
//! Stdout carries the protocol, so logs go to stderr or to a file under the
//! platform log directory.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str =
    "music_mcp=info,music_mcp_auth=info,music_mcp_spotify=info,music_mcp_server=info";
const VERBOSE_FILTER: &str =
    "music_mcp=debug,music_mcp_auth=debug,music_mcp_spotify=debug,music_mcp_server=debug";

/// Initialize logging. `RUST_LOG` takes precedence over the built-in filters.
/// Returns the log file path if logging to a file.
pub fn init_logging(verbose: bool, to_file: bool) -> Option<PathBuf> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }))
    };

    if to_file {
        let log_dir = get_log_dir();
        match open_log_file(&log_dir) {
            Ok((file, path)) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter())
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(file)
                    .init();
                return Some(path);
            }
            Err(e) => eprintln!("Warning: Could not open log file in {}: {e}", log_dir.display()),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
    None
}

fn open_log_file(log_dir: &std::path::Path) -> std::io::Result<(std::fs::File, PathBuf)> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join("music-mcp.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    Ok((file, path))
}

/// Get the log directory path.
pub fn get_log_dir() -> PathBuf {
    // macOS: ~/Library/Logs/music-mcp
    // Linux: ~/.local/state/music-mcp/logs
    // Windows: %LOCALAPPDATA%/music-mcp/logs

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            return home.join("Library/Logs/music-mcp");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(state_dir) = dirs::state_dir() {
            return state_dir.join("music-mcp/logs");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".local/state/music-mcp/logs");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local_app) = dirs::data_local_dir() {
            return local_app.join("music-mcp/logs");
        }
    }

    PathBuf::from(".music-mcp/logs")
}
