//! Command handlers for the music-mcp CLI.

pub mod logging;
pub mod serve;
pub mod setup;
pub mod status;

pub use logging::*;
pub use serve::*;
pub use setup::*;
pub use status::*;

use music_mcp::config::CREDENTIALS_FILE;
use music_mcp_auth::TokenStore;
use music_mcp_server::ToolRegistry;
use std::path::Path;

/// Token store inside the config directory.
pub(crate) fn token_store(config_dir: &Path) -> TokenStore {
    TokenStore::with_path(config_dir.join(CREDENTIALS_FILE))
}

/// Delete stored credentials.
pub async fn handle_logout(config_dir: &Path) -> anyhow::Result<()> {
    let store = token_store(config_dir);
    if store.clear().await? {
        println!("Removed stored credentials at {}", store.path().display());
    } else {
        println!("No stored credentials at {}", store.path().display());
    }
    Ok(())
}

/// Print the tool catalogue.
pub fn handle_tools() -> anyhow::Result<()> {
    let registry = ToolRegistry::with_builtins();
    println!("Available tools ({}):", registry.len());
    for tool in registry.descriptors() {
        println!();
        println!("  {}", tool.name);
        println!("    {}", tool.description);
        if !tool.scopes.is_empty() {
            println!("    scopes: {}", tool.scopes.join(", "));
        }
    }
    Ok(())
}
