//! Command-line surface and configuration for the `music-mcp` binary.

pub mod cli;
pub mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
