//! CLI command handlers.

pub mod check;
pub mod init;
pub mod serve;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use formguard_config::{LoadedConfig, load_config, load_explicit_config};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load and validate the configuration.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = match &self.config_path {
            Some(path) => load_explicit_config(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => load_config(None)?,
        };
        loaded.config.validate()?;
        Ok(loaded)
    }
}
