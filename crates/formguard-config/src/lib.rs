//! Configuration system for formguard.
//!
//! Provides TOML-based configuration with:
//! - `[server]`, `[auth]` and `[session]` sections
//! - `[[users]]` and `[[constraints]]` tables for the in-memory realm
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    load_explicit_config, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
