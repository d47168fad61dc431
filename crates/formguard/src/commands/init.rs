//! Init-config command - writes a starter configuration file.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Args;
use console::style;
use formguard_config::{
    AuthConfig, FormGuardConfig, ServerConfig, SessionConfig, UserConfig, save_config,
    xdg_config_path,
};

use super::Context;

/// Arguments for the init-config command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Create project-local config (./formguard.toml) instead of user config
    #[arg(long)]
    pub local: bool,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Run the init-config command.
pub fn run(args: InitArgs, ctx: &Context) -> Result<()> {
    let path = match (&ctx.config_path, args.local) {
        (Some(path), _) => path.clone(),
        (None, true) => PathBuf::from("formguard.toml"),
        (None, false) => xdg_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?,
    };

    if path.exists() && !args.force {
        println!("Config file already exists: {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    save_config(&starter_config(), &path)?;
    println!("{} {}", style("Created").green(), path.display());
    println!("Change the password of the 'admin' user before serving.");
    Ok(())
}

/// Every section spelled out with its defaults, plus one admin user.
fn starter_config() -> FormGuardConfig {
    FormGuardConfig {
        server: Some(ServerConfig::default()),
        auth: Some(AuthConfig::default()),
        session: Some(SessionConfig::default()),
        users: vec![UserConfig {
            username: "admin".to_string(),
            password: "changeme".to_string(),
            roles: vec!["admin".to_string()],
        }],
        constraints: Vec::new(),
    }
}
