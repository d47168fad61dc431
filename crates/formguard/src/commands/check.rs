//! Check-config command - validates and prints the resolved configuration.

use anyhow::Result;
use clap::Args;
use console::style;

use super::Context;

/// Arguments for the check-config command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Also print the merged config as TOML (passwords masked)
    #[arg(long)]
    pub raw: bool,
}

/// Run the check-config command.
pub fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    println!("{}\n", style("formguard configuration").bold());

    let loaded_from = loaded.loaded_from();
    if loaded_from.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for path in loaded_from {
            println!("  {}", path.display());
        }
        println!();
    }

    let server = config.server();
    println!("{}", style("Server").bold());
    println!("  bind:          {}", style(&server.bind).cyan());
    match server.redirect_port {
        Some(port) => println!("  redirect port: {}", style(port).cyan()),
        None => println!("  redirect port: {}", style("none").dim()),
    }
    println!();

    let auth = config.auth();
    println!("{}", style("Authentication").bold());
    println!("  context path:  {}", style(display_context(&auth.context_path)).cyan());
    println!("  login page:    {}", style(&auth.login_page).cyan());
    println!("  error page:    {}", style(&auth.error_page).cyan());
    println!("  cache:         {}", style(auth.cache).cyan());
    println!("  max save size: {} bytes", style(auth.max_save_post_size).cyan());
    println!(
        "  rotate id:     {}",
        style(auth.change_session_id_on_authentication).cyan()
    );
    println!();

    let session = config.session();
    println!("{}", style("Sessions").bold());
    println!("  cookie:        {}", style(&session.cookie_name).cyan());
    println!("  max sessions:  {}", style(session.max_sessions).cyan());
    println!("  idle ttl:      {}s", style(session.ttl_secs).cyan());
    println!();

    println!("{}", style("Users").bold());
    if config.users.is_empty() {
        println!("  {}", style("none").dim());
    }
    for user in &config.users {
        println!("  {:<16} roles: {}", user.username, user.roles.join(", "));
    }
    println!();

    println!("{}", style("Constraints").bold());
    if config.constraints.is_empty() {
        println!("  {}", style("none").dim());
    }
    for constraint in &config.constraints {
        let roles = match &constraint.roles {
            None => "public".to_string(),
            Some(roles) if roles.is_empty() => "deny all".to_string(),
            Some(roles) => roles.join(", "),
        };
        println!(
            "  {:<24} {:?}  roles: {}",
            constraint.url_patterns.join(" "),
            constraint.transport,
            roles
        );
    }
    println!();

    if !loaded.warnings.is_empty() {
        println!("{}", style("Warnings").yellow().bold());
        for warning in &loaded.warnings {
            println!("  ⚠ {}", warning);
        }
        println!();
    }

    if args.raw {
        let mut masked = config.clone();
        for user in &mut masked.users {
            user.password = "********".to_string();
        }
        println!("---\nRaw config:\n");
        println!("{}", masked.to_toml()?);
    }

    println!("{}", style("Configuration is valid.").green());
    Ok(())
}

fn display_context(context_path: &str) -> &str {
    if context_path.is_empty() { "/" } else { context_path }
}
