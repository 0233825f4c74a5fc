//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};

use gridsession_config::{self, GridSessionConfig};

use super::Context;

/// Project-local config file name.
const PROJECT_CONFIG_FILE: &str = "gridsession.toml";

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and the files it came from
    Show,

    /// Show the user configuration file path
    Path,

    /// Check the resolved configuration for invalid values
    Validate,

    /// Write a config file with defaults
    Init {
        /// Create project-local config (./gridsession.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Validate => cmd_validate(ctx),
        ConfigCommand::Init { local, force } => cmd_init(local, force),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.config;

    if ctx.json_output {
        let output = serde_json::json!({
            "config": loaded.config,
            "sources": loaded.applied_paths(),
            "warnings": loaded.warnings(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# gridsession configuration\n");

    let sources = loaded.applied_paths();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)");
    } else {
        for source in &sources {
            println!("# from {}", source.display());
        }
    }
    for warning in loaded.warnings() {
        println!("# warning: {warning}");
    }
    println!();

    // Render every section, including defaults for ones left unset
    let resolved = GridSessionConfig {
        session: Some(loaded.config.session()),
        store: Some(loaded.config.store()),
        events: Some(loaded.config.events()),
        logging: Some(loaded.config.logging()),
    };
    print!("{}", resolved.to_toml()?);
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let path = gridsession_config::xdg_config_path();
    if ctx.json_output {
        println!("{}", serde_json::json!({ "path": path }));
        return Ok(());
    }
    match path {
        Some(path) => println!("{}", path.display()),
        None => bail!("could not determine the user config directory"),
    }
    Ok(())
}

fn cmd_validate(ctx: &Context) -> Result<()> {
    let rejected: Vec<String> = ctx.config.rejected().filter_map(|l| l.warning()).collect();
    if !rejected.is_empty() {
        bail!("{}", rejected.join("\n"));
    }
    ctx.config.config.validate()?;
    if ctx.verbose {
        for layer in &ctx.config.layers {
            println!("{:<8} {} ({})", layer.kind, layer.path.display(), layer.status);
        }
    }
    println!("configuration is valid");
    Ok(())
}

fn cmd_init(local: bool, force: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(PROJECT_CONFIG_FILE)
    } else {
        gridsession_config::xdg_config_path()
            .context("could not determine the user config directory")?
    };

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let defaults = GridSessionConfig {
        session: Some(Default::default()),
        store: Some(Default::default()),
        events: Some(Default::default()),
        logging: Some(Default::default()),
    };
    gridsession_config::save_config(&defaults, &path)?;
    println!("wrote {}", path.display());
    Ok(())
}
