//! Configuration view and validation commands: `specflow config`.

use anyhow::Result;

use super::super::ConfigCommands;
use specflow::config::{SpecflowConfig, SpecflowToml};

pub fn cmd_config(config: &SpecflowConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = &config.paths.config;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Specflow Configuration");
            println!("======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No config.toml found at {}; using defaults", config_path.display());
            }
            println!();

            print!("{}", toml::to_string_pretty(&config.toml)?);
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  project name   = \"{}\"", config.project_name());
            println!("  trunk branches = {}", config.trunk_branches().join(", "));
            match config.templates_dir() {
                Some(dir) => println!("  templates dir  = {}", dir.display()),
                None => println!("  templates dir  = (unavailable)"),
            }
            println!("  state lock     = {}", config.lock_enabled());
            println!("  prefix width   = {}", config.prefix_width());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No config.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("config.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.paths.ops_dir)?;
            let mut toml = SpecflowToml::default();
            toml.project.name = Some(config.project_name());
            toml.save(config_path)?;

            println!("Created config.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [vcs] trunk_branches");
            println!("  - [templates] system_dir");
            println!("  - [state] lock");
            println!("  - [specs] prefix_width");
            println!();
        }
    }

    Ok(())
}
