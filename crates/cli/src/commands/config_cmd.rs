//! `ivan config`: configuration management commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use ivan_config::AppConfig;

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print a default config file (the default action)
    Default,
    /// Print the effective configuration, secrets redacted
    Show,
    /// Print the config file path
    Path,
    /// Load and validate the configuration
    Validate,
}

pub async fn run(
    config_path: Option<&Path>,
    action: Option<ConfigAction>,
) -> Result<(), Box<dyn std::error::Error>> {
    match action.unwrap_or(ConfigAction::Default) {
        ConfigAction::Default => print!("{}", AppConfig::default_toml()),
        ConfigAction::Show => show(config_path)?,
        ConfigAction::Path => println!("{}", resolve_path(config_path).display()),
        ConfigAction::Validate => validate(config_path)?,
    }
    Ok(())
}

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", redacted_toml(config)?);
    Ok(())
}

fn redacted_toml(mut config: AppConfig) -> Result<String, toml::ser::Error> {
    if config.backend.api_key.is_some() {
        config.backend.api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&config)
}

fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}...", resolve_path(config_path).display());

    match super::load_config(config_path) {
        Ok(config) => {
            println!("   Config parsed and validated");
            println!();
            println!("   Backend:   {:?} ({})", config.backend.kind, config.backend.base_url);
            println!("   Model:     {}", config.backend.model);
            println!("   Grammar:   {}", config.agent.grammar);
            println!("   Max cycles: {}", config.agent.max_cycles);
            match config.agent.deadline() {
                Some(deadline) => println!("   Deadline:  {}s", deadline.as_secs()),
                None => println!("   Deadline:  none"),
            }
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}
