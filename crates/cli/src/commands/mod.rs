pub mod ask;
pub mod config_cmd;
pub mod parse;
pub mod tools;
pub mod watch_news;

use std::path::Path;

use ivan_config::{AppConfig, ConfigError};

/// Load `path` if given, otherwise the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
}
