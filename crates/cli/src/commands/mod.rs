pub mod compose;
pub mod config_cmd;
pub mod history;
pub mod sections;

use anyhow::Context;
use promptloom_config::AppConfig;
use std::path::Path;

/// Load the config file named on the command line, or the default one,
/// with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    AppConfig::load_with_overrides(path).context("Failed to load config")
}

/// SQLite connection URL for a database file.
pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}
