mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Overrides the config file location when set.
pub const CONFIG_PATH_ENV: &str = "ARPOSE_CONFIG";

/// Resolve the config file: `$ARPOSE_CONFIG` if set, otherwise
/// `<config dir>/arpose/config.toml`.
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("arpose");
    Ok(dir.join("config.toml"))
}

/// Load the config from its default location.
pub fn load_config() -> Result<AppConfig> {
    load_from(&config_path()?)
}

/// Save the config to its default location.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_to(&config_path()?, config)
}

/// Parse `path`, falling back to defaults when the file does not exist.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config: AppConfig = toml::from_str(&contents)
                .with_context(|| format!("Invalid config at {}", path.display()))?;
            info!(?path, "Loaded config");
            Ok(config)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(?path, "No config found, using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Write `config` as pretty TOML, creating parent directories as needed.
pub fn save_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(?path, "Saved config");
    Ok(())
}
