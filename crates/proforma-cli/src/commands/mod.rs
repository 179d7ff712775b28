//! Subcommands.

pub mod config;
pub mod process;
pub mod serve;

use std::path::{Path, PathBuf};

use proforma_core::ProformaConfig;
use tracing::debug;

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("proforma")
        .join("config.json")
}

/// Load the configuration.
///
/// An explicit path must exist. Without one the default location is used
/// when present, built-in defaults otherwise.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ProformaConfig> {
    if let Some(path) = config_path {
        debug!("Loading config from {}", path);
        return ProformaConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path, e));
    }

    let default_path = default_config_path();
    if default_path.exists() {
        debug!("Loading config from {}", default_path.display());
        return Ok(ProformaConfig::from_file(&default_path)?);
    }

    Ok(ProformaConfig::default())
}
