//! # Configuration
//!
//! `fabrica.toml` layout:
//!
//! ```toml
//! ledger_path = "fabrica-data/ledger.json"
//! sync_log_path = "fabrica-data/sync_log.json"
//! braid_path = "fabrica-data/braid.json"
//! codex_path = "fabrica-data/codex_chain.json"
//!
//! [cascade]
//! enable_enrichment = true
//! enable_sync = true
//! suggestion_link_type = "references"
//! min_suggestion_confidence = 0.0
//! ```
//!
//! Every key is optional. Unknown keys are rejected.

use fabrica_core::{CascadeConfig, FabricaError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory holding every default data file.
pub const DEFAULT_DATA_DIR: &str = "fabrica-data";

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "fabrica.toml";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FabricaConfig {
    pub ledger_path: PathBuf,
    pub sync_log_path: PathBuf,
    pub braid_path: PathBuf,
    pub codex_path: PathBuf,
    pub cascade: CascadeConfig,
}

impl Default for FabricaConfig {
    fn default() -> Self {
        Self::in_dir(DEFAULT_DATA_DIR)
    }
}

impl FabricaConfig {
    /// Default file names under one data directory.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ledger_path: dir.join("ledger.json"),
            sync_log_path: dir.join("sync_log.json"),
            braid_path: dir.join("braid.json"),
            codex_path: dir.join("codex_chain.json"),
            cascade: CascadeConfig::default(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, FabricaError> {
        toml::from_str(text)
            .map_err(|e| FabricaError::DeserializationError(format!("Invalid config: {}", e)))
    }
}

/// Load the configuration.
///
/// Without an explicit path, `fabrica.toml` in the working directory is used.
/// A missing file gives the defaults.
pub fn load_config(path: Option<&Path>) -> Result<FabricaConfig, FabricaError> {
    let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(FabricaConfig::default());
    }

    let text = fs::read_to_string(&path).map_err(|e| {
        FabricaError::IoError(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = FabricaConfig::from_toml(&text)?;

    if !(0.0..=1.0).contains(&config.cascade.min_suggestion_confidence) {
        return Err(FabricaError::DeserializationError(
            "cascade.min_suggestion_confidence must be in [0.0, 1.0]".to_string(),
        ));
    }
    Ok(config)
}
