//! Minimal configuration loading for scanlens.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/scanlens/config.toml` (system)
//! 2. `~/.config/scanlens/config.toml` (user)
//! 3. `./scanlens.toml` (local override, replaced by an explicit path when given)
//! 4. Environment variables (`SCANLENS_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [telemetry]
//! log_level = "info"
//!
//! [defaults]
//! cancel_label = "Cancel"
//! highlight_color = "#DC143C"
//! show_flash_icon = false
//! format = "qr"
//! facing = "back"
//! auto_focus = true
//!
//! [delivery]
//! stream_buffer = 64
//! event_buffer = 256
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{DefaultsConfig, DeliveryConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to render config: {0}")]
    Serialize(String),
}

/// Complete scanlens configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScanConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl ScanConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` replacing the local `./scanlens.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ScanConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_from_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(format!("# scanlens configuration\n\n{}", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.defaults.format, "qr");
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = ScanConfig::default();
        config.defaults.cancel_label = "Done".to_string();
        config.delivery.stream_buffer = 3;

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[defaults]"));

        let parsed: ScanConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_to_toml_escapes_free_text() {
        let mut config = ScanConfig::default();
        config.defaults.cancel_label = "Say \"stop\" \\ quit".to_string();
        config.defaults.highlight_color = "#FF\"00".to_string();

        let rendered = config.to_toml().unwrap();
        assert!(rendered.parse::<toml::Table>().is_ok());

        let mut reloaded = ScanConfig::default();
        loader::apply_toml(&mut reloaded, &rendered, Path::new("rendered.toml")).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[defaults]\ncancel_label = \"Abort\"\n").unwrap();

        let (config, sources) = ScanConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.defaults.cancel_label, "Abort");
        assert!(sources.files.contains(&path));
    }
}
