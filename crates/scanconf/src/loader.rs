//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ScanConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/scanlens/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("scanlens/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("scanlens.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and layer its values over `config`.
pub fn load_from_file(config: &mut ScanConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Layer the keys present in a TOML document over `config`.
///
/// Keys that are absent keep their current value, so files loaded later
/// only override what they mention.
pub fn apply_toml(config: &mut ScanConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let wrong_type = |key: &str, expected: &str| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("{} must be {}", key, expected),
    };

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level") {
            config.telemetry.log_level = v
                .as_str()
                .ok_or_else(|| wrong_type("telemetry.log_level", "a string"))?
                .to_string();
        }
    }

    if let Some(defaults) = table.get("defaults").and_then(|v| v.as_table()) {
        for (key, value) in defaults {
            let target = &mut config.defaults;
            match key.as_str() {
                "cancel_label" | "highlight_color" | "format" | "facing" => {
                    let s = value
                        .as_str()
                        .ok_or_else(|| wrong_type(&format!("defaults.{}", key), "a string"))?
                        .to_string();
                    match key.as_str() {
                        "cancel_label" => target.cancel_label = s,
                        "highlight_color" => target.highlight_color = s,
                        "format" => target.format = s,
                        _ => target.facing = s,
                    }
                }
                "show_flash_icon" => {
                    target.show_flash_icon = value
                        .as_bool()
                        .ok_or_else(|| wrong_type("defaults.show_flash_icon", "a boolean"))?;
                }
                "auto_focus" => {
                    target.auto_focus = value
                        .as_bool()
                        .ok_or_else(|| wrong_type("defaults.auto_focus", "a boolean"))?;
                }
                _ => {}
            }
        }
    }

    if let Some(delivery) = table.get("delivery").and_then(|v| v.as_table()) {
        if let Some(v) = delivery.get("stream_buffer") {
            config.delivery.stream_buffer = positive(v)
                .ok_or_else(|| wrong_type("delivery.stream_buffer", "a positive integer"))?;
        }
        if let Some(v) = delivery.get("event_buffer") {
            config.delivery.event_buffer = positive(v)
                .ok_or_else(|| wrong_type("delivery.event_buffer", "a positive integer"))?;
        }
    }

    Ok(())
}

fn positive(value: &toml::Value) -> Option<usize> {
    value
        .as_integer()
        .filter(|v| *v > 0)
        .and_then(|v| usize::try_from(v).ok())
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ScanConfig, sources: &mut ConfigSources) {
    apply_env_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_env_with<F>(config: &mut ScanConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("SCANLENS_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("SCANLENS_LOG_LEVEL".to_string());
    }
    // RUST_LOG wins over our own variable
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    if let Some(v) = lookup("SCANLENS_STREAM_BUFFER") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 {
                config.delivery.stream_buffer = n;
                sources.env_overrides.push("SCANLENS_STREAM_BUFFER".to_string());
            }
        }
    }

    if let Some(v) = lookup("SCANLENS_HIGHLIGHT_COLOR") {
        config.defaults.highlight_color = v;
        sources
            .env_overrides
            .push("SCANLENS_HIGHLIGHT_COLOR".to_string());
    }

    if let Some(v) = lookup("SCANLENS_FORMAT") {
        config.defaults.format = v;
        sources.env_overrides.push("SCANLENS_FORMAT".to_string());
    }
}
