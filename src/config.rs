//! Site configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! serialized to a TOML table, the user's file is merged on top, and the
//! result is deserialized with unknown keys rejected.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! output_root = "dist"                 # Published output tree
//! base_url = "http://localhost:8080"   # Canonical site URL used in feeds
//! excerpt_words = 30                   # Words kept in listing excerpts
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have defaults; a missing file yields the stock configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Location readers are served from. On Unix this becomes a symlink to
    /// the current generation.
    pub output_root: PathBuf,
    /// Canonical site URL, used to build absolute links in the sitemap and RSS.
    pub base_url: String,
    /// Words kept in listing excerpts before the ellipsis.
    pub excerpt_words: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("dist"),
            base_url: "http://localhost:8080".to_string(),
            excerpt_words: 30,
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "output_root must not be empty".into(),
            ));
        }
        if self.output_root.file_name().is_none() {
            return Err(ConfigError::Validation(format!(
                "output_root must name a directory, got {}",
                self.output_root.display()
            )));
        }
        let base = self.base_url.trim();
        let host = base
            .strip_prefix("https://")
            .or_else(|| base.strip_prefix("http://"));
        match host {
            None => {
                return Err(ConfigError::Validation(
                    "base_url must start with http:// or https://".into(),
                ));
            }
            Some(rest) if rest.trim_matches('/').is_empty() => {
                return Err(ConfigError::Validation("base_url has no host".into()));
            }
            Some(_) => {}
        }
        if self.excerpt_words == 0 {
            return Err(ConfigError::Validation(
                "excerpt_words must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pressroom Configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Where the published site lives. Each rebuild renders into a fresh
# generation next to it (.<name>.generations/) and then swaps this path
# over in one step, so readers never see a half-written site.
output_root = "dist"

# Canonical URL of the published site. Used for absolute links in
# sitemap.xml and rss.xml. A trailing slash is ignored.
base_url = "http://localhost:8080"

# Number of words kept in listing excerpts. Longer bodies are cut and
# end with an ellipsis.
excerpt_words = 30
"##
}
