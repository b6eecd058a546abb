//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILNORM_CONFIG` (environment variable)
//! 2. `~/.config/mailnorm/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailnorm\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NormalizeError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Body and attachment extraction behavior.
    pub extraction: ExtractionConfig,
    /// Temp-file staging for attachment upload.
    pub staging: StagingConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// What to do when neither structured nor raw-boundary extraction finds anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Return an empty attachment list.
    #[default]
    Discard,
    /// Attach the whole original message as `message_<id>.eml`.
    EmlDump,
}

/// Body and attachment extraction behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Last-resort behavior when no attachment could be recovered.
    pub fallback_policy: FallbackPolicy,
    /// Maximum multipart nesting depth walked by the extractor.
    pub max_depth: usize,
    /// Convert an HTML-only body to plain text.
    pub html_to_text: bool,
    /// Maximum length (in chars) of the `[unextractable]` placeholder rendering.
    pub max_placeholder_len: usize,
}

/// Temp-file staging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Parent directory for staged files (system temp dir when unset).
    pub temp_dir: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fallback_policy: FallbackPolicy::Discard,
            max_depth: 10,
            html_to_text: true,
            max_placeholder_len: 4096,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on any error.
pub fn load_config() -> Config {
    let Some(path) = config_file_path().filter(|p| p.exists()) else {
        return Config::default();
    };
    match read_config(&path) {
        Ok(cfg) => {
            tracing::info!(path = %path.display(), "Loaded config");
            cfg
        }
        Err(e) => {
            tracing::warn!(error = %e, "Unusable config file, using defaults");
            Config::default()
        }
    }
}

/// Read and parse one configuration file.
pub fn read_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| NormalizeError::io(path, e))?;
    toml::from_str(&contents)
        .map_err(|e| NormalizeError::Config(format!("{}: {e}", path.display())))
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| NormalizeError::Config("could not determine config file path".into()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NormalizeError::io(parent, e))?;
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| NormalizeError::Config(e.to_string()))?;
    std::fs::write(&path, contents).map_err(|e| NormalizeError::io(&path, e))?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILNORM_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailnorm").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailnorm")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailnorm.log")
}
