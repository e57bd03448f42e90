//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MIMECOMPOSE_CONFIG` (environment variable)
//! 2. `~/.config/mimecompose/config.toml` (Linux/macOS)
//!    `%APPDATA%\mimecompose\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Settings that change how parts are classified and grouped.
    pub compose: ComposeConfig,
    /// Attachment list display settings.
    pub display: DisplayConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs and the spool.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Compose engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Allow 8bit transfer encoding instead of quoted-printable/base64.
    pub allow_8bit: bool,
    /// Quote text parts that contain a line starting with `From `.
    pub encode_from: bool,
    /// Multipart subtypes that are listed as a single entry and never expanded.
    pub opaque_subtypes: Vec<String>,
    /// Directory where parts extracted from drafts are written.
    pub spool_dir: Option<PathBuf>,
}

/// Attachment list display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Draw `|->` style tree glyphs in front of nested parts.
    pub tree_glyphs: bool,
    /// Maximum width of the description column (0 = unlimited).
    pub label_width: usize,
    /// Show estimated encoded sizes next to each part.
    pub show_sizes: bool,
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

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            allow_8bit: false,
            encode_from: false,
            opaque_subtypes: vec!["encrypted".to_string()],
            spool_dir: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tree_glyphs: true,
            label_width: 40,
            show_sizes: true,
        }
    }
}

impl ComposeConfig {
    /// Whether a multipart with this subtype must be kept closed.
    pub fn is_opaque(&self, subtype: &str) -> bool {
        self.opaque_subtypes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(subtype))
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MIMECOMPOSE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mimecompose").join("config.toml"))
}

/// Return the cache directory for logs and the spool.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mimecompose")
}

/// Directory for parts extracted from drafts.
pub fn spool_dir(config: &Config) -> PathBuf {
    match config.compose.spool_dir {
        Some(ref dir) => dir.clone(),
        None => cache_dir(config).join("spool"),
    }
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mimecompose.log")
}
