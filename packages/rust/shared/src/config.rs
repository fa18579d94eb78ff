//! Application configuration for drivedb.
//!
//! User config lives at `~/.drivedb/drivedb.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file; only the names of the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriveDbError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "drivedb.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".drivedb";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "drivedb.db";

// ---------------------------------------------------------------------------
// Config structs (matching drivedb.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Article extraction services.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Markdown rendering service.
    #[serde(default)]
    pub render: RenderConfig,

    /// Presentation defaults.
    #[serde(default)]
    pub presentation: PresentationConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. Defaults to `~/.drivedb/drivedb.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Primary parser endpoint; receives `?url=<article>`.
    #[serde(default = "default_primary_url")]
    pub primary_url: String,

    /// Name of the env var holding the primary parser's API key.
    #[serde(default = "default_primary_api_key_env")]
    pub primary_api_key_env: String,

    /// Secondary converter endpoint; receives `?u=<article>&output=json`.
    #[serde(default = "default_secondary_url")]
    pub secondary_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            primary_url: default_primary_url(),
            primary_api_key_env: default_primary_api_key_env(),
            secondary_url: default_secondary_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_primary_url() -> String {
    "https://mercury.postlight.com/parser".into()
}
fn default_primary_api_key_env() -> String {
    "MERCURY_API_KEY".into()
}
fn default_secondary_url() -> String {
    "http://heckyesmarkdown.com/go/".into()
}
fn default_timeout_secs() -> u64 {
    20
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Base URL of the GitHub-compatible markdown API.
    #[serde(default = "default_render_api_url")]
    pub api_url: String,

    /// Name of the env var holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Repository context used to resolve issue/PR references.
    #[serde(default = "default_upstream")]
    pub context: String,

    /// Rendering mode (`gfm` or `markdown`).
    #[serde(default = "default_render_mode")]
    pub mode: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            api_url: default_render_api_url(),
            token_env: default_token_env(),
            context: default_upstream(),
            mode: default_render_mode(),
        }
    }
}

fn default_render_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_upstream() -> String {
    "commaai/openpilot".into()
}
fn default_render_mode() -> String {
    "gfm".into()
}

/// `[presentation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationConfig {
    /// Repository named in the "Upstreamed" status tooltip.
    #[serde(default = "default_upstream")]
    pub upstream_repository: String,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            upstream_repository: default_upstream(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.drivedb/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DriveDbError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.drivedb/drivedb.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: explicit config value, else `~/.drivedb/drivedb.db`.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.database.path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DriveDbError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DriveDbError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DriveDbError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DriveDbError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DriveDbError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named by `var_name`. Empty values count as unset.
pub fn secret_from_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("MERCURY_API_KEY"));
        assert!(toml_str.contains("GITHUB_TOKEN"));
        assert!(toml_str.contains("commaai/openpilot"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
[database]
path = "/tmp/drivedb-test.db"

[extraction]
timeout_secs = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.extraction.timeout_secs, 5);
        assert_eq!(config.extraction.primary_api_key_env, "MERCURY_API_KEY");
        assert_eq!(config.render.mode, "gfm");
        assert_eq!(
            database_path(&config).expect("db path"),
            PathBuf::from("/tmp/drivedb-test.db")
        );
    }

    #[test]
    fn presentation_upstream_overridable() {
        let toml_str = r#"
[presentation]
upstream_repository = "example/fork"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.presentation.upstream_repository, "example/fork");
    }

    #[test]
    fn missing_secret_is_none() {
        assert!(secret_from_env("DRIVEDB_TEST_NONEXISTENT_SECRET_12345").is_none());
    }
}
