//! Optional config file loading. Search order: ./mangafeed.toml, then
//! $XDG_CONFIG_HOME/mangafeed/config.toml (or ~/.config/mangafeed/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct Config {
    /// Listing page to start the walk from.
    pub start_url: Option<String>,
    /// Output file when -o is not set. Relative to CWD.
    pub output: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// HTTP Accept-Language header.
    pub accept_language: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Attempts per fetch (default 3).
    pub retry_count: Option<u32>,
    /// Backoff unit in seconds; attempt n waits n times this (default 1.0).
    pub retry_backoff_secs: Option<f64>,
    /// Pause between listing pages in seconds (default 1.0).
    pub page_delay_secs: Option<f64>,
    /// Concurrent detail workers (default 4).
    pub workers: Option<usize>,
    /// Feed title.
    pub blog_title: Option<String>,
}

/// Search order: (1) ./mangafeed.toml, (2) $XDG_CONFIG_HOME/mangafeed/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("mangafeed.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("mangafeed").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            return load_config_from(path).map(Some);
        }
    }
    Ok(None)
}

/// Read and parse one config file.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}
