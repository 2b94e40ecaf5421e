//! Optional config file loading. Search order: ./chapterdl.toml, then
//! $XDG_CONFIG_HOME/chapterdl/config.toml (or ~/.config/chapterdl/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// HTTP User-Agent header (also applied to the browser session).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Delay after each image download, in milliseconds. Overrides the site default.
    pub image_delay_ms: Option<u64>,
    /// Delay after each chapter (and between listing pages), in milliseconds.
    pub chapter_delay_ms: Option<u64>,
    /// Write info.txt into image archives (default: true).
    pub write_info: Option<bool>,
    /// Path to the wkhtmltopdf executable.
    pub wkhtmltopdf: Option<PathBuf>,
    /// Browser image capture: canvas (default) or screenshot.
    pub capture: Option<String>,
    /// Run the browser without a window (default: true).
    pub headless: Option<bool>,
    /// Chrome/Chromium executable for the browser fetcher.
    pub browser_executable: Option<PathBuf>,
}

fn read_config(path: &Path) -> Result<Config, String> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    toml::from_str(&s).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
}

/// Search order: (1) ./chapterdl.toml, (2) $XDG_CONFIG_HOME/chapterdl/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("chapterdl.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("chapterdl").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            return read_config(path).map(Some);
        }
    }
    Ok(None)
}
