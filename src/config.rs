//!
//! 配置模块
//!

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_DIR_NAME: &str = "segment-downloader";
const CONFIG_FILE_NAME: &str = "config.json";

/// Defaults read from a JSON file; command-line flags take precedence.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub connection_count: u8,
    pub chunk_size: u64,
    pub retry_times: u8,
    pub retry_delay_ms: u64,
    pub timeout_secs: Option<u64>,
    pub download_dir: Option<PathBuf>,
    pub headers: BTreeMap<String, String>,
    pub use_browser_user_agent: bool,
}

impl Config {
    pub fn load_from_file(file_path: &Path) -> Result<Self> {
        let config_data = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;
        let config: Config = serde_json::from_str(&config_data)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }

    /// Reads `explicit` when given, else the default config file if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match default_config_path() {
            Some(path) if path.is_file() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_count: 4,
            chunk_size: 1024 * 1024 * 4,
            retry_times: 3,
            retry_delay_ms: 500,
            timeout_secs: None,
            download_dir: None,
            headers: BTreeMap::new(),
            use_browser_user_agent: false,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
