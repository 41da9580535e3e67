use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TxError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default = "default_round_up_limit")]
    pub round_up_limit: i64,
}

fn default_data_file() -> String {
    "operations.xlsx".to_string()
}

fn default_round_up_limit() -> i64 {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            sheet: None,
            round_up_limit: default_round_up_limit(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("txreport")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &Path) -> Settings {
    if path.exists() {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable settings at {}: {e}", path.display());
            Settings::default()
        })
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| TxError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
