//! Bridge Configuration
//!
//! Engine locations and bridge settings stored in TOML format.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::BridgeOptions;

/// File name looked up in the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Native engine locations
    pub engine: EngineSettings,
    /// Bridge behaviour
    pub bridge: BridgeSettings,
}

/// Where to find the OCR wrapper module and the WeChat OCR runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Path to `wcocr.dll`
    pub module_path: PathBuf,
    /// Path to `WeChatOCR.exe` (inside the WeChat XPlugin directory)
    pub ocr_exe: PathBuf,
    /// WeChat installation directory
    pub wechat_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from("wcocr.dll"),
            ocr_exe: PathBuf::new(),
            wechat_dir: PathBuf::new(),
        }
    }
}

impl EngineSettings {
    /// Check that every engine location is filled in
    pub fn validate(&self) -> Result<()> {
        if self.module_path.as_os_str().is_empty() {
            return Err(anyhow!("engine.module_path is not configured"));
        }
        if self.ocr_exe.as_os_str().is_empty() {
            return Err(anyhow!("engine.ocr_exe is not configured"));
        }
        if self.wechat_dir.as_os_str().is_empty() {
            return Err(anyhow!("engine.wechat_dir is not configured"));
        }
        Ok(())
    }
}

/// Bridge settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Give up on a job after this many milliseconds; unset waits forever
    pub timeout_ms: Option<u64>,
}

impl BridgeSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn to_options(&self) -> BridgeOptions {
        BridgeOptions {
            timeout: self.timeout(),
        }
    }
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "wcocr", "wcocr-bridge")
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load `path` if given, else the default config file if present, else defaults
pub fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return load_config(path);
    }

    if let Ok(config_dir) = get_config_dir() {
        let default_path = config_dir.join(CONFIG_FILE_NAME);
        if default_path.exists() {
            tracing::info!("Loaded configuration from {:?}", default_path);
            return load_config(&default_path);
        }
    }

    tracing::debug!("Using default configuration");
    Ok(AppConfig::default())
}
