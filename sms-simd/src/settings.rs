//! Daemon settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sms_sim::VirtualModemConfig;
use sms_switch::SwitchConfig;

/// Daemon settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Switch and listener configuration
    #[serde(default)]
    pub switch: SwitchConfig,
    /// Initial state of the simulated modem
    #[serde(default)]
    pub modem: VirtualModemConfig,
    /// Log every switch event, not just stored messages
    #[serde(default = "default_true")]
    pub log_traffic: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            switch: SwitchConfig::default(),
            modem: VirtualModemConfig::default(),
            log_traffic: true,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for sms-simd
    /// Uses $XDG_CONFIG_HOME/sms-simd, falls back to ~/.config/sms-simd
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("sms-simd"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("sms-simd"))
    }

    /// Default location of the settings file
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from a file, falling back to defaults if it is missing
    /// or unreadable
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to a file, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }
}
