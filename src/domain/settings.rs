//! Persisted settings: which peripheral to target and how to log.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default = "default_false")]
    pub file: bool,
    #[serde(default = "default_log_dir")]
    pub directory: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            console: default_true(),
            file: default_false(),
            directory: default_log_dir(),
            file_name_prefix: default_prefix(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "gatt_session".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Target identifiers; defaults mirror the BL600 LED peripheral
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: String,
    #[serde(default = "default_config_descriptor_uuid")]
    pub config_descriptor_uuid: String,

    /// Expiry for in-flight requests; `null` disables it.
    #[serde(default = "default_pending_timeout_ms")]
    pub pending_timeout_ms: Option<u64>,

    /// Last peripheral a session was opened against.
    #[serde(default)]
    pub last_peripheral: Option<String>,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            config_descriptor_uuid: default_config_descriptor_uuid(),
            pending_timeout_ms: default_pending_timeout_ms(),
            last_peripheral: None,
            log_settings: LogSettings::default(),
        }
    }
}

fn default_service_uuid() -> String {
    "cdea40a1-dcdb-42bb-8557-5c3d7d5135cb".to_string()
}
fn default_characteristic_uuid() -> String {
    "f7552729-9d2c-45cc-ba33-a3327a3bb6d0".to_string()
}
fn default_config_descriptor_uuid() -> String {
    "00002902-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_pending_timeout_ms() -> Option<u64> {
    Some(10_000)
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("gatt-session");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &PathBuf) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Record the peripheral of the session just opened.
    pub fn remember_peripheral(&mut self, peripheral: &str) -> anyhow::Result<()> {
        if self.settings.last_peripheral.as_deref() != Some(peripheral) {
            self.settings.last_peripheral = Some(peripheral.to_string());
            self.save()?;
        }
        Ok(())
    }
}
