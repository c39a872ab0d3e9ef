use crate::domain::config::{AccLpf, AccRange, GyroLpf, GyroRange, SensorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
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
    "esense".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Advertised name of the device to connect to
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// IMU sampling rate requested when streaming starts (1-100 Hz)
    #[serde(default = "default_sampling_rate_hz")]
    pub sampling_rate_hz: u8,
    /// Configuration written to the device once it is ready
    #[serde(default = "default_sensor_config")]
    pub sensor_config: SensorConfig,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Settings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            scan_timeout_secs: default_scan_timeout_secs(),
            sampling_rate_hz: default_sampling_rate_hz(),
            sensor_config: default_sensor_config(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_device_name() -> String {
    "eSense-0063".to_string()
}
fn default_scan_timeout_secs() -> u64 {
    60
}
fn default_sampling_rate_hz() -> u8 {
    30
}
fn default_sensor_config() -> SensorConfig {
    SensorConfig::new(AccRange::G8, GyroRange::Deg1000, AccLpf::Bw10, GyroLpf::Bw10)
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults when it
    /// is missing or unreadable
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("ESense");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn update_sensor_config(&mut self, config: SensorConfig) -> anyhow::Result<()> {
        self.settings.sensor_config = config;
        self.save()
    }

    pub fn update_device_name(&mut self, name: &str) -> anyhow::Result<()> {
        if self.settings.device_name != name {
            self.settings.device_name = name.to_string();
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("esense-settings-{}-{}.json", name, std::process::id()));
        path
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "device_name": "eSense-1234" }"#).unwrap();
        assert_eq!(settings.device_name, "eSense-1234");
        assert_eq!(settings.scan_timeout_secs, 60);
        assert_eq!(settings.sampling_rate_hz, 30);
        assert_eq!(settings.sensor_config, default_sensor_config());
        assert_eq!(settings.log_settings.level, "info");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = temp_settings_path("missing");
        let _ = fs::remove_file(&path);
        let service = SettingsService::from_path(path);
        assert_eq!(service.get().device_name, "eSense-0063");
        assert_eq!(service.get().scan_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_settings_path("reload");
        let mut service = SettingsService::from_path(path.clone());
        service.update_device_name("eSense-0420").unwrap();
        let config = SensorConfig::new(AccRange::G2, GyroRange::Deg250, AccLpf::Disabled, GyroLpf::Bw41);
        service.update_sensor_config(config).unwrap();

        let reloaded = SettingsService::from_path(path.clone());
        assert_eq!(reloaded.get().device_name, "eSense-0420");
        assert_eq!(reloaded.get().sensor_config, config);
        let _ = fs::remove_file(&path);
    }
}
