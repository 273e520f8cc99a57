use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app::error::AppError;

pub const DEFAULT_STRUCTURED_COMMANDS: [&str; 3] = [
    "uiautomator dump /dev/tty",
    "uiautomator dump --compressed /dev/tty",
    "uiautomator dump /sdcard/window_dump.xml && cat /sdcard/window_dump.xml && rm -f /sdcard/window_dump.xml",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdbSettings {
    pub command_path: String,
    pub command_timeout_secs: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            command_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcquisitionSettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Tried in order until one yields a parseable hierarchy.
    pub structured_commands: Vec<String>,
    pub text_command: String,
    pub window_command: String,
    pub ime_command: String,
    pub screen_size_command: String,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 500,
            structured_commands: DEFAULT_STRUCTURED_COMMANDS
                .iter()
                .map(|command| command.to_string())
                .collect(),
            text_command: "dumpsys activity top".to_string(),
            window_command: "dumpsys window windows | grep -E 'mCurrentFocus|mFocusedApp'"
                .to_string(),
            ime_command: "dumpsys input_method | grep -E 'mInputShown|mShowRequested'".to_string(),
            screen_size_command: "wm size".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilteringSettings {
    pub min_element_size: i32,
}

impl Default for FilteringSettings {
    fn default() -> Self {
        Self { min_element_size: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub filtering: FilteringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DROID_UISTATE_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".droid_uistate_config.json")
}

pub fn backup_path_for(path: &Path) -> PathBuf {
    path.with_extension("backup.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    let path = config_path();
    save_config_to_path(config, &path, &backup_path_for(&path), trace_id)
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|err| AppError::validation(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config_from_value(&value)))
}

/// Deserializes section by section so one bad section does not discard the rest.
/// Fields missing from a section take their defaults individually.
fn config_from_value(value: &serde_json::Value) -> AppConfig {
    fn section<T: for<'de> Deserialize<'de> + Default>(value: &serde_json::Value, key: &str) -> T {
        let Some(raw) = value.get(key) else {
            return T::default();
        };
        serde_json::from_value(raw.clone()).unwrap_or_else(|err| {
            warn!(section = key, error = %err, "config section rejected; using defaults");
            T::default()
        })
    }
    AppConfig {
        adb: section(value, "adb"),
        acquisition: section(value, "acquisition"),
        filtering: section(value, "filtering"),
        logging: section(value, "logging"),
    }
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

pub fn validate_config(mut config: AppConfig) -> AppConfig {
    let defaults = AcquisitionSettings::default();
    let acquisition = &mut config.acquisition;
    acquisition.max_attempts = acquisition.max_attempts.clamp(1, 10);
    acquisition.retry_delay_ms = acquisition.retry_delay_ms.min(10_000);
    acquisition
        .structured_commands
        .retain(|command| !command.trim().is_empty());
    if acquisition.structured_commands.is_empty() {
        acquisition.structured_commands = defaults.structured_commands;
    }
    if acquisition.text_command.trim().is_empty() {
        acquisition.text_command = defaults.text_command;
    }
    if acquisition.window_command.trim().is_empty() {
        acquisition.window_command = defaults.window_command;
    }
    if acquisition.ime_command.trim().is_empty() {
        acquisition.ime_command = defaults.ime_command;
    }
    if acquisition.screen_size_command.trim().is_empty() {
        acquisition.screen_size_command = defaults.screen_size_command;
    }
    if config.adb.command_timeout_secs == 0 || config.adb.command_timeout_secs > 300 {
        config.adb.command_timeout_secs = 10;
    }
    if !(0..=200).contains(&config.filtering.min_element_size) {
        config.filtering.min_element_size = 5;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = "info".to_string();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from_path(&dir.path().join("absent.json"), "t").expect("load");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.acquisition.structured_commands.len(), 3);
        assert_eq!(config.acquisition.max_attempts, 3);
    }

    #[test]
    fn round_trips_and_keeps_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let backup = dir.path().join("config.backup.json");

        let mut config = AppConfig::default();
        config.adb.command_path = "/opt/adb".to_string();
        save_config_to_path(&config, &path, &backup, "t").expect("first save");
        assert!(!backup.exists());

        config.acquisition.retry_delay_ms = 250;
        save_config_to_path(&config, &path, &backup, "t").expect("second save");
        assert!(backup.exists());

        let loaded = load_config_from_path(&path, "t").expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn bad_section_falls_back_without_losing_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let raw = serde_json::json!({
            "adb": { "command_path": "/custom/adb", "command_timeout_secs": 20 },
            "acquisition": "not an object",
        });
        fs::write(&path, raw.to_string()).expect("write");
        let config = load_config_from_path(&path, "t").expect("load");
        assert_eq!(config.adb.command_path, "/custom/adb");
        assert_eq!(config.adb.command_timeout_secs, 20);
        assert_eq!(config.acquisition, AcquisitionSettings::default());
    }

    #[test]
    fn partial_sections_keep_the_fields_they_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let raw = serde_json::json!({
            "acquisition": { "max_attempts": 7 },
            "adb": { "command_path": "/x/adb" },
            "logging": { "json": true },
        });
        fs::write(&path, raw.to_string()).expect("write");

        let config = load_config_from_path(&path, "t").expect("load");
        assert_eq!(config.acquisition.max_attempts, 7);
        assert_eq!(config.acquisition.retry_delay_ms, 500);
        assert_eq!(config.acquisition.structured_commands.len(), 3);
        assert_eq!(config.adb.command_path, "/x/adb");
        assert_eq!(config.adb.command_timeout_secs, 10);
        assert!(config.logging.json);
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.filtering, FilteringSettings::default());
    }

    #[test]
    fn mistyped_field_rejects_only_its_section() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let raw = serde_json::json!({
            "acquisition": { "max_attempts": "seven", "retry_delay_ms": 100 },
            "filtering": { "min_element_size": 12 },
        });
        fs::write(&path, raw.to_string()).expect("write");

        let config = load_config_from_path(&path, "t").expect("load");
        assert_eq!(config.acquisition, AcquisitionSettings::default());
        assert_eq!(config.filtering.min_element_size, 12);
    }

    #[test]
    fn unparsable_file_is_a_validation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").expect("write");
        let err = load_config_from_path(&path, "trace-x").unwrap_err();
        assert_eq!(err.code, "ERR_VALIDATION");
        assert_eq!(err.trace_id, "trace-x");
    }

    #[test]
    fn clamps_invalid_values() {
        let mut config = AppConfig::default();
        config.acquisition.max_attempts = 0;
        config.acquisition.retry_delay_ms = 60_000;
        config.acquisition.structured_commands = vec!["  ".to_string()];
        config.acquisition.text_command = String::new();
        config.adb.command_timeout_secs = 0;
        config.filtering.min_element_size = -3;
        let validated = validate_config(config);
        assert_eq!(validated.acquisition.max_attempts, 1);
        assert_eq!(validated.acquisition.retry_delay_ms, 10_000);
        assert_eq!(validated.acquisition.structured_commands.len(), 3);
        assert_eq!(validated.acquisition.text_command, "dumpsys activity top");
        assert_eq!(validated.adb.command_timeout_secs, 10);
        assert_eq!(validated.filtering.min_element_size, 5);
    }
}
