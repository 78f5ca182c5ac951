//! TOML-based application configuration.
//!
//! Stores:
//! - Ringing behaviour (fail-safe timeout, vibration waveform)
//! - Alarm defaults (label, sound, snooze length)
//! - Whether the fixed session alerts are armed
//!
//! Configuration is stored at `~/.config/tradertime/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::alarm::DEFAULT_ALARM_LABEL;
use crate::error::ConfigError;
use crate::host::VibrationPattern;
use crate::sound::DEFAULT_SOUND_ID;

/// Ringing session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingingConfig {
    /// Seconds after which a ringing alarm stops itself.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_vibration_pattern")]
    pub vibration_pattern_ms: Vec<u64>,
    /// Index to loop the pattern from; negative plays it once.
    #[serde(default)]
    pub vibration_repeat_index: i64,
}

/// Defaults applied to newly scheduled alarms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmsConfig {
    #[serde(default = "default_label")]
    pub default_label: String,
    #[serde(default = "default_sound")]
    pub default_sound: String,
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/tradertime/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ringing: RingingConfig,
    #[serde(default)]
    pub alarms: AlarmsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_vibration_pattern() -> Vec<u64> {
    VibrationPattern::default().timings_ms
}
fn default_label() -> String {
    DEFAULT_ALARM_LABEL.into()
}
fn default_sound() -> String {
    DEFAULT_SOUND_ID.into()
}
fn default_snooze_minutes() -> u32 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for RingingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            vibration_pattern_ms: default_vibration_pattern(),
            vibration_repeat_index: 0,
        }
    }
}

impl Default for AlarmsConfig {
    fn default() -> Self {
        Self {
            default_label: default_label(),
            default_sound: default_sound(),
            snooze_minutes: default_snooze_minutes(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl RingingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn vibration(&self) -> VibrationPattern {
        let repeat_index = usize::try_from(self.vibration_repeat_index)
            .ok()
            .filter(|&i| i < self.vibration_pattern_ms.len());
        VibrationPattern {
            timings_ms: self.vibration_pattern_ms.clone(),
            repeat_index,
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/tradertime"),
                message: e.to_string(),
            })
    }

    /// Load from disk, writing defaults on first use.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or the
    /// defaults cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    ///
    /// # Errors
    /// Same as [`Config::load`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Load from disk, returning defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key, e.g. `ringing.timeout_secs`.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = key
            .split('.')
            .try_fold(&json, |node, part| node.get(part))?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, parsing it as the type already
    /// stored there. Does not save.
    ///
    /// # Errors
    /// `UnknownKey` for a key that does not exist, `InvalidValue` if the
    /// value does not parse as the existing type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;

        let mut node = &mut json;
        for part in key.split('.') {
            node = node
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }
        if node.is_object() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        *node = if node.is_string() {
            serde_json::Value::String(value.to_string())
        } else {
            serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
        };

        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.ringing.timeout(), Duration::from_secs(120));
        assert_eq!(parsed.alarms.snooze_minutes, 60);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str("[ringing]\ntimeout_secs = 30\n").unwrap();
        assert_eq!(parsed.ringing.timeout_secs, 30);
        assert_eq!(parsed.ringing.vibration_pattern_ms, vec![0, 1000, 500, 1000, 500]);
        assert_eq!(parsed.alarms.default_label, "Trader Time Alert");
        assert!(parsed.sessions.enabled);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("ringing.timeout_secs").as_deref(), Some("120"));
        assert_eq!(cfg.get("alarms.default_sound").as_deref(), Some("original"));
        assert!(cfg.get("alarms.missing").is_none());
    }

    #[test]
    fn set_parses_existing_type() {
        let mut cfg = Config::default();
        cfg.set("sessions.enabled", "false").unwrap();
        cfg.set("alarms.snooze_minutes", "10").unwrap();
        cfg.set("alarms.default_sound", "bell").unwrap();
        cfg.set("ringing.vibration_pattern_ms", "[0, 250]").unwrap();
        assert!(!cfg.sessions.enabled);
        assert_eq!(cfg.alarms.snooze_minutes, 10);
        assert_eq!(cfg.alarms.default_sound, "bell");
        assert_eq!(cfg.ringing.vibration_pattern_ms, vec![0, 250]);
    }

    #[test]
    fn set_rejects_unknown_and_malformed() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.set("ringing.volume", "3"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(cfg.set("ringing", "3"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(
            cfg.set("ringing.timeout_secs", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn negative_repeat_index_plays_once() {
        let mut cfg = Config::default();
        cfg.ringing.vibration_repeat_index = -1;
        assert_eq!(cfg.ringing.vibration().repeat_index, None);
        assert_eq!(Config::default().ringing.vibration().repeat_index, Some(0));
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn load_from_unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::create_dir(&path).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::LoadFailed { .. }));
        assert!(path.is_dir());
    }
}
