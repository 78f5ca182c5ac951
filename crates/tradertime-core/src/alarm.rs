use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sound::{SoundProfile, DEFAULT_SOUND_ID};

pub const DEFAULT_ALARM_LABEL: &str = "Trader Time Alert";

/// A one-shot user alarm, keyed by its caller-supplied id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRecord {
    pub id: String,
    pub label: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub trigger_at: DateTime<Utc>,
    pub sound_id: String,
}

impl AlarmRecord {
    /// Build a record, substituting the default label and sound for
    /// missing or blank values.
    pub fn new(
        id: impl Into<String>,
        label: Option<&str>,
        trigger_at: DateTime<Utc>,
        sound_id: Option<&str>,
    ) -> Self {
        let label = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_ALARM_LABEL);
        let sound_id = sound_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SOUND_ID);
        Self {
            id: id.into(),
            label: label.to_string(),
            trigger_at,
            sound_id: sound_id.to_string(),
        }
    }

    pub fn trigger_at_ms(&self) -> i64 {
        self.trigger_at.timestamp_millis()
    }

    pub fn sound(&self) -> SoundProfile {
        SoundProfile::resolve(&self.sound_id)
    }
}
