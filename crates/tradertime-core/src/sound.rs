//! Sound profile selection for ringing alarms.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SOUND_ID: &str = "original";

/// Rendering profile for a looped alarm tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundProfile {
    Original,
    Classic,
    Chime,
    Bell,
    Ping,
    Tone,
    /// The host's own default alarm tone.
    SystemDefault,
}

impl SoundProfile {
    /// Resolve a caller-supplied sound id.
    ///
    /// `custom` and the empty string select the host default; anything
    /// unrecognised plays `original`.
    pub fn resolve(sound_id: &str) -> Self {
        match sound_id.trim().to_ascii_lowercase().as_str() {
            "" | "custom" => SoundProfile::SystemDefault,
            "original" => SoundProfile::Original,
            "classic" => SoundProfile::Classic,
            "chime" => SoundProfile::Chime,
            "bell" => SoundProfile::Bell,
            "ping" => SoundProfile::Ping,
            "tone" => SoundProfile::Tone,
            _ => SoundProfile::Original,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SoundProfile::Original => "original",
            SoundProfile::Classic => "classic",
            SoundProfile::Chime => "chime",
            SoundProfile::Bell => "bell",
            SoundProfile::Ping => "ping",
            SoundProfile::Tone => "tone",
            SoundProfile::SystemDefault => "custom",
        }
    }

    /// Bundled resource name, or `None` for the host default tone.
    pub fn resource_name(&self) -> Option<String> {
        match self {
            SoundProfile::SystemDefault => None,
            other => Some(format!("alert_{}", other.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ids_resolve() {
        assert_eq!(SoundProfile::resolve("chime"), SoundProfile::Chime);
        assert_eq!(SoundProfile::resolve("BELL"), SoundProfile::Bell);
        assert_eq!(SoundProfile::resolve("custom"), SoundProfile::SystemDefault);
        assert_eq!(SoundProfile::resolve(""), SoundProfile::SystemDefault);
    }

    #[test]
    fn unknown_ids_fall_back_to_original() {
        assert_eq!(SoundProfile::resolve("alert-03"), SoundProfile::Original);
        assert_eq!(
            SoundProfile::resolve("klaxon").resource_name().as_deref(),
            Some("alert_original")
        );
        assert_eq!(SoundProfile::SystemDefault.resource_name(), None);
    }
}
