use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ringing::StopReason;
use crate::sessions::SessionId;

/// Every state change in the engine produces an Event.
/// Frontends drain them with [`crate::engine::AlarmEngine::drain_events`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    AlarmScheduled {
        alarm_id: String,
        trigger_at: DateTime<Utc>,
        /// Armed best-effort because exact wakes are not permitted.
        degraded: bool,
        at: DateTime<Utc>,
    },
    AlarmCancelled {
        alarm_id: String,
        at: DateTime<Utc>,
    },
    AlarmSnoozed {
        alarm_id: String,
        until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    RingingStarted {
        alarm_id: String,
        label: String,
        sound_id: String,
        at: DateTime<Utc>,
    },
    RingingStopped {
        alarm_id: String,
        reason: StopReason,
        at: DateTime<Utc>,
    },
    /// Ringing could not start; a notification-only alert was posted instead.
    FallbackAlertPosted {
        alarm_id: String,
        error: String,
        at: DateTime<Utc>,
    },
    SessionAlertPosted {
        session_id: SessionId,
        title: String,
        at: DateTime<Utc>,
    },
    /// A fixed session armed its own next occurrence after firing.
    SessionRearmed {
        session_id: SessionId,
        next_at: DateTime<Utc>,
        degraded: bool,
        at: DateTime<Utc>,
    },
    /// A delivered wake was replaced before it arrived.
    WakeIgnored {
        key: String,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let at = DateTime::from_timestamp(1_760_000_000, 0).unwrap();
        let event = Event::RingingStopped {
            alarm_id: "a1".into(),
            reason: StopReason::HardwareKey,
            at,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RingingStopped");
        assert_eq!(json["reason"], "hardware_key");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
