use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Subset of UTC weekdays, stored as a bitmask with Sunday in bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: WeekdaySet = WeekdaySet(0);
    pub const SUNDAY: WeekdaySet = WeekdaySet(1 << 0);
    pub const FRIDAY: WeekdaySet = WeekdaySet(1 << 5);
    /// Monday through Thursday.
    pub const MON_THU: WeekdaySet = WeekdaySet(0b0001_1110);
    /// Monday through Friday.
    pub const MON_FRI: WeekdaySet = WeekdaySet(0b0011_1110);

    /// Build a set from day numbers where 0 = Sunday .. 6 = Saturday.
    /// Out-of-range numbers are ignored.
    pub fn from_day_numbers(days: &[u8]) -> Self {
        let bits = days
            .iter()
            .filter(|&&d| d < 7)
            .fold(0u8, |acc, &d| acc | (1 << d));
        WeekdaySet(bits)
    }

    pub fn from_weekdays(days: &[Weekday]) -> Self {
        let bits = days
            .iter()
            .fold(0u8, |acc, d| acc | (1 << d.num_days_from_sunday()));
        WeekdaySet(bits)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Day numbers (0 = Sunday) in ascending order.
    pub fn day_numbers(&self) -> Vec<u8> {
        (0..7u8).filter(|d| self.0 & (1 << d) != 0).collect()
    }
}

/// A weekly recurrence: fire at `hour:minute` UTC on each day in `weekdays`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRule {
    pub utc_hour: u32,
    pub utc_minute: u32,
    pub weekdays: WeekdaySet,
}

impl WeeklyRule {
    /// Create a validated rule.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the hour or minute is out of range.
    pub fn new(utc_hour: u32, utc_minute: u32, weekdays: WeekdaySet) -> Result<Self, EngineError> {
        if utc_hour > 23 || utc_minute > 59 {
            return Err(EngineError::InvalidArgument(format!(
                "time {utc_hour:02}:{utc_minute:02} is not a valid UTC time of day"
            )));
        }
        Ok(Self {
            utc_hour,
            utc_minute,
            weekdays,
        })
    }
}

/// Stable keys for the built-in trading-session boundary alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionId {
    SydneyStart,
    TokyoSydneyOverlap,
    SydneyEnd,
    TokyoLondonFrankfurtOverlap,
    TokyoEnd,
    NyLondonFrankfurtOverlap,
    LondonFrankfurtEnd,
    NyCloseSydneyOpens,
    EndOfWeekNyClose,
}

impl SessionId {
    pub const ALL: [SessionId; 9] = [
        SessionId::SydneyStart,
        SessionId::TokyoSydneyOverlap,
        SessionId::SydneyEnd,
        SessionId::TokyoLondonFrankfurtOverlap,
        SessionId::TokyoEnd,
        SessionId::NyLondonFrankfurtOverlap,
        SessionId::LondonFrankfurtEnd,
        SessionId::NyCloseSydneyOpens,
        SessionId::EndOfWeekNyClose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionId::SydneyStart => "SYDNEY_START",
            SessionId::TokyoSydneyOverlap => "TOKYO_SYDNEY_OVERLAP",
            SessionId::SydneyEnd => "SYDNEY_END",
            SessionId::TokyoLondonFrankfurtOverlap => "TOKYO_LONDON_FRANKFURT_OVERLAP",
            SessionId::TokyoEnd => "TOKYO_END",
            SessionId::NyLondonFrankfurtOverlap => "NY_LONDON_FRANKFURT_OVERLAP",
            SessionId::LondonFrankfurtEnd => "LONDON_FRANKFURT_END",
            SessionId::NyCloseSydneyOpens => "NY_CLOSE_SYDNEY_OPENS",
            SessionId::EndOfWeekNyClose => "END_OF_WEEK_NY_CLOSE",
        }
    }

    /// Alert title shown when the session boundary is reached.
    pub fn title(&self) -> &'static str {
        match self {
            SessionId::SydneyStart => "Start of Sydney session",
            SessionId::TokyoSydneyOverlap => "Tokyo + Sydney overlap",
            SessionId::SydneyEnd => "End of Sydney session",
            SessionId::TokyoLondonFrankfurtOverlap => "Tokyo + London + Frankfurt overlap",
            SessionId::TokyoEnd => "End of Tokyo session",
            SessionId::NyLondonFrankfurtOverlap => "New York + London + Frankfurt overlap",
            SessionId::LondonFrankfurtEnd => "End of London + Frankfurt session",
            SessionId::NyCloseSydneyOpens => "New York close / Sydney opens",
            SessionId::EndOfWeekNyClose => "End of week - New York close",
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::InvalidArgument(format!("unknown session id: {s}")))
    }
}

/// One built-in recurring session alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedSessionRule {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub rule: WeeklyRule,
}

const fn fixed(session_id: SessionId, utc_hour: u32, weekdays: WeekdaySet) -> FixedSessionRule {
    FixedSessionRule {
        session_id,
        rule: WeeklyRule {
            utc_hour,
            utc_minute: 0,
            weekdays,
        },
    }
}

/// The weekly session calendar. Order matches [`SessionId::ALL`].
pub static FIXED_SESSIONS: [FixedSessionRule; 9] = [
    fixed(SessionId::SydneyStart, 21, WeekdaySet::SUNDAY),
    fixed(SessionId::TokyoSydneyOverlap, 0, WeekdaySet::MON_FRI),
    fixed(SessionId::SydneyEnd, 6, WeekdaySet::MON_FRI),
    fixed(SessionId::TokyoLondonFrankfurtOverlap, 7, WeekdaySet::MON_FRI),
    fixed(SessionId::TokyoEnd, 9, WeekdaySet::MON_FRI),
    fixed(SessionId::NyLondonFrankfurtOverlap, 13, WeekdaySet::MON_FRI),
    fixed(SessionId::LondonFrankfurtEnd, 16, WeekdaySet::MON_FRI),
    fixed(SessionId::NyCloseSydneyOpens, 21, WeekdaySet::MON_THU),
    fixed(SessionId::EndOfWeekNyClose, 22, WeekdaySet::FRIDAY),
];

impl FixedSessionRule {
    pub fn find(session_id: SessionId) -> &'static FixedSessionRule {
        // FIXED_SESSIONS is indexed in SessionId::ALL order
        &FIXED_SESSIONS[session_id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_session_id() {
        for id in SessionId::ALL {
            assert_eq!(FixedSessionRule::find(id).session_id, id);
        }
    }

    #[test]
    fn weekday_set_membership() {
        assert!(WeekdaySet::MON_FRI.contains(Weekday::Mon));
        assert!(WeekdaySet::MON_FRI.contains(Weekday::Fri));
        assert!(!WeekdaySet::MON_FRI.contains(Weekday::Sat));
        assert!(!WeekdaySet::MON_THU.contains(Weekday::Fri));
        assert_eq!(WeekdaySet::from_day_numbers(&[1, 2, 3, 4, 5]), WeekdaySet::MON_FRI);
        assert_eq!(WeekdaySet::from_weekdays(&[Weekday::Sun]), WeekdaySet::SUNDAY);
        assert_eq!(WeekdaySet::from_day_numbers(&[0, 9]).day_numbers(), vec![0]);
    }

    #[test]
    fn session_id_parses_case_insensitively() {
        assert_eq!("sydney_start".parse::<SessionId>().unwrap(), SessionId::SydneyStart);
        assert_eq!(
            "END_OF_WEEK_NY_CLOSE".parse::<SessionId>().unwrap(),
            SessionId::EndOfWeekNyClose
        );
        assert!("LONDON_LUNCH".parse::<SessionId>().is_err());
    }

    #[test]
    fn weekly_rule_rejects_out_of_range_time() {
        assert!(WeeklyRule::new(24, 0, WeekdaySet::SUNDAY).is_err());
        assert!(WeeklyRule::new(23, 60, WeekdaySet::SUNDAY).is_err());
        assert!(WeeklyRule::new(23, 59, WeekdaySet::SUNDAY).is_ok());
    }

    #[test]
    fn session_id_serializes_as_stable_key() {
        let json = serde_json::to_string(&SessionId::NyCloseSydneyOpens).unwrap();
        assert_eq!(json, "\"NY_CLOSE_SYDNEY_OPENS\"");
    }
}
