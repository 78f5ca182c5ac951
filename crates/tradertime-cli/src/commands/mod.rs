pub mod alarm;
pub mod config;
pub mod run;
pub mod session;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::runtime::Handle;
use tradertime_core::wake::WakeHost;
use tradertime_core::{AlarmEngine, AlarmRegistry, Config, EngineHost, EngineSettings, SystemClock};

use crate::host::{ConsoleAlerts, LogVibrator, TerminalBell};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Build an engine over the on-disk registry and the terminal host.
pub(crate) fn open_engine(
    wake: Arc<dyn WakeHost>,
    config: &Config,
    runtime: Handle,
) -> Result<Arc<AlarmEngine>, Box<dyn std::error::Error>> {
    let store = Arc::new(AlarmRegistry::open()?);
    let host = EngineHost {
        wake,
        alerts: Arc::new(ConsoleAlerts),
        tone: Arc::new(TerminalBell::new(runtime.clone())),
        vibrator: Arc::new(LogVibrator),
        clock: Arc::new(SystemClock),
    };
    Ok(AlarmEngine::new(
        host,
        store,
        EngineSettings::from_config(config),
        runtime,
    ))
}

/// Parse an instant given as RFC 3339 or epoch milliseconds.
pub(crate) fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ms) = s.trim().parse::<i64>() {
        return DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| format!("epoch milliseconds out of range: {s}"));
    }
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid instant '{s}': {e}"))
}

pub(crate) fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_and_epoch_ms() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 14, 13, 0, 0).unwrap();
        assert_eq!(parse_instant("2026-10-14T13:00:00Z").unwrap(), expected);
        assert_eq!(parse_instant("2026-10-14T22:00:00+09:00").unwrap(), expected);
        assert_eq!(
            parse_instant(&expected.timestamp_millis().to_string()).unwrap(),
            expected
        );
        assert!(parse_instant("tomorrow").is_err());
    }

    #[test]
    fn formats_with_zulu_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 21, 0, 0).unwrap();
        assert_eq!(format_instant(at), "2026-10-18T21:00:00Z");
    }
}
