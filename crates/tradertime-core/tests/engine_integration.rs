//! Integration tests for the alarm engine façade.
//!
//! These drive the engine end to end against the recording host: schedule,
//! wake delivery, ringing, every stop source and the fixed session chain.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use tokio::runtime::Handle;

use tradertime_core::error::DatabaseError;
use tradertime_core::host::recording::{
    ManualClock, RecordingAlerts, RecordingTonePlayer, RecordingVibrator, RecordingWakeHost,
};
use tradertime_core::ringing::RingingState;
use tradertime_core::wake::{FiredDisposition, WakePrecision};
use tradertime_core::{
    AlarmEngine, AlarmRecord, AlarmRegistry, AlarmStore, Clock, EngineHost, EngineSettings, Event,
    ScheduleRequest, SessionId, StopReason, WakeKey,
};

struct Harness {
    wake: Arc<RecordingWakeHost>,
    alerts: Arc<RecordingAlerts>,
    tone: Arc<RecordingTonePlayer>,
    vibrator: Arc<RecordingVibrator>,
    clock: Arc<ManualClock>,
    engine: Arc<AlarmEngine>,
}

impl Harness {
    fn new(exact: bool, store: Arc<dyn AlarmStore>, handle: Handle) -> Self {
        let wake = Arc::new(RecordingWakeHost::new(exact));
        let alerts = Arc::new(RecordingAlerts::new());
        let tone = Arc::new(RecordingTonePlayer::new());
        let vibrator = Arc::new(RecordingVibrator::new());
        // Wednesday
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap(),
        ));
        let engine = AlarmEngine::new(
            EngineHost {
                wake: wake.clone(),
                alerts: alerts.clone(),
                tone: tone.clone(),
                vibrator: vibrator.clone(),
                clock: clock.clone(),
            },
            store,
            EngineSettings::default(),
            handle,
        );
        Self {
            wake,
            alerts,
            tone,
            vibrator,
            clock,
            engine,
        }
    }

    fn with_memory_store(exact: bool) -> Self {
        Self::new(
            exact,
            Arc::new(AlarmRegistry::open_memory().unwrap()),
            Handle::current(),
        )
    }

    fn at(&self, minutes: i64) -> i64 {
        (self.clock.now() + Duration::minutes(minutes)).timestamp_millis()
    }

    fn fire_alarm(&self, id: &str) {
        let fired = self.wake.fire(&WakeKey::Alarm(id.into())).unwrap();
        self.clock.set(fired.scheduled_at);
        self.engine.handle_wake(fired);
    }
}

/// A store whose writes always fail.
struct BrokenStore;

impl AlarmStore for BrokenStore {
    fn put(&self, _record: &AlarmRecord) -> Result<(), DatabaseError> {
        Err(DatabaseError::Locked)
    }
    fn remove(&self, _id: &str) -> Result<(), DatabaseError> {
        Err(DatabaseError::Locked)
    }
    fn get(&self, _id: &str) -> Result<Option<AlarmRecord>, DatabaseError> {
        Ok(None)
    }
    fn list_all(&self) -> Result<Vec<AlarmRecord>, DatabaseError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_cancel_twice_succeeds() {
    let h = Harness::with_memory_store(true);
    h.engine.schedule(ScheduleRequest::new("a1", h.at(10)));

    assert!(h.engine.cancel("a1").success);
    assert!(h.engine.cancel("a1").success);
    assert!(h.engine.cancel("never-scheduled").success);
    assert!(h.wake.armed_all().is_empty());
    assert!(h.engine.store().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_reschedule_keeps_original_alarm() {
    let h = Harness::with_memory_store(true);
    let t1 = h.at(10);
    assert!(h.engine.schedule(ScheduleRequest::new("a1", t1)).success);

    h.wake.fail_next_arm("alarm service unavailable");
    let result = h.engine.schedule(ScheduleRequest::new("a1", h.at(20)));
    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("Host"));

    let key = WakeKey::Alarm("a1".into());
    assert_eq!(h.wake.armed_count(&key), 1);
    assert_eq!(h.wake.armed(&key).unwrap().request.at.timestamp_millis(), t1);
    assert_eq!(h.engine.pending_wake(&key).unwrap().at.timestamp_millis(), t1);
    assert_eq!(h.engine.store().get("a1").unwrap().unwrap().trigger_at_ms(), t1);

    h.fire_alarm("a1");
    assert_eq!(h.engine.current_ringing().unwrap().alarm_id, "a1");
}

#[tokio::test]
async fn test_late_session_delivery_after_cancel_all_does_not_rearm() {
    let h = Harness::with_memory_store(true);
    h.engine.arm_all_fixed_sessions();
    let key = WakeKey::Session(SessionId::TokyoEnd);
    let fired = h.wake.fire(&key).unwrap();
    h.engine.cancel_all_fixed_sessions();

    h.clock.set(fired.scheduled_at);
    h.engine.handle_wake(fired);

    assert!(h.engine.pending_wakes().is_empty());
    assert!(h.wake.armed_all().is_empty());
    let titles: Vec<String> = h.alerts.presented().into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec![SessionId::TokyoEnd.title()]);
    assert!(!h
        .engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::SessionRearmed { .. })));
}

#[tokio::test]
async fn test_replayed_alarm_delivery_does_not_ring_again() {
    let h = Harness::with_memory_store(true);
    h.engine.schedule(ScheduleRequest::new("a1", h.at(1)));
    let fired = h.wake.fire(&WakeKey::Alarm("a1".into())).unwrap();
    h.clock.set(fired.scheduled_at);

    assert_eq!(h.engine.handle_wake(fired.clone()), FiredDisposition::Current);
    assert!(h.engine.stop_ringing().success);
    assert!(h.engine.current_ringing().is_none());

    assert_eq!(h.engine.handle_wake(fired), FiredDisposition::Duplicate);
    assert!(h.engine.current_ringing().is_none());
    assert_eq!(h.tone.played().len(), 1);
    assert_eq!(h.tone.stop_calls(), 1);
}

#[tokio::test]
async fn test_cancel_requires_id() {
    let h = Harness::with_memory_store(true);
    let result = h.engine.cancel("");
    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("InvalidArgument"));
}

#[tokio::test]
async fn test_reschedule_replaces_pending_wake() {
    let h = Harness::with_memory_store(true);
    let t1 = h.at(10);
    let t2 = h.at(20);
    h.engine.schedule(ScheduleRequest::new("a1", t1));
    h.engine.schedule(ScheduleRequest::new("a1", t2).with_label("moved"));

    let key = WakeKey::Alarm("a1".into());
    assert_eq!(h.wake.armed_count(&key), 1);
    assert_eq!(h.wake.armed(&key).unwrap().request.at.timestamp_millis(), t2);

    let stored = h.engine.store().list_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].label, "moved");
    assert_eq!(stored[0].trigger_at_ms(), t2);
}

#[tokio::test]
async fn test_past_trigger_arms_nothing() {
    let h = Harness::with_memory_store(true);
    let now = h.at(0);
    let result = h.engine.schedule(ScheduleRequest::new("a1", now - 1000));

    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("InvalidTrigger"));
    assert!(h.wake.armed_all().is_empty());
    assert!(h.engine.drain_events().is_empty());

    let exactly_now = h.engine.schedule(ScheduleRequest::new("a1", now));
    assert_eq!(exactly_now.error_kind.as_deref(), Some("InvalidTrigger"));
}

#[tokio::test]
async fn test_missing_permission_is_degraded_success() {
    let h = Harness::with_memory_store(false);
    assert!(!h.engine.can_schedule_exact().can_schedule);

    let result = h.engine.schedule(ScheduleRequest::new("a1", h.at(10)));
    assert!(result.success);
    assert!(result.is_degraded());
    assert_eq!(
        h.wake.armed(&WakeKey::Alarm("a1".into())).unwrap().precision,
        WakePrecision::BestEffort
    );

    h.wake.set_exact_permitted(true);
    assert!(h.engine.can_schedule_exact().can_schedule);
    let result = h.engine.schedule(ScheduleRequest::new("a2", h.at(10)));
    assert_eq!(result.degraded, Some(false));
}

#[tokio::test]
async fn test_store_failure_disarms_wake() {
    let h = Harness::new(true, Arc::new(BrokenStore), Handle::current());
    let result = h.engine.schedule(ScheduleRequest::new("a1", h.at(10)));

    assert!(!result.success);
    assert_eq!(result.error_kind.as_deref(), Some("Database"));
    assert!(h.wake.armed_all().is_empty());
    assert!(h.engine.pending_wakes().is_empty());
}

#[tokio::test]
async fn test_unknown_sound_falls_back_to_original() {
    let h = Harness::with_memory_store(true);
    h.engine
        .schedule(ScheduleRequest::new("a1", h.at(1)).with_sound("kazoo"));
    h.fire_alarm("a1");
    assert_eq!(
        h.tone.played(),
        vec![tradertime_core::SoundProfile::Original]
    );
}

#[tokio::test(start_paused = true)]
async fn test_untouched_alarm_stops_after_fail_safe() {
    let h = Harness::with_memory_store(true);
    h.engine.schedule(ScheduleRequest::new("a1", h.at(1)));
    h.fire_alarm("a1");
    assert_eq!(h.engine.current_ringing().unwrap().state, RingingState::Ringing);

    tokio::time::sleep(StdDuration::from_secs(121)).await;

    assert!(h.engine.current_ringing().is_none());
    assert_eq!(h.tone.stop_calls(), 1);
    assert_eq!(h.vibrator.cancel_calls(), 1);
    let stopped: Vec<StopReason> = h
        .engine
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::RingingStopped { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(stopped, vec![StopReason::Timeout]);
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_cancels_fail_safe() {
    let h = Harness::with_memory_store(true);
    h.engine.schedule(ScheduleRequest::new("a1", h.at(1)));
    h.fire_alarm("a1");
    h.engine.request_stop(StopReason::AlertAction);

    // A second alarm rings for the same id before the old fail-safe would
    // have expired; nothing from the first session may stop it.
    h.engine.schedule(ScheduleRequest::new("a1", h.at(1)));
    h.fire_alarm("a1");
    tokio::time::sleep(StdDuration::from_secs(90)).await;
    assert_eq!(h.engine.current_ringing().unwrap().state, RingingState::Ringing);

    tokio::time::sleep(StdDuration::from_secs(40)).await;
    assert!(h.engine.current_ringing().is_none());
}

#[test]
fn test_concurrent_stop_sources_tear_down_once() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap();
    let h = Harness::new(
        true,
        Arc::new(AlarmRegistry::open_memory().unwrap()),
        runtime.handle().clone(),
    );
    h.engine.schedule(ScheduleRequest::new("a1", h.at(1)));
    h.fire_alarm("a1");
    h.engine.drain_events();

    let sources = [
        StopReason::AlertAction,
        StopReason::HardwareKey,
        StopReason::External,
        StopReason::Timeout,
    ];
    let barrier = Arc::new(std::sync::Barrier::new(sources.len() * 4));
    let threads: Vec<_> = (0..sources.len() * 4)
        .map(|i| {
            let engine = h.engine.clone();
            let barrier = barrier.clone();
            let reason = sources[i % sources.len()];
            std::thread::spawn(move || {
                barrier.wait();
                assert!(engine.request_stop(reason).success);
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(h.tone.stop_calls(), 1);
    assert_eq!(h.vibrator.cancel_calls(), 1);
    assert_eq!(h.alerts.updates().len(), 1);
    assert_eq!(h.alerts.full_screen_closes(), 1);
    let stops = h
        .engine
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::RingingStopped { .. }))
        .count();
    assert_eq!(stops, 1);
}

#[tokio::test]
async fn test_sunday_session_chain_over_a_week() {
    let h = Harness::with_memory_store(true);
    h.engine.arm_all_fixed_sessions();
    let key = WakeKey::Session(SessionId::SydneyStart);

    let mut fired_at: Vec<DateTime<Utc>> = Vec::new();
    for _ in 0..3 {
        let fired = h.wake.fire(&key).unwrap();
        h.clock.set(fired.scheduled_at);
        fired_at.push(fired.scheduled_at);
        h.engine.handle_wake(fired);
        assert_eq!(h.wake.armed_count(&key), 1);
    }

    assert_eq!(
        fired_at[0],
        Utc.with_ymd_and_hms(2026, 10, 18, 21, 0, 0).unwrap()
    );
    for pair in fired_at.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::days(7));
    }
    assert!(fired_at.iter().all(|t| t.weekday() == Weekday::Sun));

    let titles: Vec<String> = h.alerts.presented().into_iter().map(|a| a.title).collect();
    assert_eq!(titles, vec!["Start of Sydney session"; 3]);
}

#[tokio::test]
async fn test_session_alerts_do_not_touch_ringing() {
    let h = Harness::with_memory_store(true);
    h.engine.schedule(ScheduleRequest::new("a1", h.at(1)));
    h.fire_alarm("a1");
    h.engine.arm_all_fixed_sessions();

    let fired = h
        .wake
        .fire(&WakeKey::Session(SessionId::NyLondonFrankfurtOverlap))
        .unwrap();
    h.clock.set(fired.scheduled_at);
    h.engine.handle_wake(fired);

    assert_eq!(h.engine.current_ringing().unwrap().alarm_id, "a1");
    assert_eq!(h.tone.playing_count(), 1);
}
