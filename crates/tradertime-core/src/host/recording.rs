//! In-memory host implementations that record every call.
//!
//! Used by the unit and integration tests, and handy for dry runs of the
//! engine without a real platform underneath.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::{Alert, AlertPresenter, Clock, ToneHandle, TonePlayer, VibrationPattern, Vibrator};
use crate::error::HostError;
use crate::sound::SoundProfile;
use crate::wake::{FiredWake, WakeHandle, WakeHost, WakeKey, WakePrecision, WakeRequest};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A clock the test moves by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// One wake the recording host currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedWake {
    pub request: WakeRequest,
    pub handle: WakeHandle,
    pub precision: WakePrecision,
}

#[derive(Debug)]
pub struct RecordingWakeHost {
    exact_permitted: AtomicBool,
    next_handle: AtomicU64,
    armed: Mutex<Vec<ArmedWake>>,
    disarm_calls: AtomicUsize,
    fail_next_arm: Mutex<Option<String>>,
}

impl RecordingWakeHost {
    pub fn new(exact_permitted: bool) -> Self {
        Self {
            exact_permitted: AtomicBool::new(exact_permitted),
            next_handle: AtomicU64::new(1),
            armed: Mutex::new(Vec::new()),
            disarm_calls: AtomicUsize::new(0),
            fail_next_arm: Mutex::new(None),
        }
    }

    pub fn set_exact_permitted(&self, permitted: bool) {
        self.exact_permitted.store(permitted, Ordering::SeqCst);
    }

    /// Make the next arm call fail with `message`.
    pub fn fail_next_arm(&self, message: &str) {
        *lock(&self.fail_next_arm) = Some(message.to_string());
    }

    /// Number of live wakes armed for `key`.
    pub fn armed_count(&self, key: &WakeKey) -> usize {
        lock(&self.armed).iter().filter(|w| &w.request.key == key).count()
    }

    pub fn armed(&self, key: &WakeKey) -> Option<ArmedWake> {
        lock(&self.armed)
            .iter()
            .rev()
            .find(|w| &w.request.key == key)
            .cloned()
    }

    pub fn armed_all(&self) -> Vec<ArmedWake> {
        lock(&self.armed).clone()
    }

    pub fn disarm_calls(&self) -> usize {
        self.disarm_calls.load(Ordering::SeqCst)
    }

    /// Fire the wake armed for `key`, as the host would at its instant.
    pub fn fire(&self, key: &WakeKey) -> Option<FiredWake> {
        let mut armed = lock(&self.armed);
        let index = armed.iter().position(|w| &w.request.key == key)?;
        let wake = armed.remove(index);
        Some(FiredWake::from_request(&wake.request, wake.handle))
    }

    /// Fire every wake due at or before `now`, earliest first.
    pub fn fire_due(&self, now: DateTime<Utc>) -> Vec<FiredWake> {
        let mut armed = lock(&self.armed);
        let (mut due, rest): (Vec<ArmedWake>, Vec<ArmedWake>) =
            armed.drain(..).partition(|w| w.request.at <= now);
        *armed = rest;
        due.sort_by_key(|w| w.request.at);
        due.iter()
            .map(|w| FiredWake::from_request(&w.request, w.handle))
            .collect()
    }

    fn arm(&self, request: &WakeRequest, precision: WakePrecision) -> Result<WakeHandle, HostError> {
        if let Some(message) = lock(&self.fail_next_arm).take() {
            return Err(HostError::ArmFailed {
                key: request.key.to_string(),
                message,
            });
        }
        let handle = WakeHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        lock(&self.armed).push(ArmedWake {
            request: request.clone(),
            handle,
            precision,
        });
        Ok(handle)
    }
}

impl WakeHost for RecordingWakeHost {
    fn can_schedule_exact(&self) -> bool {
        self.exact_permitted.load(Ordering::SeqCst)
    }

    fn arm_exact(&self, request: &WakeRequest) -> Result<WakeHandle, HostError> {
        self.arm(request, WakePrecision::Exact)
    }

    fn arm_best_effort(&self, request: &WakeRequest) -> Result<WakeHandle, HostError> {
        self.arm(request, WakePrecision::BestEffort)
    }

    fn disarm(&self, handle: WakeHandle) -> Result<(), HostError> {
        self.disarm_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.armed).retain(|w| w.handle != handle);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertCall {
    Present(Alert),
    Update(Alert),
    Dismiss(String),
    CloseFullScreen(String),
}

#[derive(Debug, Default)]
pub struct RecordingAlerts {
    calls: Mutex<Vec<AlertCall>>,
    fail_present: AtomicBool,
    fail_present_prefix: Mutex<Option<String>>,
    fail_update: AtomicBool,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_present(&self, fail: bool) {
        self.fail_present.store(fail, Ordering::SeqCst);
    }

    /// Refuse to present only alerts whose id starts with `prefix`.
    pub fn set_fail_present_for(&self, prefix: &str) {
        *lock(&self.fail_present_prefix) = Some(prefix.to_string());
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<AlertCall> {
        lock(&self.calls).clone()
    }

    pub fn presented(&self) -> Vec<Alert> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AlertCall::Present(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<Alert> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AlertCall::Update(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    pub fn full_screen_closes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, AlertCall::CloseFullScreen(_)))
            .count()
    }
}

impl AlertPresenter for RecordingAlerts {
    fn present(&self, alert: &Alert) -> Result<(), HostError> {
        let refused = self.fail_present.load(Ordering::SeqCst)
            || lock(&self.fail_present_prefix)
                .as_deref()
                .is_some_and(|prefix| alert.alert_id.starts_with(prefix));
        if refused {
            return Err(HostError::Alert {
                alert_id: alert.alert_id.clone(),
                message: "presentation refused".into(),
            });
        }
        lock(&self.calls).push(AlertCall::Present(alert.clone()));
        Ok(())
    }

    fn update(&self, alert: &Alert) -> Result<(), HostError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(HostError::Alert {
                alert_id: alert.alert_id.clone(),
                message: "update refused".into(),
            });
        }
        lock(&self.calls).push(AlertCall::Update(alert.clone()));
        Ok(())
    }

    fn dismiss(&self, alert_id: &str) -> Result<(), HostError> {
        lock(&self.calls).push(AlertCall::Dismiss(alert_id.to_string()));
        Ok(())
    }

    fn close_full_screen(&self, alarm_id: &str) -> Result<(), HostError> {
        lock(&self.calls).push(AlertCall::CloseFullScreen(alarm_id.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingTonePlayer {
    next_handle: AtomicU64,
    playing: Mutex<HashSet<u64>>,
    played: Mutex<Vec<SoundProfile>>,
    stop_calls: AtomicUsize,
    fail_play: AtomicBool,
    fail_stop: AtomicBool,
}

impl RecordingTonePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<SoundProfile> {
        lock(&self.played).clone()
    }

    pub fn playing_count(&self) -> usize {
        lock(&self.playing).len()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl TonePlayer for RecordingTonePlayer {
    fn play_looped(&self, profile: SoundProfile) -> Result<ToneHandle, HostError> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(HostError::Tone(format!("cannot open {}", profile.as_str())));
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock(&self.playing).insert(handle);
        lock(&self.played).push(profile);
        Ok(ToneHandle(handle))
    }

    fn stop(&self, handle: ToneHandle) -> Result<(), HostError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(HostError::Tone("player already released".into()));
        }
        lock(&self.playing).remove(&handle.0);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingVibrator {
    vibrate_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    fail_vibrate: AtomicBool,
}

impl RecordingVibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_vibrate(&self, fail: bool) {
        self.fail_vibrate.store(fail, Ordering::SeqCst);
    }

    pub fn vibrate_calls(&self) -> usize {
        self.vibrate_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl Vibrator for RecordingVibrator {
    fn vibrate(&self, _pattern: &VibrationPattern) -> Result<(), HostError> {
        if self.fail_vibrate.load(Ordering::SeqCst) {
            return Err(HostError::Vibration("no vibrator".into()));
        }
        self.vibrate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn cancel(&self) -> Result<(), HostError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
