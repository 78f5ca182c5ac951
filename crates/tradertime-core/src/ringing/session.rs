//! Ringing session state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Ringing -> Stopping -> Stopped
//! ```
//!
//! Stop requests can arrive from any thread: the alert's Stop action, an
//! intercepted hardware key, the façade's `stop_ringing`, or the fail-safe
//! timer. A single compare-and-swap on `stopped` picks the one caller that
//! performs teardown; every other caller returns without side effects.
//!
//! A stopped session is never restarted. A new firing builds a new session.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alarm::AlarmRecord;
use crate::error::HostError;
use crate::host::{
    Alert, AlertAction, AlertActionKind, AlertPresenter, AlertPriority, ToneHandle, TonePlayer,
    VibrationPattern, Vibrator,
};
use crate::sound::SoundProfile;

const RINGING_TITLE: &str = "Trader Time Alert";
const STOPPED_TITLE: &str = "Alarm stopped";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RingingState {
    Idle = 0,
    Ringing = 1,
    Stopping = 2,
    Stopped = 3,
}

impl RingingState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RingingState::Idle,
            1 => RingingState::Ringing,
            2 => RingingState::Stopping,
            _ => RingingState::Stopped,
        }
    }
}

/// Which signal asked the session to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The sticky alert's Stop action.
    AlertAction,
    /// A volume/power key caught by the key listener.
    HardwareKey,
    /// An explicit `stop_ringing` call.
    External,
    /// The fail-safe timer expired.
    Timeout,
    /// Stopped so the alarm can be re-armed later.
    Snooze,
    /// Another alarm fired and took over the slot.
    Superseded,
}

/// Host capabilities a ringing session drives.
#[derive(Clone)]
pub struct RingingHost {
    pub alerts: Arc<dyn AlertPresenter>,
    pub tone: Arc<dyn TonePlayer>,
    pub vibrator: Arc<dyn Vibrator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingingSettings {
    pub timeout: Duration,
    pub vibration: VibrationPattern,
    pub snooze_minutes: u32,
}

impl Default for RingingSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            vibration: VibrationPattern::default(),
            snooze_minutes: 60,
        }
    }
}

/// Runs once, after teardown, on the thread that won the stop race.
pub type StopHook = Box<dyn Fn(&RingingSession, StopReason) + Send + Sync>;

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingingSnapshot {
    pub alarm_id: String,
    pub label: String,
    pub sound_id: String,
    pub state: RingingState,
}

#[derive(Default)]
struct Resources {
    alert_posted: bool,
    tone: Option<ToneHandle>,
    vibrating: bool,
    fail_safe: Option<JoinHandle<()>>,
}

pub struct RingingSession {
    record: AlarmRecord,
    sound: SoundProfile,
    stopped: AtomicBool,
    state: AtomicU8,
    resources: Mutex<Resources>,
    host: RingingHost,
    settings: RingingSettings,
    on_stop: Option<StopHook>,
}

impl RingingSession {
    pub fn new(
        record: AlarmRecord,
        host: RingingHost,
        settings: RingingSettings,
        on_stop: Option<StopHook>,
    ) -> Arc<Self> {
        let sound = record.sound();
        Arc::new(Self {
            record,
            sound,
            stopped: AtomicBool::new(false),
            state: AtomicU8::new(RingingState::Idle as u8),
            resources: Mutex::new(Resources::default()),
            host,
            settings,
            on_stop,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn alarm_id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &AlarmRecord {
        &self.record
    }

    pub fn state(&self) -> RingingState {
        RingingState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether the fail-safe timer is still armed.
    pub fn fail_safe_armed(&self) -> bool {
        self.lock_resources()
            .fail_safe
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn snapshot(&self) -> RingingSnapshot {
        RingingSnapshot {
            alarm_id: self.record.id.clone(),
            label: self.record.label.clone(),
            sound_id: self.record.sound_id.clone(),
            state: self.state(),
        }
    }

    pub fn alert_id(&self) -> String {
        format!("ringing:{}", self.record.id)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Idle -> Ringing: post the sticky alert, start tone and vibration,
    /// arm the fail-safe timer on `runtime`.
    ///
    /// Does nothing if the session was stopped before it started. Tone or
    /// vibration failures are logged and ringing continues without them.
    ///
    /// # Errors
    /// Returns the host error if the sticky alert cannot be presented; the
    /// session is then terminal and nothing else was started.
    pub fn start(self: &Arc<Self>, runtime: &Handle) -> Result<(), HostError> {
        let mut res = self.lock_resources();
        if self.is_stopped() {
            debug!(alarm_id = %self.record.id, "stop arrived before start");
            return Ok(());
        }
        if self
            .state
            .compare_exchange(
                RingingState::Idle as u8,
                RingingState::Ringing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        if let Err(e) = self.host.alerts.present(&self.ringing_alert()) {
            self.stopped.store(true, Ordering::Release);
            self.state.store(RingingState::Stopped as u8, Ordering::Release);
            return Err(e);
        }
        res.alert_posted = true;

        match self.host.tone.play_looped(self.sound) {
            Ok(handle) => res.tone = Some(handle),
            Err(e) => warn!(alarm_id = %self.record.id, error = %e, "failed to start alarm tone"),
        }

        match self.host.vibrator.vibrate(&self.settings.vibration) {
            Ok(()) => res.vibrating = true,
            Err(e) => warn!(alarm_id = %self.record.id, error = %e, "failed to start vibration"),
        }

        let weak = Arc::downgrade(self);
        let timeout = self.settings.timeout;
        res.fail_safe = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(session) = weak.upgrade() {
                warn!(
                    alarm_id = %session.record.id,
                    "alarm auto-stopped after {} seconds",
                    timeout.as_secs()
                );
                session.request_stop(StopReason::Timeout);
            }
        }));

        info!(alarm_id = %self.record.id, sound = self.sound.as_str(), "alarm ringing");
        Ok(())
    }

    /// Ringing -> Stopping -> Stopped.
    ///
    /// Returns `true` for the single caller that performed teardown and
    /// `false` for every other caller.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(alarm_id = %self.record.id, ?reason, "already stopped");
            return false;
        }
        self.state.store(RingingState::Stopping as u8, Ordering::Release);

        self.teardown();

        self.state.store(RingingState::Stopped as u8, Ordering::Release);
        info!(alarm_id = %self.record.id, ?reason, "alarm stopped");

        if let Some(hook) = &self.on_stop {
            hook(self, reason);
        }
        true
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Each step runs even if an earlier one failed.
    fn teardown(&self) {
        let mut res = self.lock_resources();
        let id = &self.record.id;

        // On timeout this runs inside the task being aborted; it never
        // yields again, so the abort has no effect there.
        if let Some(task) = res.fail_safe.take() {
            task.abort();
        }

        if let Some(handle) = res.tone.take() {
            if let Err(e) = self.host.tone.stop(handle) {
                warn!(alarm_id = %id, error = %e, "failed to stop alarm tone");
            }
        }

        if std::mem::take(&mut res.vibrating) {
            if let Err(e) = self.host.vibrator.cancel() {
                warn!(alarm_id = %id, error = %e, "failed to cancel vibration");
            }
        }

        if std::mem::take(&mut res.alert_posted) {
            if let Err(e) = self.host.alerts.update(&self.stopped_alert()) {
                warn!(alarm_id = %id, error = %e, "failed to downgrade ringing alert");
            }
            if let Err(e) = self.host.alerts.close_full_screen(id) {
                warn!(alarm_id = %id, error = %e, "failed to close full-screen alert");
            }
        }
    }

    fn ringing_alert(&self) -> Alert {
        Alert {
            alert_id: self.alert_id(),
            title: RINGING_TITLE.into(),
            body: self.record.label.clone(),
            actions: vec![
                AlertAction {
                    kind: AlertActionKind::Stop,
                    label: "Stop".into(),
                },
                AlertAction {
                    kind: AlertActionKind::Snooze,
                    label: format!("Snooze {}m", self.settings.snooze_minutes),
                },
            ],
            priority: AlertPriority::Max,
            sticky: true,
            full_screen: true,
        }
    }

    fn stopped_alert(&self) -> Alert {
        Alert {
            alert_id: self.alert_id(),
            title: STOPPED_TITLE.into(),
            body: self.record.label.clone(),
            actions: Vec::new(),
            priority: AlertPriority::High,
            sticky: false,
            full_screen: false,
        }
    }

    fn lock_resources(&self) -> MutexGuard<'_, Resources> {
        self.resources.lock().unwrap_or_else(|e| e.into_inner())
    }
}
