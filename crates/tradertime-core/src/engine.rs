//! The alarm engine façade.
//!
//! Composes the wake scheduler, the durable alarm store and the ringing
//! state machine behind one-way bridge calls. Public operations never
//! return an error or panic; failures are folded into [`OperationResult`].
//!
//! ## Usage
//!
//! ```ignore
//! let engine = AlarmEngine::new(host, store, EngineSettings::from_config(&cfg), handle);
//! engine.schedule(ScheduleRequest::new("a1", at_ms));
//! // Host delivers the wake:
//! engine.handle_wake(fired);
//! for event in engine.drain_events() { /* ... */ }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::alarm::AlarmRecord;
use crate::error::{EngineError, HostError, Result};
use crate::events::Event;
use crate::host::{Alert, AlertPresenter, AlertPriority, Clock, TonePlayer, Vibrator};
use crate::ringing::{
    RingingHost, RingingSession, RingingSettings, RingingSlot, RingingSnapshot, StopHook,
    StopReason,
};
use crate::sessions::{next_occurrence, FixedSessionRule, SessionId, FIXED_SESSIONS};
use crate::storage::{AlarmStore, Config};
use crate::wake::{
    ExactWakeScheduler, FiredDisposition, FiredWake, PendingWake, WakeHost, WakeKey, WakePayload,
    WakePrecision,
};

const FALLBACK_TITLE: &str = "Trader Time Alert";
const SESSION_ALERT_BODY: &str = "UTC session alert";
/// Undrained events beyond this are dropped oldest first.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

// ── Bridge types ─────────────────────────────────────────────────────

/// Arguments of a `schedule` call as they arrive from a frontend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub trigger_at_ms: Option<i64>,
    #[serde(default)]
    pub sound_id: Option<String>,
}

impl ScheduleRequest {
    pub fn new(id: impl Into<String>, trigger_at_ms: i64) -> Self {
        Self {
            id: id.into(),
            trigger_at_ms: Some(trigger_at_ms),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sound(mut self, sound_id: impl Into<String>) -> Self {
        self.sound_id = Some(sound_id.into());
        self
    }
}

/// Outcome of a façade call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error class, e.g. `InvalidTrigger`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Set on a successful schedule that only got a best-effort wake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            error_kind: None,
            degraded: None,
        }
    }

    pub fn scheduled(precision: WakePrecision) -> Self {
        Self {
            degraded: Some(precision.is_degraded()),
            ..Self::ok()
        }
    }

    pub fn failure(err: &EngineError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            degraded: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanScheduleResult {
    pub can_schedule: bool,
}

// ── Engine ───────────────────────────────────────────────────────────

/// Host capabilities the engine needs.
#[derive(Clone)]
pub struct EngineHost {
    pub wake: Arc<dyn WakeHost>,
    pub alerts: Arc<dyn AlertPresenter>,
    pub tone: Arc<dyn TonePlayer>,
    pub vibrator: Arc<dyn Vibrator>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub ringing: RingingSettings,
    pub default_label: String,
    pub default_sound: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ringing: RingingSettings {
                timeout: config.ringing.timeout(),
                vibration: config.ringing.vibration(),
                snooze_minutes: config.alarms.snooze_minutes,
            },
            default_label: config.alarms.default_label.clone(),
            default_sound: config.alarms.default_sound.clone(),
        }
    }
}

pub struct AlarmEngine {
    scheduler: ExactWakeScheduler,
    store: Arc<dyn AlarmStore>,
    ringing_host: RingingHost,
    clock: Arc<dyn Clock>,
    slot: RingingSlot,
    runtime: Handle,
    settings: EngineSettings,
    events: Mutex<VecDeque<Event>>,
}

impl AlarmEngine {
    /// Build an engine. Ringing fail-safe timers are spawned on `runtime`.
    ///
    /// Events queue up until [`drain_events`](Self::drain_events) is called;
    /// at most [`EVENT_QUEUE_CAPACITY`] are kept.
    pub fn new(
        host: EngineHost,
        store: Arc<dyn AlarmStore>,
        settings: EngineSettings,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler: ExactWakeScheduler::new(host.wake, host.clock.clone()),
            store,
            ringing_host: RingingHost {
                alerts: host.alerts,
                tone: host.tone,
                vibrator: host.vibrator,
            },
            clock: host.clock,
            slot: RingingSlot::new(),
            runtime,
            settings,
            events: Mutex::new(VecDeque::new()),
        })
    }

    // ── Public operations ────────────────────────────────────────────

    /// Schedule (or replace) a one-shot alarm.
    pub fn schedule(&self, request: ScheduleRequest) -> OperationResult {
        match self.try_schedule(request) {
            Ok(precision) => OperationResult::scheduled(precision),
            Err(e) => {
                warn!(error = %e, "schedule rejected");
                OperationResult::failure(&e)
            }
        }
    }

    /// Cancel an alarm. Cancelling an unknown id succeeds.
    pub fn cancel(&self, id: &str) -> OperationResult {
        match self.try_cancel(id) {
            Ok(()) => OperationResult::ok(),
            Err(e) => {
                warn!(alarm_id = id, error = %e, "cancel failed");
                OperationResult::failure(&e)
            }
        }
    }

    /// Stop whatever is ringing. Succeeds when nothing is.
    pub fn stop_ringing(&self) -> OperationResult {
        self.request_stop(StopReason::External)
    }

    /// Stop the live session on behalf of `reason`'s signal source.
    pub fn request_stop(&self, reason: StopReason) -> OperationResult {
        match self.slot.current() {
            Some(session) => {
                session.request_stop(reason);
            }
            None => debug!(?reason, "stop requested with nothing ringing"),
        }
        OperationResult::ok()
    }

    /// Stop the live session and ring it again after the snooze interval.
    pub fn snooze(&self) -> OperationResult {
        match self.try_snooze() {
            Ok(precision) => OperationResult::scheduled(precision),
            Err(e) => {
                warn!(error = %e, "snooze failed");
                OperationResult::failure(&e)
            }
        }
    }

    pub fn can_schedule_exact(&self) -> CanScheduleResult {
        CanScheduleResult {
            can_schedule: self.scheduler.can_schedule_exact(),
        }
    }

    /// Arm the next occurrence of every built-in session. Returns how many
    /// were armed.
    pub fn arm_all_fixed_sessions(&self) -> usize {
        let now = self.clock.now();
        let armed = FIXED_SESSIONS
            .iter()
            .filter(|rule| match self.arm_session(rule, now) {
                Ok(_) => true,
                Err(e) => {
                    warn!(session = %rule.session_id, error = %e, "failed to arm session");
                    false
                }
            })
            .count();
        info!(armed, "fixed sessions armed");
        armed
    }

    /// Arm the next occurrence of one session, replacing any armed wake.
    ///
    /// # Errors
    /// `Host` if the wake cannot be armed.
    pub fn arm_fixed_session(&self, session_id: SessionId) -> Result<DateTime<Utc>> {
        let (next, _) = self.arm_session(FixedSessionRule::find(session_id), self.clock.now())?;
        Ok(next)
    }

    pub fn cancel_all_fixed_sessions(&self) {
        for id in SessionId::ALL {
            if let Err(e) = self.scheduler.disarm(&WakeKey::Session(id)) {
                warn!(session = %id, error = %e, "failed to disarm session");
            }
        }
        info!("fixed sessions disarmed");
    }

    /// Entry point for a wake delivered by the host.
    pub fn handle_wake(self: &Arc<Self>, fired: FiredWake) -> FiredDisposition {
        let disposition = self.scheduler.acknowledge_fired(&fired);
        if !disposition.is_deliverable() {
            debug!(key = %fired.key, handle = fired.handle.0, ?disposition, "ignoring wake");
            self.emit(Event::WakeIgnored {
                key: fired.key.to_string(),
                at: self.clock.now(),
            });
            return disposition;
        }

        match fired.payload {
            WakePayload::Alarm(record) => self.ring(record),
            WakePayload::Session { session_id } => {
                // A disarmed session still gets this alert but no successor.
                let rearm = disposition == FiredDisposition::Current;
                self.deliver_session(session_id, fired.scheduled_at, rearm)
            }
        }
        disposition
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn current_ringing(&self) -> Option<RingingSnapshot> {
        self.slot.current().map(|s| s.snapshot())
    }

    pub fn pending_wake(&self, key: &WakeKey) -> Option<PendingWake> {
        self.scheduler.pending(key)
    }

    pub fn pending_wakes(&self) -> Vec<PendingWake> {
        self.scheduler.pending_all()
    }

    pub fn store(&self) -> &Arc<dyn AlarmStore> {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Take every event produced since the last drain.
    pub fn drain_events(&self) -> Vec<Event> {
        self.lock_events().drain(..).collect()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn try_schedule(&self, request: ScheduleRequest) -> Result<WakePrecision> {
        let id = request.id.trim();
        if id.is_empty() {
            return Err(EngineError::InvalidArgument("alarm id is required".into()));
        }
        let trigger_ms = request
            .trigger_at_ms
            .ok_or_else(|| EngineError::InvalidArgument("trigger instant is required".into()))?;
        let trigger_at = DateTime::from_timestamp_millis(trigger_ms).ok_or_else(|| {
            EngineError::InvalidArgument(format!("trigger instant {trigger_ms} is out of range"))
        })?;
        let now = self.clock.now();
        if trigger_at <= now {
            return Err(EngineError::InvalidTrigger {
                trigger: trigger_at,
                now,
            });
        }

        let label = non_blank(request.label.as_deref()).unwrap_or(&self.settings.default_label);
        let sound = non_blank(request.sound_id.as_deref()).unwrap_or(&self.settings.default_sound);
        let record = AlarmRecord::new(id, Some(label), trigger_at, Some(sound));
        self.schedule_record(record)
    }

    /// Arm and persist an already-built record.
    ///
    /// # Errors
    /// `InvalidTrigger` for a non-future instant, `Host` if arming fails,
    /// `Database` if the record cannot be stored (the wake is disarmed).
    pub fn schedule_record(&self, record: AlarmRecord) -> Result<WakePrecision> {
        let key = WakeKey::Alarm(record.id.clone());
        let precision = self.scheduler.arm(
            key.clone(),
            record.trigger_at,
            WakePayload::Alarm(record.clone()),
        )?;

        if let Err(e) = self.store.put(&record) {
            if let Err(disarm_err) = self.scheduler.disarm(&key) {
                warn!(%key, error = %disarm_err, "failed to roll back wake");
            }
            return Err(e.into());
        }

        info!(alarm_id = %record.id, at = %record.trigger_at, "alarm scheduled");
        self.emit(Event::AlarmScheduled {
            alarm_id: record.id,
            trigger_at: record.trigger_at,
            degraded: precision.is_degraded(),
            at: self.clock.now(),
        });
        Ok(precision)
    }

    fn try_cancel(&self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(EngineError::InvalidArgument("alarm id is required".into()));
        }
        let disarmed = self.scheduler.disarm(&WakeKey::Alarm(id.to_string()));
        let removed = self.store.remove(id);
        disarmed?;
        removed?;

        info!(alarm_id = id, "alarm cancelled");
        self.emit(Event::AlarmCancelled {
            alarm_id: id.to_string(),
            at: self.clock.now(),
        });
        Ok(())
    }

    fn try_snooze(&self) -> Result<WakePrecision> {
        let session = self
            .slot
            .current()
            .ok_or_else(|| EngineError::InvalidArgument("no alarm is ringing".into()))?;
        if !session.request_stop(StopReason::Snooze) {
            return Err(EngineError::InvalidArgument("alarm already stopped".into()));
        }

        let now = self.clock.now();
        let until = now + Duration::minutes(i64::from(self.settings.ringing.snooze_minutes));
        let mut record = session.record().clone();
        record.trigger_at = until;
        let precision = self.schedule_record(record)?;
        // The "stopped" notice would contradict the pending snooze.
        if let Err(e) = self.ringing_host.alerts.dismiss(&session.alert_id()) {
            warn!(alarm_id = %session.alarm_id(), error = %e, "failed to dismiss snoozed alert");
        }

        self.emit(Event::AlarmSnoozed {
            alarm_id: session.alarm_id().to_string(),
            until,
            at: now,
        });
        Ok(precision)
    }

    fn arm_session(
        &self,
        rule: &FixedSessionRule,
        from: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, WakePrecision)> {
        let next = next_occurrence(&rule.rule, from);
        let precision = self.scheduler.arm(
            WakeKey::Session(rule.session_id),
            next,
            WakePayload::Session {
                session_id: rule.session_id,
            },
        )?;
        Ok((next, precision))
    }

    fn ring(self: &Arc<Self>, record: AlarmRecord) {
        if let Err(e) = self.store.remove(&record.id) {
            warn!(alarm_id = %record.id, error = %e, "failed to remove fired alarm");
        }

        let session = RingingSession::new(
            record.clone(),
            self.ringing_host.clone(),
            self.settings.ringing.clone(),
            Some(self.stop_hook()),
        );
        if let Some(previous) = self.slot.install(session.clone()) {
            previous.request_stop(StopReason::Superseded);
        }

        match session.start(&self.runtime) {
            Ok(()) if !session.is_stopped() => self.emit(Event::RingingStarted {
                alarm_id: record.id,
                label: record.label,
                sound_id: record.sound_id,
                at: self.clock.now(),
            }),
            Ok(()) => debug!(alarm_id = %record.id, "stopped before ringing began"),
            Err(e) => {
                self.slot.clear_if(&session);
                error!(alarm_id = %record.id, error = %e, "failed to start ringing");
                self.post_fallback(&record, &e);
            }
        }
    }

    fn post_fallback(&self, record: &AlarmRecord, cause: &HostError) {
        let alert = Alert {
            alert_id: format!("fallback:{}", record.id),
            title: FALLBACK_TITLE.into(),
            body: record.label.clone(),
            actions: Vec::new(),
            priority: AlertPriority::Max,
            sticky: false,
            full_screen: true,
        };
        match self.ringing_host.alerts.present(&alert) {
            Ok(()) => self.emit(Event::FallbackAlertPosted {
                alarm_id: record.id.clone(),
                error: cause.to_string(),
                at: self.clock.now(),
            }),
            Err(e) => error!(alarm_id = %record.id, error = %e, "fallback alert failed"),
        }
    }

    fn deliver_session(&self, session_id: SessionId, scheduled_at: DateTime<Utc>, rearm: bool) {
        let alert = Alert {
            alert_id: format!("session:{session_id}"),
            title: session_id.title().into(),
            body: SESSION_ALERT_BODY.into(),
            actions: Vec::new(),
            priority: AlertPriority::High,
            sticky: false,
            full_screen: false,
        };
        match self.ringing_host.alerts.present(&alert) {
            Ok(()) => self.emit(Event::SessionAlertPosted {
                session_id,
                title: alert.title,
                at: self.clock.now(),
            }),
            Err(e) => warn!(session = %session_id, error = %e, "failed to post session alert"),
        }
        if !rearm {
            info!(session = %session_id, "session disarmed; not re-arming");
            return;
        }

        // An early delivery must not re-arm the instant it was meant for.
        let now = self.clock.now();
        let from = now.max(scheduled_at);
        match self.arm_session(FixedSessionRule::find(session_id), from) {
            Ok((next_at, precision)) => self.emit(Event::SessionRearmed {
                session_id,
                next_at,
                degraded: precision.is_degraded(),
                at: now,
            }),
            Err(e) => error!(session = %session_id, error = %e, "failed to re-arm session"),
        }
    }

    fn stop_hook(self: &Arc<Self>) -> StopHook {
        let engine: Weak<Self> = Arc::downgrade(self);
        Box::new(move |session: &RingingSession, reason: StopReason| {
            if let Some(engine) = engine.upgrade() {
                engine.on_session_stopped(session, reason);
            }
        })
    }

    /// Stopping a ringing alarm also cancels anything still pending for
    /// its id, unless a newer firing took over.
    fn on_session_stopped(&self, session: &RingingSession, reason: StopReason) {
        self.slot.clear_if(session);

        if reason != StopReason::Superseded {
            let id = session.alarm_id();
            if let Err(e) = self.scheduler.disarm(&WakeKey::Alarm(id.to_string())) {
                warn!(alarm_id = id, error = %e, "failed to disarm stopped alarm");
            }
            if let Err(e) = self.store.remove(id) {
                warn!(alarm_id = id, error = %e, "failed to remove stopped alarm");
            }
        }

        self.emit(Event::RingingStopped {
            alarm_id: session.alarm_id().to_string(),
            reason,
            at: self.clock.now(),
        });
    }

    fn emit(&self, event: Event) {
        let mut events = self.lock_events();
        if events.len() == EVENT_QUEUE_CAPACITY {
            events.pop_front();
            debug!("event queue full; dropping oldest event");
        }
        events.push_back(event);
    }

    fn lock_events(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
