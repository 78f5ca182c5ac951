//! Terminal implementations of the engine's host capabilities.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tradertime_core::host::{
    Alert, AlertActionKind, AlertPresenter, ToneHandle, TonePlayer, VibrationPattern, Vibrator,
};
use tradertime_core::wake::{FiredWake, WakeHandle, WakeHost, WakeRequest};
use tradertime_core::{HostError, SoundProfile};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Wakes ────────────────────────────────────────────────────────────

/// Wakes backed by tokio timers; fired wakes are sent down `fired`.
///
/// Only wakes while this process is running, which is what `run` is for.
pub struct TokioWakeHost {
    runtime: Handle,
    fired: UnboundedSender<FiredWake>,
    exact_permitted: AtomicBool,
    next_handle: AtomicU64,
    timers: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl TokioWakeHost {
    pub fn new(runtime: Handle, fired: UnboundedSender<FiredWake>, exact_permitted: bool) -> Self {
        Self {
            runtime,
            fired,
            exact_permitted: AtomicBool::new(exact_permitted),
            next_handle: AtomicU64::new(1),
            timers: Mutex::new(HashMap::new()),
        }
    }

    fn spawn_timer(&self, request: &WakeRequest, at: DateTime<Utc>) -> WakeHandle {
        let handle = WakeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let fired = FiredWake::from_request(request, handle);
        let tx = self.fired.clone();

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(fired).is_err() {
                debug!("wake receiver closed");
            }
        });

        let mut timers = lock(&self.timers);
        timers.retain(|_, t| !t.is_finished());
        timers.insert(handle.0, task);
        handle
    }
}

impl WakeHost for TokioWakeHost {
    fn can_schedule_exact(&self) -> bool {
        self.exact_permitted.load(Ordering::Relaxed)
    }

    fn arm_exact(&self, request: &WakeRequest) -> Result<WakeHandle, HostError> {
        Ok(self.spawn_timer(request, request.at))
    }

    /// Batched like an inexact platform alarm: delivered on the next whole minute.
    fn arm_best_effort(&self, request: &WakeRequest) -> Result<WakeHandle, HostError> {
        let minute = TimeDelta::minutes(1);
        let at = match request.at.duration_trunc(minute) {
            Ok(floor) if floor == request.at => floor,
            Ok(floor) => floor + minute,
            Err(e) => {
                return Err(HostError::ArmFailed {
                    key: request.key.to_string(),
                    message: e.to_string(),
                })
            }
        };
        Ok(self.spawn_timer(request, at))
    }

    fn disarm(&self, handle: WakeHandle) -> Result<(), HostError> {
        if let Some(task) = lock(&self.timers).remove(&handle.0) {
            task.abort();
        }
        Ok(())
    }
}

/// Accepts every wake and does nothing with it.
///
/// One-shot commands only persist records; a running daemon picks them up
/// on its next reconcile.
#[derive(Debug, Default)]
pub struct DeferredWakeHost;

impl WakeHost for DeferredWakeHost {
    fn can_schedule_exact(&self) -> bool {
        true
    }

    fn arm_exact(&self, request: &WakeRequest) -> Result<WakeHandle, HostError> {
        debug!(key = %request.key, "deferring wake to the daemon");
        Ok(WakeHandle(0))
    }

    fn arm_best_effort(&self, request: &WakeRequest) -> Result<WakeHandle, HostError> {
        self.arm_exact(request)
    }

    fn disarm(&self, _handle: WakeHandle) -> Result<(), HostError> {
        Ok(())
    }
}

// ── Alerts ───────────────────────────────────────────────────────────

/// Prints alerts to stderr, keeping stdout for JSON events.
#[derive(Debug, Default)]
pub struct ConsoleAlerts;

impl ConsoleAlerts {
    fn print(&self, verb: &str, alert: &Alert) {
        let actions: Vec<String> = alert
            .actions
            .iter()
            .map(|a| match a.kind {
                AlertActionKind::Stop => format!("x/s: {}", a.label),
                AlertActionKind::Snooze => format!("z: {}", a.label),
            })
            .collect();
        if actions.is_empty() {
            eprintln!("[{verb}] {} - {}", alert.title, alert.body);
        } else {
            eprintln!("[{verb}] {} - {}  ({})", alert.title, alert.body, actions.join(", "));
        }
    }
}

impl AlertPresenter for ConsoleAlerts {
    fn present(&self, alert: &Alert) -> Result<(), HostError> {
        self.print("alert", alert);
        Ok(())
    }

    fn update(&self, alert: &Alert) -> Result<(), HostError> {
        self.print("update", alert);
        Ok(())
    }

    fn dismiss(&self, alert_id: &str) -> Result<(), HostError> {
        debug!(alert_id, "alert dismissed");
        Ok(())
    }
}

// ── Tone & vibration ─────────────────────────────────────────────────

/// Rings the terminal bell every two seconds until stopped.
pub struct TerminalBell {
    runtime: Handle,
    next_handle: AtomicU64,
    ringing: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl TerminalBell {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_handle: AtomicU64::new(1),
            ringing: Mutex::new(HashMap::new()),
        }
    }
}

impl TonePlayer for TerminalBell {
    fn play_looped(&self, profile: SoundProfile) -> Result<ToneHandle, HostError> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        debug!(sound = profile.as_str(), resource = ?profile.resource_name(), "terminal bell");
        let task = self.runtime.spawn(async move {
            let mut every = tokio::time::interval(Duration::from_secs(2));
            loop {
                every.tick().await;
                let mut err = std::io::stderr();
                if err.write_all(b"\x07").and_then(|()| err.flush()).is_err() {
                    break;
                }
            }
        });
        lock(&self.ringing).insert(handle, task);
        Ok(ToneHandle(handle))
    }

    fn stop(&self, handle: ToneHandle) -> Result<(), HostError> {
        match lock(&self.ringing).remove(&handle.0) {
            Some(task) => {
                task.abort();
                Ok(())
            }
            None => Err(HostError::Tone(format!("no tone playing for handle {}", handle.0))),
        }
    }
}

/// Terminals cannot vibrate; logs the pattern instead.
#[derive(Debug, Default)]
pub struct LogVibrator;

impl Vibrator for LogVibrator {
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), HostError> {
        if pattern.timings_ms.is_empty() {
            warn!("empty vibration pattern");
        }
        debug!(timings = ?pattern.timings_ms, repeat = ?pattern.repeat_index, "vibrate");
        Ok(())
    }

    fn cancel(&self) -> Result<(), HostError> {
        debug!("vibration cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradertime_core::wake::{WakeKey, WakePayload};
    use tradertime_core::SessionId;

    fn request(at: DateTime<Utc>) -> WakeRequest {
        WakeRequest {
            key: WakeKey::Session(SessionId::TokyoEnd),
            at,
            payload: WakePayload::Session {
                session_id: SessionId::TokyoEnd,
            },
        }
    }

    #[tokio::test]
    async fn exact_wake_is_delivered() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let host = TokioWakeHost::new(Handle::current(), tx, true);
        let at = Utc::now() + TimeDelta::milliseconds(20);
        let handle = host.arm_exact(&request(at)).unwrap();

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.handle, handle);
        assert_eq!(fired.scheduled_at, at);
    }

    #[tokio::test]
    async fn disarmed_wake_never_arrives() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let host = TokioWakeHost::new(Handle::current(), tx, true);
        let first = host
            .arm_exact(&request(Utc::now() + TimeDelta::milliseconds(30)))
            .unwrap();
        host.disarm(first).unwrap();
        host.disarm(first).unwrap();

        let second_at = Utc::now() + TimeDelta::milliseconds(60);
        let second = host.arm_exact(&request(second_at)).unwrap();
        assert_eq!(rx.recv().await.unwrap().handle, second);
    }

    #[tokio::test]
    async fn bell_stops_once() {
        let bell = TerminalBell::new(Handle::current());
        let handle = bell.play_looped(SoundProfile::Chime).unwrap();
        assert!(bell.stop(handle).is_ok());
        assert!(bell.stop(handle).is_err());
    }
}
