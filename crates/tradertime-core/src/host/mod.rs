//! Host capabilities the engine drives but does not implement.
//!
//! A platform layer (mobile shell, desktop daemon, test harness) supplies
//! one implementation of each trait. All of them must be callable from any
//! thread and must return quickly.

pub mod recording;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::sound::SoundProfile;

/// Source of the current wall-clock instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Named action buttons attached to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertActionKind {
    Stop,
    Snooze,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAction {
    pub kind: AlertActionKind,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    High,
    Max,
}

/// A banner/notification the host renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub title: String,
    pub body: String,
    pub actions: Vec<AlertAction>,
    pub priority: AlertPriority,
    /// Sticky alerts cannot be swiped away by the user.
    pub sticky: bool,
    /// Request a full-attention (lock-screen / full-screen) presentation.
    pub full_screen: bool,
}

pub trait AlertPresenter: Send + Sync {
    fn present(&self, alert: &Alert) -> Result<(), HostError>;

    /// Replace the content of an already-presented alert.
    fn update(&self, alert: &Alert) -> Result<(), HostError>;

    fn dismiss(&self, alert_id: &str) -> Result<(), HostError>;

    /// Ask any full-screen surface showing `alarm_id` to close itself.
    fn close_full_screen(&self, _alarm_id: &str) -> Result<(), HostError> {
        Ok(())
    }
}

/// Opaque handle to a playing tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToneHandle(pub u64);

/// Plays a looped alarm-class tone until stopped.
pub trait TonePlayer: Send + Sync {
    fn play_looped(&self, profile: SoundProfile) -> Result<ToneHandle, HostError>;
    fn stop(&self, handle: ToneHandle) -> Result<(), HostError>;
}

/// Vibration waveform: alternating off/on durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VibrationPattern {
    pub timings_ms: Vec<u64>,
    /// Index into `timings_ms` to loop from, `None` to play once.
    pub repeat_index: Option<usize>,
}

impl Default for VibrationPattern {
    fn default() -> Self {
        Self {
            timings_ms: vec![0, 1000, 500, 1000, 500],
            repeat_index: Some(0),
        }
    }
}

pub trait Vibrator: Send + Sync {
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<(), HostError>;
    fn cancel(&self) -> Result<(), HostError>;
}
