//! Exact-time wake scheduling.
//!
//! The host owns the actual timer primitive ([`WakeHost`]); the
//! [`ExactWakeScheduler`] picks exact or best-effort arming and keeps the
//! live handle per key so a re-arm always replaces the previous wake.

mod scheduler;

pub use scheduler::{ExactWakeScheduler, FiredDisposition};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmRecord;
use crate::error::HostError;
use crate::sessions::SessionId;

/// Identity of an armed wake. User alarms and fixed sessions live in
/// separate namespaces so an alarm id can never collide with a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WakeKey {
    Alarm(String),
    Session(SessionId),
}

impl fmt::Display for WakeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeKey::Alarm(id) => write!(f, "alarm:{id}"),
            WakeKey::Session(id) => write!(f, "fixed_session:{id}"),
        }
    }
}

/// What the wake carries back to the engine when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WakePayload {
    Alarm(AlarmRecord),
    Session { session_id: SessionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakePrecision {
    /// Fires at the requested instant even while idle.
    Exact,
    /// Wakes while idle but may be batched or delayed by the host.
    BestEffort,
}

impl WakePrecision {
    pub fn is_degraded(&self) -> bool {
        matches!(self, WakePrecision::BestEffort)
    }
}

/// Host-level handle for one armed wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WakeHandle(pub u64);

/// Everything a host needs to arm a wake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    pub key: WakeKey,
    pub at: DateTime<Utc>,
    pub payload: WakePayload,
}

/// Delivered by the host when an armed wake goes off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredWake {
    pub key: WakeKey,
    pub handle: WakeHandle,
    pub scheduled_at: DateTime<Utc>,
    pub payload: WakePayload,
}

impl FiredWake {
    pub fn from_request(request: &WakeRequest, handle: WakeHandle) -> Self {
        Self {
            key: request.key.clone(),
            handle,
            scheduled_at: request.at,
            payload: request.payload.clone(),
        }
    }
}

/// The scheduler's record of a wake it armed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWake {
    pub key: WakeKey,
    pub handle: WakeHandle,
    pub at: DateTime<Utc>,
    pub precision: WakePrecision,
}

/// The host's wake-while-idle timer primitive.
pub trait WakeHost: Send + Sync {
    /// Whether exact wakes are currently permitted.
    fn can_schedule_exact(&self) -> bool;

    fn arm_exact(&self, request: &WakeRequest) -> Result<WakeHandle, HostError>;

    fn arm_best_effort(&self, request: &WakeRequest) -> Result<WakeHandle, HostError>;

    /// Disarm a previously armed wake. Unknown handles are not an error.
    fn disarm(&self, handle: WakeHandle) -> Result<(), HostError>;
}
