use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{
    FiredWake, PendingWake, WakeHandle, WakeHost, WakeKey, WakePayload, WakePrecision, WakeRequest,
};
use crate::error::{EngineError, Result};
use crate::host::Clock;

/// How a delivered wake relates to what the scheduler currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiredDisposition {
    /// The wake is the one currently armed for its key.
    Current,
    /// Nothing is armed for the key any more; the wake fired before a
    /// disarm could reach the host.
    AlreadyDisarmed,
    /// A newer wake replaced this one; the delivery must be ignored.
    Superseded,
    /// This exact wake was already delivered and handled.
    Duplicate,
}

impl FiredDisposition {
    /// Whether the delivery should be acted on at all.
    pub fn is_deliverable(self) -> bool {
        matches!(self, Self::Current | Self::AlreadyDisarmed)
    }
}

/// Delivered handles remembered for replay detection.
const CONSUMED_CAPACITY: usize = 64;

#[derive(Default)]
struct Armed {
    pending: HashMap<WakeKey, PendingWake>,
    consumed: VecDeque<WakeHandle>,
}

impl Armed {
    fn consume(&mut self, handle: WakeHandle) {
        if self.consumed.len() == CONSUMED_CAPACITY {
            self.consumed.pop_front();
        }
        self.consumed.push_back(handle);
    }
}

/// Arms host wakes with permission-tiered precision and replace semantics.
///
/// Holds no durable state; only the live handle per key.
pub struct ExactWakeScheduler {
    host: Arc<dyn WakeHost>,
    clock: Arc<dyn Clock>,
    armed: Mutex<Armed>,
}

impl ExactWakeScheduler {
    pub fn new(host: Arc<dyn WakeHost>, clock: Arc<dyn Clock>) -> Self {
        Self {
            host,
            clock,
            armed: Mutex::new(Armed::default()),
        }
    }

    pub fn can_schedule_exact(&self) -> bool {
        self.host.can_schedule_exact()
    }

    /// Arm a wake for `key` at `at`, replacing any wake already armed for it.
    ///
    /// Falls back to a best-effort wake when exact wakes are not permitted;
    /// the returned precision tells the caller which one it got.
    ///
    /// # Errors
    /// `InvalidTrigger` if `at` is not strictly in the future, `Host` if the
    /// host refuses to arm.
    pub fn arm(&self, key: WakeKey, at: DateTime<Utc>, payload: WakePayload) -> Result<WakePrecision> {
        let now = self.clock.now();
        if at <= now {
            return Err(EngineError::InvalidTrigger { trigger: at, now });
        }

        let precision = if self.host.can_schedule_exact() {
            WakePrecision::Exact
        } else {
            WakePrecision::BestEffort
        };
        let request = WakeRequest {
            key: key.clone(),
            at,
            payload,
        };

        let mut armed = self.lock();
        // The previous wake stays live until its replacement is armed.
        let handle = match precision {
            WakePrecision::Exact => self.host.arm_exact(&request)?,
            WakePrecision::BestEffort => {
                warn!(%key, "exact wakes not permitted, arming best-effort wake");
                self.host.arm_best_effort(&request)?
            }
        };
        info!(%key, at = %at, ?precision, "wake armed");

        let replaced = armed.pending.insert(
            key.clone(),
            PendingWake {
                key: key.clone(),
                handle,
                at,
                precision,
            },
        );
        if let Some(previous) = replaced {
            debug!(%key, handle = previous.handle.0, "replacing armed wake");
            if let Err(e) = self.host.disarm(previous.handle) {
                warn!(%key, error = %e, "failed to disarm replaced wake");
            }
        }
        Ok(precision)
    }

    /// Disarm the wake for `key`. Returns whether one was armed.
    ///
    /// Unknown keys are a successful no-op.
    ///
    /// # Errors
    /// `Host` if the host fails to disarm; the key is forgotten regardless.
    pub fn disarm(&self, key: &WakeKey) -> Result<bool> {
        let removed = self.lock().pending.remove(key);
        match removed {
            Some(previous) => {
                self.host.disarm(previous.handle)?;
                info!(%key, "wake disarmed");
                Ok(true)
            }
            None => {
                debug!(%key, "disarm: nothing armed");
                Ok(false)
            }
        }
    }

    /// Record that the host delivered `fired`, forgetting it if it is the
    /// currently armed wake for its key.
    ///
    /// A handle is deliverable once; replays come back as `Duplicate`.
    pub fn acknowledge_fired(&self, fired: &FiredWake) -> FiredDisposition {
        let mut armed = self.lock();
        if armed.consumed.contains(&fired.handle) {
            return FiredDisposition::Duplicate;
        }
        let disposition = match armed.pending.get(&fired.key) {
            Some(current) if current.handle == fired.handle => {
                armed.pending.remove(&fired.key);
                FiredDisposition::Current
            }
            Some(_) => return FiredDisposition::Superseded,
            None => FiredDisposition::AlreadyDisarmed,
        };
        armed.consume(fired.handle);
        disposition
    }

    pub fn pending(&self, key: &WakeKey) -> Option<PendingWake> {
        self.lock().pending.get(key).cloned()
    }

    /// Snapshot of every armed wake, ordered by key.
    pub fn pending_all(&self) -> Vec<PendingWake> {
        let mut all: Vec<PendingWake> = self.lock().pending.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    fn lock(&self) -> MutexGuard<'_, Armed> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }
}
