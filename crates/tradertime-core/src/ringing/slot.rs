use std::sync::{Arc, Mutex, MutexGuard};

use super::RingingSession;

/// Holds the one session currently allowed to ring in this process.
#[derive(Default)]
pub struct RingingSlot {
    current: Mutex<Option<Arc<RingingSession>>>,
}

impl RingingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session`, returning whatever it displaced.
    pub fn install(&self, session: Arc<RingingSession>) -> Option<Arc<RingingSession>> {
        self.lock().replace(session)
    }

    pub fn current(&self) -> Option<Arc<RingingSession>> {
        self.lock().clone()
    }

    /// Clear the slot only if it still holds `session`.
    pub fn clear_if(&self, session: &RingingSession) -> bool {
        let mut current = self.lock();
        let holds = current
            .as_ref()
            .is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), session));
        if holds {
            *current = None;
        }
        holds
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<RingingSession>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmRecord;
    use crate::host::recording::{RecordingAlerts, RecordingTonePlayer, RecordingVibrator};
    use crate::ringing::{RingingHost, RingingSettings};
    use chrono::Utc;

    fn session(id: &str) -> Arc<RingingSession> {
        let host = RingingHost {
            alerts: Arc::new(RecordingAlerts::new()),
            tone: Arc::new(RecordingTonePlayer::new()),
            vibrator: Arc::new(RecordingVibrator::new()),
        };
        let record = AlarmRecord::new(id, None, Utc::now(), None);
        RingingSession::new(record, host, RingingSettings::default(), None)
    }

    #[test]
    fn install_returns_displaced_session() {
        let slot = RingingSlot::new();
        assert!(slot.install(session("a")).is_none());
        let displaced = slot.install(session("b")).unwrap();
        assert_eq!(displaced.alarm_id(), "a");
        assert_eq!(slot.current().unwrap().alarm_id(), "b");
    }

    #[test]
    fn clear_if_ignores_other_sessions() {
        let slot = RingingSlot::new();
        let a = session("a");
        let b = session("b");
        slot.install(b.clone());

        assert!(!slot.clear_if(&a));
        assert!(slot.current().is_some());
        assert!(slot.clear_if(&b));
        assert!(slot.current().is_none());
    }
}
