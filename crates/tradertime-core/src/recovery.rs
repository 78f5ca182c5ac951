//! Re-arming pending alarms after a host restart.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::AlarmEngine;
use crate::error::Result;
use crate::sessions::SessionId;
use crate::wake::WakeKey;

/// What recovery did with a single stored alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    Rescheduled {
        alarm_id: String,
        trigger_at: DateTime<Utc>,
    },
    /// Already armed at the stored instant; left alone.
    AlreadyArmed { alarm_id: String },
    /// Trigger instant passed while nothing was running; pruned.
    SkippedPast {
        alarm_id: String,
        trigger_at: DateTime<Utc>,
    },
    Failed { alarm_id: String, error: String },
    /// Armed in this process but no longer stored.
    DisarmedOrphan { alarm_id: String },
}

/// Summary of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub rescheduled: usize,
    pub already_armed: usize,
    pub skipped_past: usize,
    pub failed: usize,
    pub disarmed_orphans: usize,
    pub sessions_armed: usize,
    pub actions: Vec<RecoveryAction>,
}

impl RecoveryReport {
    fn record(&mut self, action: RecoveryAction) {
        match &action {
            RecoveryAction::Rescheduled { .. } => self.rescheduled += 1,
            RecoveryAction::AlreadyArmed { .. } => self.already_armed += 1,
            RecoveryAction::SkippedPast { .. } => self.skipped_past += 1,
            RecoveryAction::Failed { .. } => self.failed += 1,
            RecoveryAction::DisarmedOrphan { .. } => self.disarmed_orphans += 1,
        }
        self.actions.push(action);
    }

    /// Whether any pass changed the live schedule.
    pub fn changed_anything(&self) -> bool {
        self.rescheduled + self.skipped_past + self.disarmed_orphans + self.sessions_armed > 0
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Rebuilds the live wake schedule from the durable alarm store.
pub struct BootRecovery {
    engine: Arc<AlarmEngine>,
    arm_sessions: bool,
}

impl BootRecovery {
    /// `arm_sessions` controls whether the built-in session alerts are armed.
    pub fn new(engine: Arc<AlarmEngine>, arm_sessions: bool) -> Self {
        Self {
            engine,
            arm_sessions,
        }
    }

    /// Full restart pass: every future record is scheduled again and every
    /// past one is pruned.
    ///
    /// # Errors
    /// Returns an error only if the store cannot be read.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let now = self.engine.now();

        for record in self.engine.store().list_all()? {
            if record.trigger_at <= now {
                report.record(self.prune(record.id, record.trigger_at));
                continue;
            }
            let alarm_id = record.id.clone();
            let trigger_at = record.trigger_at;
            report.record(match self.engine.schedule_record(record) {
                Ok(_) => RecoveryAction::Rescheduled {
                    alarm_id,
                    trigger_at,
                },
                Err(e) => {
                    warn!(alarm_id = %alarm_id, error = %e, "failed to reschedule alarm");
                    RecoveryAction::Failed {
                        alarm_id,
                        error: e.to_string(),
                    }
                }
            });
        }

        if self.arm_sessions {
            report.sessions_armed = self.engine.arm_all_fixed_sessions();
        }

        info!(
            rescheduled = report.rescheduled,
            skipped_past = report.skipped_past,
            failed = report.failed,
            sessions = report.sessions_armed,
            "boot recovery complete"
        );
        Ok(report)
    }

    /// Incremental pass for a long-running process that shares the store
    /// with other writers. Arms new or moved records, leaves unchanged ones
    /// alone and disarms alarm wakes whose record disappeared.
    ///
    /// # Errors
    /// Returns an error only if the store cannot be read.
    pub fn reconcile(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let now = self.engine.now();
        let records = self.engine.store().list_all()?;
        let stored: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

        for record in records {
            let key = WakeKey::Alarm(record.id.clone());
            let armed = self.engine.pending_wake(&key);
            if armed.as_ref().is_some_and(|w| w.at == record.trigger_at) {
                report.record(RecoveryAction::AlreadyArmed {
                    alarm_id: record.id,
                });
                continue;
            }
            if record.trigger_at <= now {
                if armed.is_none() {
                    report.record(self.prune(record.id, record.trigger_at));
                }
                continue;
            }
            let alarm_id = record.id.clone();
            let trigger_at = record.trigger_at;
            report.record(match self.engine.schedule_record(record) {
                Ok(_) => RecoveryAction::Rescheduled {
                    alarm_id,
                    trigger_at,
                },
                Err(e) => RecoveryAction::Failed {
                    alarm_id,
                    error: e.to_string(),
                },
            });
        }

        for pending in self.engine.pending_wakes() {
            let WakeKey::Alarm(id) = &pending.key else {
                continue;
            };
            if stored.contains(id) {
                continue;
            }
            // Cancelled elsewhere; the same path a local cancel takes.
            let result = self.engine.cancel(id);
            report.record(if result.success {
                RecoveryAction::DisarmedOrphan {
                    alarm_id: id.clone(),
                }
            } else {
                RecoveryAction::Failed {
                    alarm_id: id.clone(),
                    error: result.error.unwrap_or_default(),
                }
            });
        }

        if self.arm_sessions {
            for id in SessionId::ALL {
                if self.engine.pending_wake(&WakeKey::Session(id)).is_some() {
                    continue;
                }
                match self.engine.arm_fixed_session(id) {
                    Ok(_) => report.sessions_armed += 1,
                    Err(e) => warn!(session = %id, error = %e, "failed to arm session"),
                }
            }
        }

        if report.changed_anything() {
            info!(
                rescheduled = report.rescheduled,
                orphans = report.disarmed_orphans,
                sessions = report.sessions_armed,
                "schedule reconciled"
            );
        }
        Ok(report)
    }

    fn prune(&self, alarm_id: String, trigger_at: DateTime<Utc>) -> RecoveryAction {
        warn!(alarm_id = %alarm_id, at = %trigger_at, "skipping alarm that passed while stopped");
        match self.engine.store().remove(&alarm_id) {
            Ok(()) => RecoveryAction::SkippedPast {
                alarm_id,
                trigger_at,
            },
            Err(e) => RecoveryAction::Failed {
                alarm_id,
                error: e.to_string(),
            },
        }
    }
}
