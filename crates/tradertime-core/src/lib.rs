//! # Trader Time Core Library
//!
//! Exact-time alarm scheduling and delivery for the Trader Time app. A
//! platform shell (mobile, desktop daemon, test harness) supplies the wake
//! timer, alert, tone and vibration primitives; this crate decides when to
//! arm them and guarantees a ringing alarm stops exactly once.
//!
//! ## Architecture
//!
//! - **Sessions**: the nine built-in UTC trading-session rules and the
//!   next-occurrence calculator
//! - **Wake**: permission-tiered exact/best-effort wake arming with replace
//!   semantics per key
//! - **Storage**: SQLite alarm registry and TOML configuration
//! - **Ringing**: the ringing session state machine and its single slot
//! - **Engine**: the façade frontends call, plus boot recovery
//!
//! ## Key Components
//!
//! - [`AlarmEngine`]: schedule, cancel, stop, snooze and fixed sessions
//! - [`ExactWakeScheduler`]: wake arming against a [`WakeHost`]
//! - [`RingingSession`]: exactly-once stop state machine
//! - [`AlarmRegistry`]: durable alarm records
//! - [`BootRecovery`]: rebuilds the schedule after a restart

pub mod alarm;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod recovery;
pub mod ringing;
pub mod sessions;
pub mod sound;
pub mod storage;
pub mod wake;

pub use alarm::AlarmRecord;
pub use engine::{
    AlarmEngine, CanScheduleResult, EngineHost, EngineSettings, OperationResult, ScheduleRequest,
};
pub use error::{ConfigError, DatabaseError, EngineError, HostError};
pub use events::Event;
pub use host::{Alert, AlertPresenter, Clock, SystemClock, TonePlayer, Vibrator};
pub use recovery::{BootRecovery, RecoveryAction, RecoveryReport};
pub use ringing::{RingingSession, RingingSlot, RingingState, StopReason};
pub use sessions::{next_occurrence, FixedSessionRule, SessionId, WeeklyRule};
pub use sound::SoundProfile;
pub use storage::{AlarmRegistry, AlarmStore, Config};
pub use wake::{ExactWakeScheduler, FiredWake, WakeHost, WakeKey, WakePrecision};
