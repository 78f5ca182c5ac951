//! Alarm ringing: one state machine per firing, and the process-wide
//! slot that admits at most one of them at a time.

mod session;
mod slot;

pub use session::{
    RingingHost, RingingSession, RingingSettings, RingingSnapshot, RingingState, StopHook,
    StopReason,
};
pub use slot::RingingSlot;
