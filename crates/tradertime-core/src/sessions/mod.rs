//! Fixed weekly session calendar and recurrence math.

mod recurrence;
mod rule;

pub use recurrence::next_occurrence;
pub use rule::{FixedSessionRule, SessionId, WeekdaySet, WeeklyRule, FIXED_SESSIONS};
