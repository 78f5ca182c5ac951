use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use tradertime_core::sessions::{WeekdaySet, FIXED_SESSIONS};
use tradertime_core::{next_occurrence, FixedSessionRule, SessionId};

use super::{format_instant, parse_instant, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// List the built-in sessions and when each fires next
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the next occurrence of one session
    Next {
        /// Session id, e.g. SYDNEY_START
        id: String,
        /// Reference instant (RFC 3339 or epoch ms), defaults to now
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(Serialize)]
struct SessionRow {
    session_id: SessionId,
    title: &'static str,
    utc_time: String,
    weekdays: String,
    next: String,
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

fn describe_days(days: WeekdaySet) -> String {
    days.day_numbers()
        .into_iter()
        .filter_map(|d| DAY_NAMES.get(usize::from(d)).copied())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn run(action: SessionAction) -> CliResult {
    match action {
        SessionAction::List { json } => {
            let now = Utc::now();
            let rows: Vec<SessionRow> = FIXED_SESSIONS
                .iter()
                .map(|fixed| SessionRow {
                    session_id: fixed.session_id,
                    title: fixed.session_id.title(),
                    utc_time: format!("{:02}:{:02}", fixed.rule.utc_hour, fixed.rule.utc_minute),
                    weekdays: describe_days(fixed.rule.weekdays),
                    next: format_instant(next_occurrence(&fixed.rule, now)),
                })
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in rows {
                    println!(
                        "{:<32} {} UTC  {:<20} next {}",
                        row.session_id.as_str(),
                        row.utc_time,
                        row.weekdays,
                        row.next
                    );
                }
            }
        }
        SessionAction::Next { id, from } => {
            let session_id: SessionId = id.parse()?;
            let from = match from {
                Some(s) => parse_instant(&s)?,
                None => Utc::now(),
            };
            let rule = FixedSessionRule::find(session_id);
            println!("{}", format_instant(next_occurrence(&rule.rule, from)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_weekday_sets() {
        assert_eq!(describe_days(WeekdaySet::MON_FRI), "Mon,Tue,Wed,Thu,Fri");
        assert_eq!(describe_days(WeekdaySet::SUNDAY), "Sun");
    }
}
