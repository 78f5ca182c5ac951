use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Subcommand;
use serde_json::json;
use tradertime_core::{AlarmStore, Config, ScheduleRequest};
use uuid::Uuid;

use super::{format_instant, open_engine, parse_instant, CliResult};
use crate::host::DeferredWakeHost;

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Schedule (or replace) a one-shot alarm
    Schedule {
        /// Alarm id; scheduling an existing id replaces it
        #[arg(long)]
        id: Option<String>,
        /// Label shown on the alert
        #[arg(long)]
        label: Option<String>,
        /// Trigger instant, RFC 3339 or epoch milliseconds
        #[arg(long, conflicts_with = "in_secs", required_unless_present = "in_secs")]
        at: Option<String>,
        /// Trigger this many seconds from now
        #[arg(long = "in", value_name = "SECS")]
        in_secs: Option<u64>,
        /// Sound profile (original, classic, chime, bell, ping, tone, custom)
        #[arg(long)]
        sound: Option<String>,
    },
    /// Cancel an alarm
    Cancel {
        /// Alarm id
        id: String,
    },
    /// List pending alarms
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: AlarmAction) -> CliResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let config = Config::load_or_default();
    let engine = open_engine(Arc::new(DeferredWakeHost), &config, runtime.handle().clone())?;

    match action {
        AlarmAction::Schedule {
            id,
            label,
            at,
            in_secs,
            sound,
        } => {
            let trigger_at_ms = match (at, in_secs) {
                (Some(at), _) => parse_instant(&at)?.timestamp_millis(),
                (None, Some(secs)) => {
                    let secs = i64::try_from(secs).map_err(|e| e.to_string())?;
                    (Utc::now() + Duration::seconds(secs)).timestamp_millis()
                }
                (None, None) => return Err("either --at or --in is required".into()),
            };
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let result = engine.schedule(ScheduleRequest {
                id: id.clone(),
                label,
                trigger_at_ms: Some(trigger_at_ms),
                sound_id: sound,
            });
            if !result.success {
                return Err(result.error.unwrap_or_else(|| "schedule failed".into()).into());
            }
            println!("{}", serde_json::to_string_pretty(&json!({ "id": id, "result": result }))?);
        }
        AlarmAction::Cancel { id } => {
            let result = engine.cancel(&id);
            if !result.success {
                return Err(result.error.unwrap_or_else(|| "cancel failed".into()).into());
            }
            println!("Alarm cancelled: {id}");
        }
        AlarmAction::List { json } => {
            let mut records = engine.store().list_all()?;
            records.sort_by_key(|r| r.trigger_at);
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No pending alarms.");
            } else {
                for r in records {
                    println!(
                        "{}  {}  {} [{}]",
                        format_instant(r.trigger_at),
                        r.id,
                        r.label,
                        r.sound_id
                    );
                }
            }
        }
    }
    Ok(())
}
