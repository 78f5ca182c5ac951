//! Foreground alarm daemon.
//!
//! Arms every stored alarm and the session alerts on tokio timers, then
//! serves wake deliveries, keyboard commands and registry reconciles from
//! one loop. Events are printed to stdout as JSON lines.
//!
//! Keys (followed by Enter): `s` stop (hardware key), `x` stop (alert
//! action), `z` snooze, `q` quit.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tradertime_core::{AlarmEngine, BootRecovery, Config, StopReason};

use super::{open_engine, CliResult};
use crate::host::TokioWakeHost;

#[derive(Args)]
pub struct RunArgs {
    /// Behave as if exact wakes were not permitted
    #[arg(long)]
    inexact: bool,
    /// Do not arm the fixed session alerts
    #[arg(long)]
    no_sessions: bool,
    /// Seconds between registry reconciles
    #[arg(long, default_value = "30")]
    reconcile_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyCommand {
    Stop(StopReason),
    Snooze,
    Quit,
}

fn parse_key(line: &str) -> Option<KeyCommand> {
    match line.trim() {
        "s" | "stop" => Some(KeyCommand::Stop(StopReason::HardwareKey)),
        "x" => Some(KeyCommand::Stop(StopReason::AlertAction)),
        "z" | "snooze" => Some(KeyCommand::Snooze),
        "q" | "quit" => Some(KeyCommand::Quit),
        _ => None,
    }
}

fn spawn_key_listener() -> mpsc::UnboundedReceiver<KeyCommand> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(cmd) = parse_key(&line) else {
                warn!(input = line.trim(), "unknown key command");
                continue;
            };
            if tx.send(cmd).is_err() {
                break;
            }
        }
    });
    rx
}

fn flush_events(engine: &AlarmEngine) -> CliResult {
    for event in engine.drain_events() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

pub fn run(args: RunArgs) -> CliResult {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(daemon(args))
}

async fn daemon(args: RunArgs) -> CliResult {
    let config = Config::load_or_default();
    let (fired_tx, mut fired) = mpsc::unbounded_channel();
    let wake = Arc::new(TokioWakeHost::new(Handle::current(), fired_tx, !args.inexact));
    let engine = open_engine(wake, &config, Handle::current())?;

    let arm_sessions = config.sessions.enabled && !args.no_sessions;
    let recovery = BootRecovery::new(engine.clone(), arm_sessions);
    let report = recovery.recover()?;
    println!("{}", serde_json::to_string(&report)?);
    if !engine.can_schedule_exact().can_schedule {
        warn!("exact wakes not permitted; alarms may fire up to a minute late");
    }
    info!("daemon running; s = stop, z = snooze, q = quit");

    let mut keys = spawn_key_listener();
    let mut reconcile = tokio::time::interval(Duration::from_secs(args.reconcile_secs.max(1)));
    // The first tick completes immediately; recovery just ran.
    reconcile.tick().await;
    let mut poll = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(wake) = fired.recv() => {
                engine.handle_wake(wake);
            }
            Some(key) = keys.recv() => match key {
                KeyCommand::Stop(reason) => {
                    engine.request_stop(reason);
                }
                KeyCommand::Snooze => {
                    let result = engine.snooze();
                    if !result.success {
                        warn!(error = ?result.error, "snooze failed");
                    }
                }
                KeyCommand::Quit => break,
            },
            _ = reconcile.tick() => {
                if let Err(e) = recovery.reconcile() {
                    warn!(error = %e, "reconcile failed");
                }
            }
            // Fail-safe stops happen off this loop; surface their events.
            _ = poll.tick() => {}
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
        flush_events(&engine)?;
    }

    engine.stop_ringing();
    flush_events(&engine)?;
    Ok(())
}
