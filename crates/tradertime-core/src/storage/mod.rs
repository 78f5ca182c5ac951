mod config;
pub mod registry;

pub use config::{AlarmsConfig, Config, RingingConfig, SessionsConfig};
pub use registry::{AlarmRegistry, AlarmStore};

use std::path::PathBuf;

/// Returns `~/.config/tradertime[-dev]/` based on TRADERTIME_ENV.
///
/// Set TRADERTIME_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TRADERTIME_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tradertime-dev")
    } else {
        base_dir.join("tradertime")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
