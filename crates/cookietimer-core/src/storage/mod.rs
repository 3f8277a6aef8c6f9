mod config;
pub mod database;
pub mod migrations;
pub mod repository;

pub use config::{
    Config, DisplayConfig, LoggingConfig, NotificationsConfig, ServiceConfig, UiConfig,
};
pub use database::{Database, DeletedTimer, Transition};
pub use repository::TimerRepository;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory holding the database and `config.toml`.
///
/// `COOKIETIMER_DATA_DIR` wins if set. Otherwise `~/.config/cookietimer[-dev]/`
/// based on COOKIETIMER_ENV (set it to `dev` for a development directory).
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("COOKIETIMER_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("COOKIETIMER_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("cookietimer-dev")
            } else {
                base_dir.join("cookietimer")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
