//! Session records, configuration and app directories

pub mod config;
mod record;

pub use config::{Config, EngineConfig, ServiceSetting};
pub use record::{ProviderKind, RunMode, Session, SessionKey, SessionStatus, LOCAL_REPO};

use anyhow::Result;
use std::path::PathBuf;

/// Overrides the app directory (config, tokens, debug log).
pub const HOME_ENV: &str = "AGENT_SANDBOX_HOME";

pub fn get_app_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("agent-sandbox"),
    };

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}
