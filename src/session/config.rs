//! User configuration management

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use super::{get_app_dir, ProviderKind};
use crate::agents::Agent;

pub const TIGER_SERVICE_ENV: &str = "AGENT_SANDBOX_TIGER_SERVICE_ID";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: Agent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_provider: Option<ProviderKind>,

    /// Absent, empty ("no fork") and set are all distinct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiger_service_id: Option<String>,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,

    /// Host env var names forwarded into every session.
    #[serde(default)]
    pub extra_env: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            cpu_limit: None,
            memory_limit: None,
            extra_env: Vec::new(),
        }
    }
}

fn default_image() -> String {
    crate::containers::DEFAULT_SANDBOX_IMAGE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            region: default_region(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.sandbox.dev/v1".to_string()
}

fn default_region() -> String {
    "ord".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Upper bound on concurrent background removals; unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_removals: Option<usize>,
}

/// Whether a start should fork a database service first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSetting {
    /// Nothing configured: fall back to the environment default, if any.
    Default,
    /// Explicitly disabled.
    ExplicitNone,
    Service(String),
}

impl ServiceSetting {
    pub fn from_config(value: Option<&str>) -> Self {
        match value {
            None => ServiceSetting::Default,
            Some(v) if v.trim().is_empty() => ServiceSetting::ExplicitNone,
            Some(v) => ServiceSetting::Service(v.trim().to_string()),
        }
    }

    /// The parent service to fork, resolving `Default` against the environment.
    pub fn resolve(&self) -> Option<String> {
        match self {
            ServiceSetting::Default => std::env::var(TIGER_SERVICE_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            ServiceSetting::ExplicitNone => None,
            ServiceSetting::Service(id) => Some(id.clone()),
        }
    }
}

/// The narrow view of configuration the engine consumes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub agent: Agent,
    pub model: String,
    pub tiger_service_id: ServiceSetting,
    pub sandbox_provider: Option<ProviderKind>,
}

impl EngineConfig {
    pub fn provider(&self) -> ProviderKind {
        self.sandbox_provider.unwrap_or_default()
    }
}

fn config_path() -> Result<PathBuf> {
    Ok(get_app_dir()?.join("config.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path()?;
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            agent: self.agent,
            model: self
                .model
                .clone()
                .unwrap_or_else(|| self.agent.default_model().to_string()),
            tiger_service_id: ServiceSetting::from_config(self.tiger_service_id.as_deref()),
            sandbox_provider: self.sandbox_provider,
        }
    }
}
