//! External collaborators the engine talks to through narrow interfaces:
//! config, credentials, branch naming, repo context, database forks, PRs.

mod auth;
mod branch;
mod fork;
mod pr;
mod repo;

pub use auth::{CliAgentAuth, GhHostAuth, TokenFileAuth, CLOUD_TOKEN_ENV};
pub use branch::{random_branch, sanitize_branch, with_suffix, AgentBranchNamer};
pub use fork::TigerForker;
pub use pr::GhPrLookup;
pub use repo::GitRepoResolver;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::Agent;
use crate::session::{Config, EngineConfig};

pub trait ConfigReader: Send + Sync {
    fn read(&self) -> EngineConfig;
}

/// Re-reads the config file on every call; falls back to defaults.
pub struct FileConfigReader;

impl ConfigReader for FileConfigReader {
    fn read(&self) -> EngineConfig {
        match Config::load() {
            Ok(config) => config.engine(),
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Config::default().engine()
            }
        }
    }
}

impl ConfigReader for EngineConfig {
    fn read(&self) -> EngineConfig {
        self.clone()
    }
}

#[async_trait]
pub trait AgentAuth: Send + Sync {
    async fn check_credentials(&self, agent: Agent, model: &str) -> bool;

    /// Runs the agent's interactive login on the current terminal.
    async fn ensure_auth(&self, agent: Agent) -> bool;
}

#[async_trait]
pub trait HostAuth: Send + Sync {
    async fn check_credentials(&self) -> bool;
}

#[async_trait]
pub trait BranchNamer: Send + Sync {
    async fn generate(&self, prompt: &str, agent: Agent, model: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    /// `owner/name`
    pub full_name: String,
    pub root: PathBuf,
    pub current_branch: Option<String>,
}

pub trait RepoResolver: Send + Sync {
    /// `None` outside a git repository with a recognizable remote.
    fn get_repo_info(&self) -> Option<RepoInfo>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForkResult {
    pub service_id: String,
    pub env_vars: Vec<(String, String)>,
}

#[async_trait]
pub trait DatabaseForker: Send + Sync {
    async fn fork(&self, branch: &str, service_id: &str) -> Result<ForkResult>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrInfo {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub url: String,
    #[serde(default)]
    pub is_draft: bool,
}

#[async_trait]
pub trait PrLookup: Send + Sync {
    async fn get_pr_for_branch(&self, repo: &str, branch: &str) -> Option<PrInfo>;
}

pub trait CloudAuth: Send + Sync {
    fn token(&self) -> Option<String>;

    /// Interactive; owns the terminal while it runs.
    fn login(&self) -> bool;
}
