//! Session record: one sandboxed agent run as reported by its provider

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::Agent;

/// `repo` value for sessions that mount a local directory instead of cloning.
pub const LOCAL_REPO: &str = "local";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    Cloud,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Local, ProviderKind::Cloud];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Cloud => "cloud",
        }
    }

    pub fn other(&self) -> ProviderKind {
        match self {
            ProviderKind::Local => ProviderKind::Cloud,
            ProviderKind::Cloud => ProviderKind::Local,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "docker" => Ok(ProviderKind::Local),
            "cloud" => Ok(ProviderKind::Cloud),
            other => Err(format!("unknown sandbox provider '{}'", other)),
        }
    }
}

/// How the agent process is driven once the session exists.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Agent attached to the terminal.
    #[default]
    Interactive,
    /// Interactive, read-only planning; never forks a database.
    Plan,
    /// Detached, prompt-driven run whose output is read from logs.
    Async,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Interactive => "interactive",
            RunMode::Plan => "plan",
            RunMode::Async => "async",
        }
    }

    /// Whether the workflow ends by handing the terminal to the session.
    pub fn hands_off(&self) -> bool {
        matches!(self, RunMode::Interactive | RunMode::Plan)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime status. Only `Exited` carries an exit code.
///
/// `Unknown` is never reported by a substrate; the engine assigns it when it
/// could not reconcile a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Exited {
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    Stopped,
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Exited { .. } => "exited",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Unknown => "unknown",
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SessionStatus::Exited { exit_code } => Some(*exit_code),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionStatus::Exited { .. } | SessionStatus::Stopped)
    }

    /// Human-facing label used by tables and the TUI.
    pub fn label(&self) -> String {
        match self {
            SessionStatus::Running => "running".to_string(),
            SessionStatus::Exited { exit_code: 0 } => "complete".to_string(),
            SessionStatus::Exited { exit_code } => format!("failed ({})", exit_code),
            SessionStatus::Stopped => "stopped".to_string(),
            SessionStatus::Unknown => "unknown".to_string(),
        }
    }
}

/// Addresses a session across providers; ids are only unique per provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub provider: ProviderKind,
    pub id: String,
}

impl SessionKey {
    pub fn new(provider: ProviderKind, id: impl Into<String>) -> Self {
        Self {
            provider,
            id: id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub branch: String,
    pub agent: Agent,
    pub model: String,
    pub provider: ProviderKind,
    pub repo: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<String>,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub interactive: bool,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_slug: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, name: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            branch: String::new(),
            agent: Agent::default(),
            model: String::new(),
            provider,
            repo: LOCAL_REPO.to_string(),
            prompt: String::new(),
            mount_dir: None,
            resumed_from: None,
            status: SessionStatus::Running,
            interactive: false,
            created: Utc::now(),
            region: None,
            volume_slug: None,
            snapshot_slug: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.provider, self.id.clone())
    }

    pub fn is_mount(&self) -> bool {
        self.mount_dir.is_some()
    }

    /// Interactive sessions have no line-structured log output.
    pub fn has_logs(&self) -> bool {
        !self.interactive
    }
}
