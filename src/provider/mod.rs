//! Sandbox providers: one lifecycle contract over the local container runtime
//! and the cloud sandbox service.

pub mod cloud;
pub mod error;
pub mod local;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;
mod set;

pub use cloud::CloudProvider;
pub use error::{ErrorKind, ProviderError, Result};
pub use local::LocalProvider;
pub use set::Providers;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::agents::{self, Agent, AgentInvocation};
use crate::containers::{ContainerStats, WORK_DIR};
use crate::session::{ProviderKind, RunMode, Session};

/// Human-readable step reporting for long provider calls. Reporting only:
/// there is no way to cancel through it.
#[derive(Clone)]
pub struct Progress(Arc<dyn Fn(&str) + Send + Sync>);

impl Progress {
    pub fn new(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn none() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, message: &str) {
        tracing::debug!("progress: {}", message);
        (self.0)(message)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Progress")
    }
}

/// Log lines of a detached session.
pub type LogStream = BoxStream<'static, String>;

#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub branch: String,
    pub prompt: String,
    pub agent: Agent,
    pub model: String,
    pub mode: RunMode,
    /// "owner/name", or `LOCAL_REPO` in mount mode.
    pub repo: String,
    pub env: Vec<(String, String)>,
    pub mount_dir: Option<String>,
    pub extra_args: Vec<String>,
    pub progress: Progress,
}

impl CreateSpec {
    pub fn interactive(&self) -> bool {
        self.mode.hands_off()
    }

    pub fn invocation(&self) -> AgentInvocation {
        AgentInvocation {
            model: self.model.clone(),
            prompt: Some(self.prompt.clone()),
            mode: self.mode,
            continue_session: false,
            extra_args: self.extra_args.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResumeMode {
    #[default]
    Interactive,
    Detached,
    /// A disposable shell on top of the session's last state.
    Shell,
}

impl ResumeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeMode::Interactive => "interactive",
            ResumeMode::Detached => "detached",
            ResumeMode::Shell => "shell",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResumeOptions {
    pub mode: ResumeMode,
    /// Only used for `Detached`.
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub extra_args: Vec<String>,
    pub progress: Progress,
}

impl ResumeOptions {
    /// The continued agent run for a resumed `session`; `None` in shell mode.
    pub fn invocation(&self, session: &Session) -> Option<AgentInvocation> {
        let mode = match self.mode {
            ResumeMode::Interactive => RunMode::Interactive,
            ResumeMode::Detached => RunMode::Async,
            ResumeMode::Shell => return None,
        };
        let prompt = match self.mode {
            ResumeMode::Detached => self.prompt.clone(),
            _ => None,
        };

        Some(AgentInvocation {
            model: self.model.clone().unwrap_or_else(|| session.model.clone()),
            prompt,
            mode,
            continue_session: true,
            extra_args: self.extra_args.clone(),
        })
    }
}

/// A disposable session for an ad hoc shell, not tied to a prompt.
#[derive(Debug, Clone)]
pub struct ShellSpec {
    pub provider: ProviderKind,
    pub agent: Agent,
    pub repo: String,
    pub branch: Option<String>,
    pub mount_dir: Option<String>,
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionStats {
    pub cpu_percent: f64,
    pub memory_usage: String,
    pub memory_percent: f64,
}

impl From<ContainerStats> for SessionStats {
    fn from(stats: ContainerStats) -> Self {
        Self {
            cpu_percent: stats.cpu_percent,
            memory_usage: stats.memory_usage,
            memory_percent: stats.memory_percent,
        }
    }
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Idempotent. Recoverable setup problems are `ProviderError::NeedsSetup`.
    async fn ensure_ready(&self, progress: &Progress) -> Result<()>;

    /// Not idempotent: callers pick unique branch names.
    async fn create(&self, spec: CreateSpec) -> Result<Session>;

    /// `ProviderError::NotFound` when `id` no longer exists.
    async fn resume(&self, id: &str, opts: ResumeOptions) -> Result<Session>;

    /// Owns the terminal until the session exits or the user detaches.
    async fn attach(&self, id: &str) -> Result<()>;

    async fn shell(&self, id: &str) -> Result<()>;

    /// A missing session is success.
    async fn stop(&self, id: &str) -> Result<()>;

    /// A missing session is success.
    async fn remove(&self, id: &str) -> Result<()>;

    /// `None` means the session no longer exists.
    async fn get(&self, id: &str) -> Result<Option<Session>>;

    async fn list(&self) -> Result<Vec<Session>>;

    /// `None` for interactive sessions.
    async fn stream_logs(&self, id: &str) -> Result<Option<LogStream>>;

    async fn create_shell(&self, spec: ShellSpec) -> Result<Session>;

    /// `None` when the substrate does not expose resource usage.
    async fn stats(&self, id: &str) -> Result<Option<SessionStats>>;
}

/// Entry script run by `sh -c` inside a new sandbox.
///
/// Clone mode (`repo` set) clones into the work dir and checks out `branch`,
/// creating it when the remote does not have it. `argv` is exec'd last.
pub fn bootstrap_script(repo: Option<&str>, branch: &str, argv: &[String]) -> String {
    let mut lines = vec!["set -e".to_string()];

    if let Some(repo) = repo {
        let branch = agents::shell_join(&[branch.to_string()]);
        lines.push("command -v gh >/dev/null 2>&1 && gh auth setup-git >/dev/null 2>&1 || true".to_string());
        lines.push(format!(
            "if [ ! -d {work}/.git ]; then git clone {url} {work}; fi",
            work = WORK_DIR,
            url = agents::shell_join(&[format!("https://github.com/{}.git", repo)]),
        ));
        lines.push(format!("cd {}", WORK_DIR));
        lines.push(format!(
            "git checkout {b} 2>/dev/null || git checkout -b {b}",
            b = branch
        ));
    } else {
        lines.push(format!("cd {}", WORK_DIR));
    }

    lines.push(format!("exec {}", agents::shell_join(argv)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_reports_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress = Progress::new(move |msg| sink.lock().unwrap().push(msg.to_string()));
        progress.report("Pulling image");
        progress.clone().report("Starting container");
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Pulling image".to_string(), "Starting container".to_string()]
        );
    }

    #[test]
    fn test_resume_invocation_detached_keeps_prompt() {
        let mut session = Session::new("a", "alpha", ProviderKind::Local);
        session.model = "sonnet".to_string();
        let opts = ResumeOptions {
            mode: ResumeMode::Detached,
            prompt: Some("now add docs".to_string()),
            ..Default::default()
        };
        let inv = opts.invocation(&session).unwrap();
        assert!(inv.continue_session);
        assert_eq!(inv.mode, RunMode::Async);
        assert_eq!(inv.model, "sonnet");
        assert_eq!(inv.prompt.as_deref(), Some("now add docs"));
    }

    #[test]
    fn test_resume_invocation_interactive_drops_prompt() {
        let session = Session::new("a", "alpha", ProviderKind::Local);
        let opts = ResumeOptions {
            mode: ResumeMode::Interactive,
            prompt: Some("ignored".to_string()),
            model: Some("opus".to_string()),
            ..Default::default()
        };
        let inv = opts.invocation(&session).unwrap();
        assert_eq!(inv.prompt, None);
        assert_eq!(inv.model, "opus");
    }

    #[test]
    fn test_resume_invocation_shell_has_none() {
        let session = Session::new("a", "alpha", ProviderKind::Local);
        let opts = ResumeOptions {
            mode: ResumeMode::Shell,
            ..Default::default()
        };
        assert!(opts.invocation(&session).is_none());
    }

    #[test]
    fn test_bootstrap_script_clone_mode() {
        let argv = vec!["claude".to_string(), "fix it".to_string()];
        let script = bootstrap_script(Some("acme/widgets"), "fix-flaky-test", &argv);
        assert!(script.contains("git clone https://github.com/acme/widgets.git /work"));
        assert!(script.contains("git checkout fix-flaky-test 2>/dev/null || git checkout -b fix-flaky-test"));
        assert!(script.ends_with("exec claude 'fix it'"));
    }

    #[test]
    fn test_bootstrap_script_mount_mode_skips_clone() {
        let argv = vec!["claude".to_string()];
        let script = bootstrap_script(None, "main", &argv);
        assert!(!script.contains("git clone"));
        assert!(script.contains("cd /work"));
    }
}
