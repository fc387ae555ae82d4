//! Start and resume workflows: the ordered steps that turn a prompt (or an
//! earlier session) into a running session.
//!
//! Any step failure aborts the rest. Side effects already performed, like a
//! database fork, are left in place.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::agents::Agent;
use crate::collab::{
    random_branch, sanitize_branch, with_suffix, AgentAuth, BranchNamer, CloudAuth, ConfigReader,
    DatabaseForker, HostAuth, RepoInfo, RepoResolver,
};
use crate::provider::{
    CreateSpec, ErrorKind, Progress, ProviderError, Providers, ResumeMode, ResumeOptions,
    SandboxProvider,
};
use crate::session::{ProviderKind, RunMode, Session, SessionKey, LOCAL_REPO};

/// Attempts at a suffixed branch name before falling back to a random one.
pub const BRANCH_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    CheckingCredentials,
    PreparingSubstrate,
    CheckingAgentCredentials,
    ResolvingRepoContext,
    NamingBranch,
    ForkingDatabase,
    CheckingHostCredentials,
    CreatingSession,
}

impl WorkflowStep {
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowStep::CheckingCredentials => "Checking cloud credentials",
            WorkflowStep::PreparingSubstrate => "Preparing sandbox",
            WorkflowStep::CheckingAgentCredentials => "Checking agent credentials",
            WorkflowStep::ResolvingRepoContext => "Resolving repository",
            WorkflowStep::NamingBranch => "Naming branch",
            WorkflowStep::ForkingDatabase => "Forking database",
            WorkflowStep::CheckingHostCredentials => "Checking GitHub credentials",
            WorkflowStep::CreatingSession => "Creating session",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Setup(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("{}: {message}", .step.label())]
    Step { step: WorkflowStep, message: String },

    #[error("{0} login failed")]
    LoginFailed(Agent),
}

impl WorkflowError {
    fn at(step: WorkflowStep, err: ProviderError) -> Self {
        match err.kind() {
            ErrorKind::Configuration => WorkflowError::Config(err.to_string()),
            ErrorKind::SetupNeeded => WorkflowError::Setup(err.to_string()),
            ErrorKind::NotFound => WorkflowError::NotFound(err.to_string()),
            ErrorKind::Transient => WorkflowError::Step {
                step,
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartRequest {
    pub prompt: String,
    /// Config default when unset.
    pub agent: Option<Agent>,
    pub model: Option<String>,
    pub mode: RunMode,
    /// Mount this directory instead of cloning.
    pub mount_dir: Option<String>,
    pub provider: Option<ProviderKind>,
    pub extra_args: Vec<String>,
}

/// Everything needed to re-enter a start at `ResolvingRepoContext` after an
/// interactive agent login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResume {
    pub agent: Agent,
    pub model: String,
    pub prompt: String,
    pub mount_dir: Option<String>,
    pub is_git_repo: bool,
    pub mode: RunMode,
    pub provider: ProviderKind,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeRequest {
    pub key: SessionKey,
    pub mode: ResumeMode,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub extra_args: Vec<String>,
}

/// A start or resume waiting on a cloud login, re-run unchanged afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    Start(StartRequest),
    Resume(ResumeRequest),
}

/// A workflow waiting on an interactive agent login.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentLogin {
    /// Re-entered at `ResolvingRepoContext` through `resume_after_login`.
    Start(AuthResume),
    /// Re-run through `resume` with the same request.
    Resume { agent: Agent, req: ResumeRequest },
}

impl AgentLogin {
    pub fn agent(&self) -> Agent {
        match self {
            AgentLogin::Start(resume) => resume.agent,
            AgentLogin::Resume { agent, .. } => *agent,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Interactive or plan: attach the terminal to the session.
    Handoff(Session),
    /// Exec a shell into the session.
    Shell(Session),
    /// Detached: show the session's detail view.
    ShowDetail(Session),
    NeedsCloudSetup(Pending),
    NeedsAgentAuth(AgentLogin),
}

pub struct Workflow {
    providers: Providers,
    config: Arc<dyn ConfigReader>,
    agent_auth: Arc<dyn AgentAuth>,
    host_auth: Arc<dyn HostAuth>,
    namer: Arc<dyn BranchNamer>,
    repo: Arc<dyn RepoResolver>,
    forker: Arc<dyn DatabaseForker>,
    cloud_auth: Arc<dyn CloudAuth>,
    cwd: PathBuf,
}

pub struct Collaborators {
    pub config: Arc<dyn ConfigReader>,
    pub agent_auth: Arc<dyn AgentAuth>,
    pub host_auth: Arc<dyn HostAuth>,
    pub namer: Arc<dyn BranchNamer>,
    pub repo: Arc<dyn RepoResolver>,
    pub forker: Arc<dyn DatabaseForker>,
    pub cloud_auth: Arc<dyn CloudAuth>,
}

/// State carried from `ResolvingRepoContext` onwards.
struct Resolved {
    agent: Agent,
    model: String,
    prompt: String,
    mode: RunMode,
    provider: ProviderKind,
    extra_args: Vec<String>,
    repo: Option<RepoInfo>,
    mount_dir: Option<String>,
}

impl Workflow {
    pub fn new(providers: Providers, collab: Collaborators, cwd: PathBuf) -> Self {
        Self {
            providers,
            config: collab.config,
            agent_auth: collab.agent_auth,
            host_auth: collab.host_auth,
            namer: collab.namer,
            repo: collab.repo,
            forker: collab.forker,
            cloud_auth: collab.cloud_auth,
            cwd,
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    fn provider(&self, kind: ProviderKind) -> Arc<dyn SandboxProvider> {
        self.providers.get(kind)
    }

    /// Cloud token check and substrate readiness, shared by start and resume.
    /// `false` means the cloud provider needs a login first.
    async fn prepare(&self, kind: ProviderKind, progress: &Progress) -> Result<bool> {
        if kind == ProviderKind::Cloud {
            progress.report(WorkflowStep::CheckingCredentials.label());
            if self.cloud_auth.token().is_none() {
                return Ok(false);
            }
        }

        progress.report(WorkflowStep::PreparingSubstrate.label());
        match self.provider(kind).ensure_ready(progress).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::SetupNeeded && kind == ProviderKind::Cloud => Ok(false),
            Err(e) => Err(WorkflowError::at(WorkflowStep::PreparingSubstrate, e)),
        }
    }

    pub async fn start(&self, req: StartRequest, progress: Progress) -> Result<StartOutcome> {
        let config = self.config.read();
        let provider = req.provider.unwrap_or_else(|| config.provider());
        let agent = req.agent.unwrap_or(config.agent);
        let model = req.model.clone().unwrap_or_else(|| {
            if agent == config.agent {
                config.model.clone()
            } else {
                agent.default_model().to_string()
            }
        });

        // Decided without touching any provider.
        let repo_info = self.repo.get_repo_info();
        let mount_forced = req.mount_dir.is_some() || repo_info.is_none();
        if provider == ProviderKind::Cloud && mount_forced {
            let why = if repo_info.is_none() {
                "no git repository with a remote was found here"
            } else {
                "a mount directory was requested"
            };
            return Err(WorkflowError::Config(format!(
                "The cloud provider cannot mount local directories, and {}",
                why
            )));
        }

        if !self.prepare(provider, &progress).await? {
            let mut req = req;
            req.provider = Some(provider);
            return Ok(StartOutcome::NeedsCloudSetup(Pending::Start(req)));
        }

        let resume = AuthResume {
            agent,
            model,
            prompt: req.prompt,
            mount_dir: req.mount_dir,
            is_git_repo: !mount_forced,
            mode: req.mode,
            provider,
            extra_args: req.extra_args,
        };

        progress.report(WorkflowStep::CheckingAgentCredentials.label());
        if !self
            .agent_auth
            .check_credentials(resume.agent, &resume.model)
            .await
        {
            return Ok(StartOutcome::NeedsAgentAuth(AgentLogin::Start(resume)));
        }

        self.from_repo_context(resume, &progress).await
    }

    /// Re-enter a start after a successful agent login, with exactly the
    /// parameters that were in effect when it was interrupted.
    pub async fn resume_after_login(
        &self,
        resume: AuthResume,
        progress: Progress,
    ) -> Result<StartOutcome> {
        self.from_repo_context(resume, &progress).await
    }

    async fn from_repo_context(&self, resume: AuthResume, progress: &Progress) -> Result<StartOutcome> {
        progress.report(WorkflowStep::ResolvingRepoContext.label());
        let (repo, mount_dir) = if resume.is_git_repo {
            let info = self.repo.get_repo_info().ok_or_else(|| {
                WorkflowError::Config("Repository context is no longer available".to_string())
            })?;
            (Some(info), None)
        } else {
            let dir = resume
                .mount_dir
                .clone()
                .unwrap_or_else(|| self.cwd.to_string_lossy().to_string());
            (None, Some(dir))
        };

        if resume.provider == ProviderKind::Cloud && mount_dir.is_some() {
            return Err(WorkflowError::Config(
                "The cloud provider does not support mount mode".to_string(),
            ));
        }

        let resolved = Resolved {
            agent: resume.agent,
            model: resume.model,
            prompt: resume.prompt,
            mode: resume.mode,
            provider: resume.provider,
            extra_args: resume.extra_args,
            repo,
            mount_dir,
        };

        progress.report(WorkflowStep::NamingBranch.label());
        let branch = self.name_branch(&resolved).await;

        let mut env = Vec::new();
        if resolved.mode != RunMode::Plan {
            if let Some(service) = self.config.read().tiger_service_id.resolve() {
                progress.report(WorkflowStep::ForkingDatabase.label());
                let fork = self.forker.fork(&branch, &service).await.map_err(|e| {
                    WorkflowError::Step {
                        step: WorkflowStep::ForkingDatabase,
                        message: e.to_string(),
                    }
                })?;
                env.extend(fork.env_vars);
            }
        }

        if resolved.repo.is_some() {
            progress.report(WorkflowStep::CheckingHostCredentials.label());
            if !self.host_auth.check_credentials().await {
                return Err(WorkflowError::Config(
                    "GitHub credentials are missing; run `gh auth login` or set GH_TOKEN"
                        .to_string(),
                ));
            }
        }

        progress.report(WorkflowStep::CreatingSession.label());
        let spec = CreateSpec {
            branch,
            prompt: resolved.prompt.clone(),
            agent: resolved.agent,
            model: resolved.model.clone(),
            mode: resolved.mode,
            repo: resolved
                .repo
                .as_ref()
                .map(|r| r.full_name.clone())
                .unwrap_or_else(|| LOCAL_REPO.to_string()),
            env,
            mount_dir: resolved.mount_dir.clone(),
            extra_args: resolved.extra_args.clone(),
            progress: progress.clone(),
        };
        let session = self
            .provider(resolved.provider)
            .create(spec)
            .await
            .map_err(|e| WorkflowError::at(WorkflowStep::CreatingSession, e))?;

        tracing::info!("Created session {} on {}", session.id, session.branch);
        Ok(if resolved.mode.hands_off() {
            StartOutcome::Handoff(session)
        } else {
            StartOutcome::ShowDetail(session)
        })
    }

    /// Agent-synthesized name when there is a prompt, `<mode>-<random>`
    /// otherwise. Taken names get a random suffix, up to `BRANCH_ATTEMPTS`
    /// times, before falling back to a fully random name.
    async fn name_branch(&self, r: &Resolved) -> String {
        let base = if r.prompt.trim().is_empty() {
            random_branch(r.mode)
        } else {
            match self.namer.generate(&r.prompt, r.agent, &r.model).await {
                Ok(name) => sanitize_branch(&name),
                Err(e) => {
                    tracing::warn!("Branch naming failed, using a random name: {}", e);
                    random_branch(r.mode)
                }
            }
        };
        let base = if base.is_empty() {
            random_branch(r.mode)
        } else {
            base
        };

        let mut candidate = base.clone();
        for _ in 0..BRANCH_ATTEMPTS {
            if !self.providers.branch_taken(&candidate).await {
                return candidate;
            }
            candidate = with_suffix(&base);
        }
        random_branch(r.mode)
    }

    /// Same shape as `start`: a missing login comes back as an outcome
    /// holding `req`, and running `resume` again afterwards picks up where
    /// this left off.
    pub async fn resume(&self, req: ResumeRequest, progress: Progress) -> Result<StartOutcome> {
        let kind = req.key.provider;
        if !self.prepare(kind, &progress).await? {
            return Ok(StartOutcome::NeedsCloudSetup(Pending::Resume(req)));
        }

        let provider = self.provider(kind);
        let old = provider
            .get(&req.key.id)
            .await
            .map_err(|e| WorkflowError::at(WorkflowStep::PreparingSubstrate, e))?
            .ok_or_else(|| WorkflowError::NotFound(req.key.id.clone()))?;

        progress.report(WorkflowStep::CheckingAgentCredentials.label());
        let model = req.model.clone().unwrap_or_else(|| old.model.clone());
        if req.mode != ResumeMode::Shell && !self.agent_auth.check_credentials(old.agent, &model).await {
            return Ok(StartOutcome::NeedsAgentAuth(AgentLogin::Resume {
                agent: old.agent,
                req,
            }));
        }

        progress.report(WorkflowStep::CreatingSession.label());
        let opts = ResumeOptions {
            mode: req.mode,
            prompt: req.prompt,
            model: req.model,
            extra_args: req.extra_args,
            progress: progress.clone(),
        };
        let session = provider
            .resume(&req.key.id, opts)
            .await
            .map_err(|e| WorkflowError::at(WorkflowStep::CreatingSession, e))?;

        Ok(match req.mode {
            ResumeMode::Interactive => StartOutcome::Handoff(session),
            ResumeMode::Shell => StartOutcome::Shell(session),
            ResumeMode::Detached => StartOutcome::ShowDetail(session),
        })
    }
}
