//! Session lifecycle commands: start, resume, attach, shell, logs, stop, rm, clean

use anyhow::{bail, Result};
use clap::Args;
use futures_util::StreamExt;

use super::list::{render_session, OutputFormat};
use super::{load_sessions, resolve_session, Services};
use crate::agents::Agent;
use crate::collab::{ConfigReader, RepoResolver};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::{
    AgentLogin, ChildRunner, Pending, ResumeRequest, SessionStore, StartOutcome, StartRequest,
    TaskEvent, TaskQueue, WorkflowError,
};
use crate::provider::{Progress, ResumeMode, ShellSpec};
use crate::session::{ProviderKind, RunMode, Session, LOCAL_REPO};

#[derive(Args)]
pub struct StartArgs {
    /// What the agent should do
    pub prompt: Option<String>,

    /// Agent to run (defaults to the configured agent)
    #[arg(long, value_enum)]
    pub agent: Option<Agent>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,

    /// How the agent is driven
    #[arg(long, value_enum, default_value_t = RunMode::Interactive)]
    pub mode: RunMode,

    /// Mount this directory instead of cloning the repository
    #[arg(long, value_name = "DIR")]
    pub mount: Option<String>,

    /// Extra arguments passed to the agent
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

#[derive(Args)]
pub struct ResumeArgs {
    /// Session id, id prefix or name
    pub id: String,

    /// How to continue the session
    #[arg(long, value_enum, default_value_t = ResumeMode::Interactive)]
    pub mode: ResumeMode,

    /// Follow-up prompt (detached mode)
    #[arg(long)]
    pub prompt: Option<String>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Args)]
pub struct AttachArgs {
    /// Session id, id prefix or name
    pub id: String,
}

#[derive(Args)]
pub struct ShellArgs {
    /// Session id, id prefix or name; a scratch sandbox when omitted
    pub id: Option<String>,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Session id, id prefix or name
    pub id: String,
}

#[derive(Args)]
pub struct StopArgs {
    /// Session id, id prefix or name
    pub id: String,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Session ids, id prefixes or names
    #[arg(required = true)]
    pub ids: Vec<String>,
}

fn step_printer() -> Progress {
    Progress::new(|message| eprintln!("  {}...", message))
}

impl StartArgs {
    fn request(self, provider: Option<ProviderKind>) -> StartRequest {
        StartRequest {
            prompt: self.prompt.unwrap_or_default(),
            agent: self.agent,
            model: self.model,
            mode: self.mode,
            mount_dir: self.mount,
            provider,
            extra_args: self.extra_args,
        }
    }
}

/// Drive a workflow outcome to completion on this terminal: logins happen
/// inline and the interrupted start or resume is re-entered once after each.
async fn finish(services: &Services, first: StartOutcome, progress: Progress) -> Result<()> {
    let children = services.children();
    let mut outcome = first;
    let mut cloud_login_done = false;
    let mut agent_login_done = false;

    loop {
        outcome = match outcome {
            StartOutcome::Handoff(session) => {
                println!("✓ Started session: {}", session.name);
                children.attach(&session.key()).await?;
                return Ok(());
            }
            StartOutcome::Shell(session) => {
                children.exec_shell(&session.key()).await?;
                return Ok(());
            }
            StartOutcome::ShowDetail(session) => {
                println!("✓ Started session: {}", session.name);
                println!("{}", render_session(&session, OutputFormat::Table)?);
                println!();
                println!("Follow its output with: asb logs {}", session.id);
                return Ok(());
            }
            StartOutcome::NeedsCloudSetup(pending) => {
                if cloud_login_done {
                    bail!("Cloud sandbox is still not ready after login");
                }
                println!("Cloud sandbox credentials are missing; starting login.");
                if !children.cloud_login().await {
                    bail!("Cloud login did not complete");
                }
                cloud_login_done = true;
                match pending {
                    Pending::Start(req) => services.workflow.start(req, progress.clone()).await?,
                    Pending::Resume(req) => services.workflow.resume(req, progress.clone()).await?,
                }
            }
            StartOutcome::NeedsAgentAuth(login) => {
                let agent = login.agent();
                if agent_login_done {
                    bail!("{} credentials are still missing after login", agent);
                }
                println!("{} needs to log in.", agent);
                if !children.login_agent(agent).await {
                    return Err(WorkflowError::LoginFailed(agent).into());
                }
                agent_login_done = true;
                match login {
                    AgentLogin::Start(resume) => {
                        services
                            .workflow
                            .resume_after_login(resume, progress.clone())
                            .await?
                    }
                    AgentLogin::Resume { req, .. } => {
                        services.workflow.resume(req, progress.clone()).await?
                    }
                }
            }
        };
    }
}

pub async fn start(
    services: &Services,
    provider: Option<ProviderKind>,
    args: StartArgs,
) -> Result<()> {
    let req = args.request(provider);
    let progress = step_printer();
    let outcome = services.workflow.start(req, progress.clone()).await?;
    finish(services, outcome, progress).await
}

async fn resolve(services: &Services, only: Option<ProviderKind>, id: &str) -> Result<Session> {
    let sessions = load_sessions(&services.providers, only).await?;
    let session = resolve_session(id, &sessions, services.providers.in_order())?;
    Ok(session.clone())
}

pub async fn resume(
    services: &Services,
    only: Option<ProviderKind>,
    args: ResumeArgs,
) -> Result<()> {
    if args.mode == ResumeMode::Detached && args.prompt.as_deref().unwrap_or("").is_empty() {
        bail!("A detached resume needs --prompt");
    }
    let session = resolve(services, only, &args.id).await?;
    let req = ResumeRequest {
        key: session.key(),
        mode: args.mode,
        prompt: args.prompt,
        model: args.model,
        extra_args: Vec::new(),
    };
    let progress = step_printer();
    let outcome = services.workflow.resume(req, progress.clone()).await?;
    finish(services, outcome, progress).await
}

pub async fn attach(
    services: &Services,
    only: Option<ProviderKind>,
    args: AttachArgs,
) -> Result<()> {
    let session = resolve(services, only, &args.id).await?;
    if !session.status.is_running() {
        bail!(
            "Session {} is {}; resume it with: asb resume {}",
            session.name,
            session.status.label(),
            session.id
        );
    }
    services.children().attach(&session.key()).await
}

pub async fn shell(services: &Services, only: Option<ProviderKind>, args: ShellArgs) -> Result<()> {
    let children = services.children();

    let Some(id) = args.id else {
        let config = services.reader.read();
        let (repo, branch, mount_dir) = match services.repo.get_repo_info() {
            Some(info) => (info.full_name, info.current_branch, None),
            None => (
                LOCAL_REPO.to_string(),
                None,
                Some(services.cwd.to_string_lossy().to_string()),
            ),
        };
        let spec = ShellSpec {
            provider: only.unwrap_or_else(|| services.providers.active_kind()),
            agent: config.agent,
            repo,
            branch,
            mount_dir,
            progress: step_printer(),
        };
        return children.open_shell(spec).await;
    };

    let session = resolve(services, only, &id).await?;
    if session.status.is_running() {
        return children.exec_shell(&session.key()).await;
    }

    let req = ResumeRequest {
        key: session.key(),
        mode: ResumeMode::Shell,
        prompt: None,
        model: None,
        extra_args: Vec::new(),
    };
    let progress = step_printer();
    let outcome = services.workflow.resume(req, progress.clone()).await?;
    finish(services, outcome, progress).await
}

pub async fn logs(services: &Services, only: Option<ProviderKind>, args: LogsArgs) -> Result<()> {
    let session = resolve(services, only, &args.id).await?;
    if !session.has_logs() {
        bail!(
            "Session {} is interactive and has no logs; attach with: asb attach {}",
            session.name,
            session.id
        );
    }

    let provider = services.providers.get(session.provider);
    let Some(mut stream) = provider.stream_logs(&session.id).await? else {
        bail!("Session not found: {}", args.id);
    };

    loop {
        tokio::select! {
            line = stream.next() => match line {
                Some(line) => println!("{}", line),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

pub async fn stop(services: &Services, only: Option<ProviderKind>, args: StopArgs) -> Result<()> {
    let session = resolve(services, only, &args.id).await?;
    services
        .providers
        .get(session.provider)
        .stop(&session.id)
        .await?;
    println!("✓ Stopped session: {}", session.name);
    Ok(())
}

/// Runs removals through the task queue and waits for all of them.
async fn remove_through_queue(
    services: &Services,
    sessions: Vec<Session>,
    targets: Option<Vec<Session>>,
) -> Result<()> {
    let store = SessionStore::new();
    store.replace_all(sessions);
    let (tasks, mut events) = TaskQueue::new(
        store.clone(),
        services.config.tasks.max_concurrent_removals,
    );

    let handles = match targets {
        Some(targets) => targets
            .into_iter()
            .map(|s| tasks.enqueue_remove(&services.providers, s.key()))
            .collect(),
        None => tasks.clean(&services.providers),
    };
    if handles.is_empty() {
        println!("No finished sessions to clean.");
        return Ok(());
    }
    let expected = handles.len();
    let (finished, panicked) = collect_events(handles, &mut events).await;

    let mut failed = panicked;
    for event in finished {
        match event.result {
            Ok(()) => println!("✓ Removed session: {}", event.key.id),
            Err(e) => {
                failed += 1;
                eprintln!("✗ Failed to remove {}: {}", event.key.id, e);
            }
        }
    }
    if panicked > 0 {
        eprintln!("✗ {} removal task(s) crashed", panicked);
    }

    if failed > 0 {
        bail!("{} of {} removals failed", failed, expected);
    }
    Ok(())
}

/// Wait for every task, then take the events they sent. A task that panicked
/// sends none; those are counted separately.
async fn collect_events(
    handles: Vec<JoinHandle<()>>,
    events: &mut mpsc::UnboundedReceiver<TaskEvent>,
) -> (Vec<TaskEvent>, usize) {
    let mut panicked = 0;
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!("Removal task ended abnormally: {}", e);
            panicked += 1;
        }
    }

    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        finished.push(event);
    }
    (finished, panicked)
}

pub async fn remove(
    services: &Services,
    only: Option<ProviderKind>,
    args: RemoveArgs,
) -> Result<()> {
    let sessions = load_sessions(&services.providers, only).await?;
    let mut targets: Vec<Session> = Vec::new();
    for id in &args.ids {
        let session = resolve_session(id, &sessions, services.providers.in_order())?;
        if !targets.iter().any(|t| t.key() == session.key()) {
            targets.push(session.clone());
        }
    }
    remove_through_queue(services, sessions, Some(targets)).await
}

pub async fn clean(services: &Services, only: Option<ProviderKind>) -> Result<()> {
    let sessions = load_sessions(&services.providers, only).await?;
    remove_through_queue(services, sessions, None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKey;

    fn args(prompt: Option<&str>, mode: RunMode) -> StartArgs {
        StartArgs {
            prompt: prompt.map(str::to_string),
            agent: None,
            model: None,
            mode,
            mount: Some("/work".to_string()),
            extra_args: vec!["--verbose".to_string()],
        }
    }

    #[test]
    fn test_async_start_allows_empty_prompt() {
        let req = args(None, RunMode::Async).request(None);
        assert_eq!(req.prompt, "");
        assert_eq!(req.mode, RunMode::Async);
    }

    #[test]
    fn test_interactive_start_allows_empty_prompt() {
        let req = args(None, RunMode::Interactive).request(Some(ProviderKind::Cloud));
        assert_eq!(req.prompt, "");
        assert_eq!(req.provider, Some(ProviderKind::Cloud));
        assert_eq!(req.mount_dir.as_deref(), Some("/work"));
        assert_eq!(req.extra_args, vec!["--verbose".to_string()]);
    }

    #[tokio::test]
    async fn test_crashed_removal_is_counted_without_hanging() {
        let (tasks, mut events) = TaskQueue::new(SessionStore::new(), None);
        let ok = tasks.enqueue("Remove", SessionKey::new(ProviderKind::Local, "a"), async {
            Ok::<(), crate::provider::ProviderError>(())
        });
        let crashed = tasks.enqueue("Remove", SessionKey::new(ProviderKind::Local, "b"), async {
            if true {
                panic!("provider blew up");
            }
            Ok::<(), crate::provider::ProviderError>(())
        });

        let (finished, panicked) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            collect_events(vec![ok, crashed], &mut events),
        )
        .await
        .expect("collecting removal events hung");

        assert_eq!(panicked, 1);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].key.id, "a");
        assert!(finished[0].result.is_ok());
    }
}
