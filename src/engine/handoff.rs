//! Hand-off controller: alternates between the UI loop and a child process
//! that owns the terminal (agent attach, shell, interactive logins).
//!
//! The UI must have torn down its terminal surface before `run` returns; the
//! controller only then starts the child, and once the child exits it
//! re-seeds the UI with the view to come back to.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::workflow::{AgentLogin, AuthResume, Pending, ResumeRequest, StartRequest, WorkflowError};
use crate::agents::Agent;
use crate::collab::{AgentAuth, CloudAuth};
use crate::provider::{Providers, ShellSpec};
use crate::session::SessionKey;

#[derive(Debug, Clone)]
pub enum HandoffResult {
    AttachSession(SessionKey),
    ExecShell(SessionKey),
    NeedsAgentAuth(AgentLogin),
    /// Ad hoc shell in a disposable session.
    Shell(ShellSpec),
    /// Cloud login, then run the same start or resume again.
    CloudSetup(Pending),
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextView {
    List,
    Detail(SessionKey),
    ResumeWorkflow(AuthResume),
    StartWorkflow(StartRequest),
    /// Resume a session again after a login.
    ResumeSession(ResumeRequest),
    Prompt { notice: Option<String> },
}

#[async_trait]
pub trait UiLoop: Send {
    /// Runs until the UI wants to hand off the terminal or quit.
    async fn run(&mut self, seed: NextView) -> Result<HandoffResult>;

    /// Shown by the next `run`.
    fn report(&mut self, message: String);
}

#[async_trait]
pub trait ChildRunner: Send + Sync {
    async fn attach(&self, key: &SessionKey) -> Result<()>;
    async fn exec_shell(&self, key: &SessionKey) -> Result<()>;
    async fn login_agent(&self, agent: Agent) -> bool;
    async fn open_shell(&self, spec: ShellSpec) -> Result<()>;
    async fn cloud_login(&self) -> bool;
}

pub async fn run_controller(
    ui: &mut dyn UiLoop,
    children: &dyn ChildRunner,
    seed: NextView,
) -> Result<()> {
    let mut seed = seed;
    loop {
        let result = ui.run(seed).await?;
        tracing::debug!("Hand-off: {:?}", result);

        seed = match result {
            HandoffResult::Quit => return Ok(()),
            HandoffResult::AttachSession(key) => {
                if let Err(e) = children.attach(&key).await {
                    tracing::warn!("Attach to {} failed: {}", key, e);
                    ui.report(format!("Attach failed: {}", e));
                }
                NextView::Detail(key)
            }
            HandoffResult::ExecShell(key) => {
                if let Err(e) = children.exec_shell(&key).await {
                    tracing::warn!("Shell in {} failed: {}", key, e);
                    ui.report(format!("Shell failed: {}", e));
                }
                NextView::Detail(key)
            }
            HandoffResult::NeedsAgentAuth(login) => {
                let agent = login.agent();
                if !children.login_agent(agent).await {
                    return Err(WorkflowError::LoginFailed(agent).into());
                }
                match login {
                    AgentLogin::Start(resume) => NextView::ResumeWorkflow(resume),
                    AgentLogin::Resume { req, .. } => NextView::ResumeSession(req),
                }
            }
            HandoffResult::Shell(spec) => {
                if let Err(e) = children.open_shell(spec).await {
                    tracing::warn!("Shell session failed: {}", e);
                    ui.report(format!("Shell failed: {}", e));
                }
                NextView::List
            }
            HandoffResult::CloudSetup(pending) => {
                let logged_in = children.cloud_login().await;
                match pending {
                    Pending::Start(req) if logged_in => NextView::StartWorkflow(req),
                    Pending::Start(_) => NextView::Prompt {
                        notice: Some("Cloud login did not complete".to_string()),
                    },
                    Pending::Resume(req) if logged_in => NextView::ResumeSession(req),
                    Pending::Resume(req) => {
                        ui.report("Cloud login did not complete".to_string());
                        NextView::Detail(req.key)
                    }
                }
            }
        };
    }
}

/// The real children: provider attach/shell and the agent's own login, all
/// on the inherited terminal.
pub struct ProcessRunner {
    providers: Providers,
    agent_auth: Arc<dyn AgentAuth>,
    cloud_auth: Arc<dyn CloudAuth>,
}

impl ProcessRunner {
    pub fn new(
        providers: Providers,
        agent_auth: Arc<dyn AgentAuth>,
        cloud_auth: Arc<dyn CloudAuth>,
    ) -> Self {
        Self {
            providers,
            agent_auth,
            cloud_auth,
        }
    }
}

#[async_trait]
impl ChildRunner for ProcessRunner {
    async fn attach(&self, key: &SessionKey) -> Result<()> {
        self.providers.get(key.provider).attach(&key.id).await?;
        Ok(())
    }

    async fn exec_shell(&self, key: &SessionKey) -> Result<()> {
        self.providers.get(key.provider).shell(&key.id).await?;
        Ok(())
    }

    async fn login_agent(&self, agent: Agent) -> bool {
        self.agent_auth.ensure_auth(agent).await
    }

    async fn open_shell(&self, spec: ShellSpec) -> Result<()> {
        let provider = self.providers.get(spec.provider);
        let session = provider.create_shell(spec).await?;
        let result = provider.shell(&session.id).await;
        if let Err(e) = provider.remove(&session.id).await {
            tracing::warn!("Failed to remove shell session {}: {}", session.id, e);
        }
        result?;
        Ok(())
    }

    async fn cloud_login(&self) -> bool {
        let auth = self.cloud_auth.clone();
        tokio::task::spawn_blocking(move || auth.login())
            .await
            .unwrap_or(false)
    }
}
