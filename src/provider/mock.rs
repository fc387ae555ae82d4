//! In-memory provider for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Notify;

use super::{
    CreateSpec, LogStream, Progress, ProviderError, ResumeMode, ResumeOptions, Result,
    SandboxProvider, SessionStats, ShellSpec,
};
use crate::session::{ProviderKind, Session, SessionStatus};

#[derive(Default)]
struct MockState {
    sessions: Vec<Session>,
    calls: Vec<String>,
    creates: Vec<CreateSpec>,
    logs: HashMap<String, Vec<String>>,
    next_id: u32,
    setup_needed: Option<String>,
    fail_lists: bool,
    fail_gets: bool,
    fail_removes: bool,
    fail_creates: bool,
    remove_gate: Option<Arc<Notify>>,
}

pub struct MockProvider {
    kind: ProviderKind,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_sessions(kind: ProviderKind, sessions: Vec<Session>) -> Self {
        let mock = Self::new(kind);
        mock.lock().sessions = sessions;
        mock
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn creates(&self) -> Vec<CreateSpec> {
        self.lock().creates.clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.lock().sessions.clone()
    }

    pub fn insert(&self, session: Session) {
        self.lock().sessions.push(session);
    }

    /// Simulate the substrate changing a session behind our back.
    pub fn set_status(&self, id: &str, status: SessionStatus) {
        if let Some(s) = self.lock().sessions.iter_mut().find(|s| s.id == id) {
            s.status = status;
        }
    }

    /// Simulate the substrate losing a session.
    pub fn forget(&self, id: &str) {
        self.lock().sessions.retain(|s| s.id != id);
    }

    pub fn set_logs(&self, id: &str, lines: Vec<String>) {
        self.lock().logs.insert(id.to_string(), lines);
    }

    pub fn set_setup_needed(&self, message: Option<&str>) {
        self.lock().setup_needed = message.map(str::to_string);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.lock().fail_lists = fail;
    }

    pub fn fail_gets(&self, fail: bool) {
        self.lock().fail_gets = fail;
    }

    pub fn fail_removes(&self, fail: bool) {
        self.lock().fail_removes = fail;
    }

    pub fn fail_creates(&self, fail: bool) {
        self.lock().fail_creates = fail;
    }

    /// Make `remove` wait until the returned handle is notified.
    pub fn hold_removes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().remove_gate = Some(gate.clone());
        gate
    }

    fn next_id(&self) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        format!("{}-{}", self.kind, state.next_id)
    }

    fn find(&self, id: &str) -> Option<Session> {
        self.lock().sessions.iter().find(|s| s.id == id).cloned()
    }
}

#[async_trait]
impl SandboxProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn ensure_ready(&self, progress: &Progress) -> Result<()> {
        self.record("ensure_ready".to_string());
        progress.report("Checking mock substrate");
        match self.lock().setup_needed.clone() {
            Some(message) => Err(ProviderError::NeedsSetup(message)),
            None => Ok(()),
        }
    }

    async fn create(&self, spec: CreateSpec) -> Result<Session> {
        self.record(format!("create:{}", spec.branch));
        spec.progress.report("Creating mock session");
        if self.lock().fail_creates {
            return Err(ProviderError::Command("create failed".to_string()));
        }
        if spec.mount_dir.is_some() && self.kind == ProviderKind::Cloud {
            return Err(ProviderError::Unsupported("Mount mode", "cloud"));
        }

        let mut session = Session::new(self.next_id(), spec.branch.clone(), self.kind);
        session.branch = spec.branch.clone();
        session.agent = spec.agent;
        session.model = spec.model.clone();
        session.repo = spec.repo.clone();
        session.prompt = spec.prompt.clone();
        session.mount_dir = spec.mount_dir.clone();
        session.interactive = spec.interactive();
        session.created = Utc::now();

        let mut state = self.lock();
        state.creates.push(spec);
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn resume(&self, id: &str, opts: ResumeOptions) -> Result<Session> {
        self.record(format!("resume:{}", id));
        let old = self
            .find(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;

        let mut session = old.clone();
        session.id = self.next_id();
        session.resumed_from = Some(old.id.clone());
        session.status = SessionStatus::Running;
        session.created = Utc::now();
        session.interactive = opts.mode != ResumeMode::Detached;
        if let Some(model) = opts.model {
            session.model = model;
        }
        if opts.mode == ResumeMode::Detached {
            if let Some(prompt) = opts.prompt {
                session.prompt = prompt;
            }
        }

        self.lock().sessions.push(session.clone());
        Ok(session)
    }

    async fn attach(&self, id: &str) -> Result<()> {
        self.record(format!("attach:{}", id));
        self.find(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn shell(&self, id: &str) -> Result<()> {
        self.record(format!("shell:{}", id));
        self.find(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.record(format!("stop:{}", id));
        self.set_status(id, SessionStatus::Stopped);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.record(format!("remove:{}", id));
        let gate = self.lock().remove_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.lock().fail_removes {
            return Err(ProviderError::Command(format!("failed to remove {}", id)));
        }
        self.forget(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        self.record(format!("get:{}", id));
        if self.lock().fail_gets {
            return Err(ProviderError::Command("get failed".to_string()));
        }
        Ok(self.find(id))
    }

    async fn list(&self) -> Result<Vec<Session>> {
        self.record("list".to_string());
        let state = self.lock();
        if let Some(message) = &state.setup_needed {
            return Err(ProviderError::NeedsSetup(message.clone()));
        }
        if state.fail_lists {
            return Err(ProviderError::Command("list failed".to_string()));
        }
        Ok(state.sessions.clone())
    }

    async fn stream_logs(&self, id: &str) -> Result<Option<LogStream>> {
        self.record(format!("logs:{}", id));
        let session = self
            .find(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        if !session.has_logs() {
            return Ok(None);
        }
        let lines = self.lock().logs.get(id).cloned().unwrap_or_default();
        Ok(Some(stream::iter(lines).boxed()))
    }

    async fn create_shell(&self, spec: ShellSpec) -> Result<Session> {
        self.record("create_shell".to_string());
        let branch = spec.branch.clone().unwrap_or_else(|| "shell".to_string());
        let mut session = Session::new(self.next_id(), format!("shell-{}", branch), self.kind);
        session.branch = branch;
        session.agent = spec.agent;
        session.repo = spec.repo.clone();
        session.mount_dir = spec.mount_dir.clone();
        session.interactive = true;
        self.lock().sessions.push(session.clone());
        Ok(session)
    }

    async fn stats(&self, id: &str) -> Result<Option<SessionStats>> {
        self.record(format!("stats:{}", id));
        if self.kind != ProviderKind::Local {
            return Ok(None);
        }
        Ok(self.find(id).filter(|s| s.status.is_running()).map(|_| SessionStats {
            cpu_percent: 1.5,
            memory_usage: "64MiB / 2GiB".to_string(),
            memory_percent: 3.1,
        }))
    }
}
