//! Main TUI application

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures_util::StreamExt;
use ratatui::prelude::*;
use tokio::sync::{mpsc, oneshot};

use super::components::{HelpOverlay, Toasts};
use super::dialogs::{ConfirmAction, ConfirmDialog, DialogResult, ResumeDialog};
use super::styles::Theme;
use super::views::{Action, DetailView, ListView, LogsView, PromptView};
use crate::collab::{ConfigReader, RepoResolver};
use crate::engine::reconcile::GONE_NOTICE_DELAY;
use crate::engine::{
    spawn_detail_poller, spawn_list_poller, spawn_stats_poller, AuthResume, HandoffResult,
    NextView, PollEvent, PollerHandle, PrCache, ResumeRequest, SessionStore, StartOutcome,
    StartRequest, TaskEvent, TaskQueue, Workflow, WorkflowError,
};
use crate::provider::{Progress, Providers, ShellSpec};
use crate::session::{SessionKey, SessionStatus, LOCAL_REPO};

/// Everything the UI needs from the outside world.
pub struct AppDeps {
    pub providers: Providers,
    pub workflow: Arc<Workflow>,
    pub config: Arc<dyn ConfigReader>,
    pub repo: Arc<dyn RepoResolver>,
    pub pr_cache: PrCache,
    pub max_concurrent_removals: Option<usize>,
    pub cwd: PathBuf,
}

enum View {
    List,
    Detail(DetailView),
    Prompt(PromptView),
    Logs(LogsView),
}

enum Job {
    Start(StartRequest),
    AfterLogin(AuthResume),
    Resume(ResumeRequest),
}

/// A workflow running in the background. Dropping it discards the result;
/// the workflow itself runs to completion.
struct WorkflowRun {
    step: Arc<Mutex<String>>,
    rx: oneshot::Receiver<crate::engine::workflow::Result<StartOutcome>>,
}

type Notice = std::result::Result<String, String>;

pub struct App {
    providers: Providers,
    workflow: Arc<Workflow>,
    config: Arc<dyn ConfigReader>,
    repo: Arc<dyn RepoResolver>,
    pr_cache: PrCache,
    cwd: String,

    store: SessionStore,
    tasks: TaskQueue,
    task_rx: mpsc::UnboundedReceiver<TaskEvent>,
    poll_tx: mpsc::UnboundedSender<PollEvent>,
    poll_rx: mpsc::UnboundedReceiver<PollEvent>,
    notice_tx: mpsc::UnboundedSender<Notice>,
    notice_rx: mpsc::UnboundedReceiver<Notice>,

    list_poller: Option<PollerHandle>,
    detail_poller: Option<PollerHandle>,
    stats_poller: Option<PollerHandle>,

    view: View,
    list: ListView,
    confirm: Option<ConfirmDialog>,
    resume: Option<ResumeDialog>,
    show_help: bool,
    toasts: Toasts,
    run: Option<WorkflowRun>,
    theme: Theme,

    /// Set when the loop should hand the terminal off.
    exit: Option<HandoffResult>,
}

impl App {
    pub fn new(deps: AppDeps) -> Self {
        let store = SessionStore::new();
        let (tasks, task_rx) = TaskQueue::new(store.clone(), deps.max_concurrent_removals);
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        Self {
            providers: deps.providers,
            workflow: deps.workflow,
            config: deps.config,
            repo: deps.repo,
            pr_cache: deps.pr_cache,
            cwd: deps.cwd.to_string_lossy().to_string(),
            store,
            tasks,
            task_rx,
            poll_tx,
            poll_rx,
            notice_tx,
            notice_rx,
            list_poller: None,
            detail_poller: None,
            stats_poller: None,
            view: View::List,
            list: ListView::new(),
            confirm: None,
            resume: None,
            show_help: false,
            toasts: Toasts::default(),
            run: None,
            theme: Theme::default(),
            exit: None,
        }
    }

    pub fn toast_error(&mut self, message: impl Into<String>) {
        self.toasts.error(message);
    }

    /// Start polling and show the seeded view.
    pub fn enter(&mut self, seed: NextView) {
        self.exit = None;
        self.list_poller = Some(spawn_list_poller(
            self.providers.clone(),
            self.store.clone(),
            self.poll_tx.clone(),
        ));

        match seed {
            NextView::List => self.show_list(),
            NextView::Detail(key) => self.show_detail(key),
            NextView::Prompt { notice } => {
                self.view = View::Prompt(PromptView::new(&self.config.read(), notice));
            }
            NextView::StartWorkflow(req) => {
                self.view = View::Prompt(PromptView::from_request(&self.config.read(), &req));
                self.spawn_job(Job::Start(req));
            }
            NextView::ResumeWorkflow(resume) => {
                let req = StartRequest {
                    prompt: resume.prompt.clone(),
                    agent: Some(resume.agent),
                    model: Some(resume.model.clone()),
                    mode: resume.mode,
                    mount_dir: resume.mount_dir.clone(),
                    provider: Some(resume.provider),
                    extra_args: resume.extra_args.clone(),
                };
                self.view = View::Prompt(PromptView::from_request(&self.config.read(), &req));
                self.spawn_job(Job::AfterLogin(resume));
            }
            NextView::ResumeSession(req) => {
                self.show_detail(req.key.clone());
                self.toasts.info(format!("Resuming {}", req.key.id));
                self.spawn_job(Job::Resume(req));
            }
        }
    }

    /// Stop every poller and drop view state tied to the terminal.
    pub fn leave(&mut self) {
        self.list_poller = None;
        self.detail_poller = None;
        self.stats_poller = None;
        self.run = None;
        self.confirm = None;
        self.resume = None;
        self.show_help = false;
        self.view = View::List;
    }

    pub async fn run(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    ) -> Result<HandoffResult> {
        terminal.clear()?;
        terminal.draw(|f| self.render(f))?;

        loop {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        if let Some(action) = self.handle_key(key) {
                            self.apply(action);
                        }
                        terminal.draw(|f| self.render(f))?;
                    }
                }
            }

            if let Some(result) = self.exit.take() {
                return Ok(result);
            }

            if self.tick() {
                terminal.draw(|f| self.render(f))?;
            }
            if let Some(result) = self.exit.take() {
                return Ok(result);
            }

            tokio::task::yield_now().await;
        }
    }

    /// Apply everything that arrived from background tasks. True when the
    /// screen needs redrawing.
    fn tick(&mut self) -> bool {
        let mut changed = self.toasts.expire(Instant::now());

        while let Ok(event) = self.poll_rx.try_recv() {
            self.on_poll(event);
            changed = true;
        }

        while let Ok(event) = self.task_rx.try_recv() {
            match event.result {
                Ok(()) => self.toasts.info(format!("{} {}: done", event.label, event.key.id)),
                Err(e) => self
                    .toasts
                    .error(format!("{} {} failed: {}", event.label, event.key.id, e)),
            }
            changed = true;
        }

        while let Ok(notice) = self.notice_rx.try_recv() {
            match notice {
                Ok(m) => self.toasts.info(m),
                Err(m) => self.toasts.error(m),
            }
            self.refresh();
            changed = true;
        }

        if let Some(run) = &mut self.run {
            let step = run.step.lock().map(|s| s.clone()).unwrap_or_default();
            if let View::Prompt(prompt) = &mut self.view {
                if prompt.running.as_deref() != Some(step.as_str()) {
                    prompt.running = Some(step);
                    changed = true;
                }
            }
            match run.rx.try_recv() {
                Ok(result) => {
                    self.run = None;
                    self.on_outcome(result);
                    changed = true;
                }
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.run = None;
                    self.toasts.error("Workflow ended unexpectedly");
                    changed = true;
                }
            }
        }

        match &mut self.view {
            View::Logs(logs) => changed |= logs.drain(),
            View::Detail(detail) => {
                if let Some(at) = detail.gone_at {
                    if at.elapsed() >= GONE_NOTICE_DELAY {
                        self.show_list();
                        return true;
                    }
                }
                let pr = self.pr_cache.peek(&detail.key).flatten();
                if pr != detail.pr {
                    detail.pr = pr;
                    changed = true;
                }
            }
            _ => {}
        }

        changed
    }

    fn on_poll(&mut self, event: PollEvent) {
        match event {
            PollEvent::List(_) => self.list.error = None,
            PollEvent::ListFailed(e) => self.list.error = Some(e),
            PollEvent::Detail(session) => {
                let View::Detail(detail) = &mut self.view else {
                    return;
                };
                if detail.key != session.key() {
                    return;
                }
                let running = session.status.is_running();
                detail.session = Some(session);
                detail.error = None;
                if running && self.stats_poller.is_none() {
                    self.stats_poller = spawn_stats_poller(
                        self.providers.get(detail.key.provider),
                        detail.key.clone(),
                        self.poll_tx.clone(),
                    );
                } else if !running {
                    self.stats_poller = None;
                    detail.stats = None;
                }
            }
            PollEvent::DetailFailed { key, message } => {
                if let View::Detail(detail) = &mut self.view {
                    if detail.key == key {
                        detail.error = Some(message);
                        if let Some(s) = &mut detail.session {
                            s.status = SessionStatus::Unknown;
                        }
                    }
                }
            }
            PollEvent::Gone(key) => {
                if let View::Detail(detail) = &mut self.view {
                    if detail.key == key {
                        detail.gone_at = Some(Instant::now());
                        self.stats_poller = None;
                    }
                }
            }
            PollEvent::Stats { key, stats } => {
                if let View::Detail(detail) = &mut self.view {
                    if detail.key == key {
                        detail.stats = Some(stats);
                    }
                }
            }
            PollEvent::StatsEnded(key) => {
                if let View::Detail(detail) = &mut self.view {
                    if detail.key == key {
                        self.stats_poller = None;
                        detail.stats = None;
                    }
                }
            }
        }
    }

    fn on_outcome(&mut self, result: crate::engine::workflow::Result<StartOutcome>) {
        match result {
            Ok(StartOutcome::Handoff(session)) => {
                let key = session.key();
                self.store.upsert(session);
                self.exit = Some(HandoffResult::AttachSession(key));
            }
            Ok(StartOutcome::Shell(session)) => {
                let key = session.key();
                self.store.upsert(session);
                self.exit = Some(HandoffResult::ExecShell(key));
            }
            Ok(StartOutcome::ShowDetail(session)) => {
                let key = session.key();
                self.toasts.info(format!("Started {}", session.name));
                self.store.upsert(session);
                self.show_detail(key);
            }
            Ok(StartOutcome::NeedsCloudSetup(pending)) => {
                self.exit = Some(HandoffResult::CloudSetup(pending));
            }
            Ok(StartOutcome::NeedsAgentAuth(login)) => {
                self.exit = Some(HandoffResult::NeedsAgentAuth(login));
            }
            Err(WorkflowError::NotFound(id)) => {
                self.toasts.error(format!("Session not found: {}", id));
                self.show_list();
            }
            Err(e) => {
                tracing::warn!("Workflow failed: {}", e);
                self.toasts.error(e.to_string());
                match &mut self.view {
                    View::Prompt(prompt) => {
                        prompt.running = None;
                        prompt.notice = Some(e.to_string());
                    }
                    _ => {
                        self.view =
                            View::Prompt(PromptView::new(&self.config.read(), Some(e.to_string())));
                    }
                }
            }
        }
    }

    fn spawn_job(&mut self, job: Job) {
        let step = Arc::new(Mutex::new("Starting".to_string()));
        let sink = step.clone();
        let progress = Progress::new(move |m| {
            if let Ok(mut s) = sink.lock() {
                *s = m.to_string();
            }
        });

        let (tx, rx) = oneshot::channel();
        let workflow = self.workflow.clone();
        tokio::spawn(async move {
            let result = match job {
                Job::Start(req) => workflow.start(req, progress).await,
                Job::AfterLogin(resume) => workflow.resume_after_login(resume, progress).await,
                Job::Resume(req) => workflow.resume(req, progress).await,
            };
            let _ = tx.send(result);
        });
        self.run = Some(WorkflowRun { step, rx });
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(Action::Quit);
        }

        if self.show_help {
            self.show_help = false;
            return None;
        }

        if let Some(dialog) = &mut self.confirm {
            match dialog.handle_key(key) {
                DialogResult::Continue => {}
                DialogResult::Cancel => self.confirm = None,
                DialogResult::Submit(action) => {
                    self.confirm = None;
                    self.confirmed(action);
                }
            }
            return None;
        }

        if let Some(dialog) = &mut self.resume {
            match dialog.handle_key(key) {
                DialogResult::Continue => {}
                DialogResult::Cancel => self.resume = None,
                DialogResult::Submit(req) => {
                    self.resume = None;
                    self.toasts.info(format!("Resuming {}", req.key.id));
                    self.spawn_job(Job::Resume(req));
                }
            }
            return None;
        }

        let sessions = self.store.visible();
        match &mut self.view {
            View::List => self.list.handle_key(key, &sessions),
            View::Detail(detail) => detail.handle_key(key),
            View::Prompt(prompt) => prompt.handle_key(key, &self.cwd),
            View::Logs(logs) => logs.handle_key(key),
        }
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Quit => self.exit = Some(HandoffResult::Quit),
            Action::Handoff(result) => self.exit = Some(result),
            Action::ShowList => {
                // Backing out of a running start drops its result.
                self.run = None;
                self.show_list();
            }
            Action::ShowDetail(key) => self.show_detail(key),
            Action::ShowPrompt => {
                self.view = View::Prompt(PromptView::new(&self.config.read(), None));
            }
            Action::ShowLogs(key) => self.show_logs(key),
            Action::NewShell => self.exit = Some(HandoffResult::Shell(self.shell_spec())),
            Action::Refresh => self.refresh(),
            Action::Confirm(action) => self.confirm = Some(self.confirm_dialog(action)),
            Action::Resume(session) => self.resume = Some(ResumeDialog::new(session)),
            Action::Start(req) => self.spawn_job(Job::Start(req)),
            Action::ToggleHelp => self.show_help = !self.show_help,
        }
    }

    fn confirm_dialog(&self, action: ConfirmAction) -> ConfirmDialog {
        let name = |key: &SessionKey| {
            self.store
                .get(key)
                .map(|s| s.name)
                .unwrap_or_else(|| key.id.clone())
        };
        match &action {
            ConfirmAction::Remove(key) => ConfirmDialog::new(
                "Delete session",
                format!("Delete {}? Its sandbox and any unsaved work are removed.", name(key)),
                action.clone(),
            ),
            ConfirmAction::Stop(key) => ConfirmDialog::new(
                "Stop session",
                format!("Stop {}? It can be resumed later.", name(key)),
                action.clone(),
            ),
            ConfirmAction::Clean => {
                let n = self
                    .store
                    .visible()
                    .iter()
                    .filter(|s| s.status.is_finished())
                    .count();
                ConfirmDialog::new(
                    "Clean up",
                    format!("Remove {} finished session(s)?", n),
                    action.clone(),
                )
            }
        }
    }

    fn confirmed(&mut self, action: ConfirmAction) {
        match action {
            ConfirmAction::Remove(key) => {
                self.tasks.enqueue_remove(&self.providers, key.clone());
                if matches!(&self.view, View::Detail(d) if d.key == key) {
                    self.show_list();
                }
            }
            ConfirmAction::Stop(key) => {
                let provider = self.providers.get(key.provider);
                let tx = self.notice_tx.clone();
                tokio::spawn(async move {
                    let notice = match provider.stop(&key.id).await {
                        Ok(()) => Ok(format!("Stopped {}", key.id)),
                        Err(e) => Err(format!("Stop {} failed: {}", key.id, e)),
                    };
                    let _ = tx.send(notice);
                });
            }
            ConfirmAction::Clean => {
                let n = self.tasks.clean(&self.providers).len();
                self.toasts.info(format!("Removing {} session(s)", n));
            }
        }
    }

    fn refresh(&self) {
        for poller in [&self.list_poller, &self.detail_poller, &self.stats_poller]
            .into_iter()
            .flatten()
        {
            poller.refresh();
        }
    }

    fn show_list(&mut self) {
        self.detail_poller = None;
        self.stats_poller = None;
        self.view = View::List;
    }

    fn show_detail(&mut self, key: SessionKey) {
        self.stats_poller = None;
        let session = self.store.get(&key);
        let mut detail = DetailView::new(key.clone(), session);
        detail.pr = self.pr_cache.peek(&key).flatten();
        self.detail_poller = Some(spawn_detail_poller(
            self.providers.clone(),
            self.store.clone(),
            key,
            Some(self.pr_cache.clone()),
            self.poll_tx.clone(),
        ));
        self.view = View::Detail(detail);
    }

    fn show_logs(&mut self, key: SessionKey) {
        self.detail_poller = None;
        self.stats_poller = None;

        let provider = self.providers.get(key.provider);
        let id = key.id.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            match provider.stream_logs(&id).await {
                Ok(Some(mut stream)) => {
                    while let Some(line) = stream.next().await {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    let _ = tx.send("(interactive sessions have no log output)".to_string());
                }
                Err(e) => {
                    let _ = tx.send(format!("Failed to read logs: {}", e));
                }
            }
        });
        self.view = View::Logs(LogsView::new(key, rx, task));
    }

    /// Scratch shell in the current repository, or the current directory
    /// mounted when there is none.
    fn shell_spec(&self) -> ShellSpec {
        let config = self.config.read();
        let (repo, branch, mount_dir) = match self.repo.get_repo_info() {
            Some(info) => (info.full_name, info.current_branch, None),
            None => (LOCAL_REPO.to_string(), None, Some(self.cwd.clone())),
        };
        ShellSpec {
            provider: self.providers.active_kind(),
            agent: config.agent,
            repo,
            branch,
            mount_dir,
            progress: Progress::none(),
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let sessions = self.store.visible();
        match &self.view {
            View::List => self.list.render(frame, area, &sessions, &self.theme),
            View::Detail(detail) => detail.render(frame, area, &self.theme),
            View::Prompt(prompt) => prompt.render(frame, area, &self.theme),
            View::Logs(logs) => logs.render(frame, area, &self.theme),
        }

        if let Some(dialog) = &self.confirm {
            dialog.render(frame, area, &self.theme);
        }
        if let Some(dialog) = &self.resume {
            dialog.render(frame, area, &self.theme);
        }
        if self.show_help {
            HelpOverlay::render(frame, area, &self.theme);
        }
        self.toasts.render(frame, area, &self.theme);
    }
}
