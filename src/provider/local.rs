//! Local provider: sessions are containers on the host's Docker daemon.
//!
//! Session metadata lives in container labels, so the daemon is the only
//! source of truth and nothing is persisted on our side.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    bootstrap_script, CreateSpec, LogStream, Progress, ProviderError, ResumeMode, ResumeOptions,
    Result, SandboxProvider, SessionStats, ShellSpec,
};
use crate::agents::{self, Agent};
use crate::cli::truncate_id;
use crate::containers::error::DockerError;
use crate::containers::{
    generate_name, resume_image, ContainerConfig, ContainerInfo, ContainerRuntimeInterface,
    Docker, VolumeMount, SESSION_LABEL, WORK_DIR,
};
use crate::session::config::LocalConfig;
use crate::session::{ProviderKind, Session, SessionStatus, LOCAL_REPO};

pub mod labels {
    pub const SESSION: &str = "asb.session";
    pub const NAME: &str = "asb.name";
    pub const BRANCH: &str = "asb.branch";
    pub const AGENT: &str = "asb.agent";
    pub const MODEL: &str = "asb.model";
    pub const REPO: &str = "asb.repo";
    pub const PROMPT: &str = "asb.prompt";
    pub const CREATED: &str = "asb.created";
    pub const INTERACTIVE: &str = "asb.interactive";
    pub const MOUNT_DIR: &str = "asb.mount_dir";
    pub const RESUMED_FROM: &str = "asb.resumed_from";
    pub const KIND: &str = "asb.kind";
}

const SHELL_COMMAND: &[&str] = &["sh", "-c", "command -v bash >/dev/null 2>&1 && exec bash || exec sh"];
const IDLE_COMMAND: &str = "exec sleep infinity";

/// Exit codes docker reports for containers ended by `docker stop`.
const STOP_EXIT_CODES: [i32; 2] = [137, 143];

pub struct LocalProvider<R: ContainerRuntimeInterface = Docker> {
    runtime: R,
    settings: LocalConfig,
    home: Option<PathBuf>,
}

impl LocalProvider<Docker> {
    pub fn new(settings: LocalConfig) -> Self {
        Self::with_runtime(Docker, settings)
    }
}

impl<R: ContainerRuntimeInterface> LocalProvider<R> {
    pub fn with_runtime(runtime: R, settings: LocalConfig) -> Self {
        Self {
            runtime,
            settings,
            home: dirs::home_dir(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    async fn require(&self, id: &str) -> Result<Session> {
        self.get(id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    /// Host env passed through to every session.
    fn host_env(&self, agent: Agent, git_mode: bool) -> Vec<(String, String)> {
        let mut names: Vec<&str> = agent.def().credential_env.to_vec();
        names.extend(self.settings.extra_env.iter().map(String::as_str));
        if git_mode {
            names.extend(["GH_TOKEN", "GITHUB_TOKEN"]);
        }

        let mut env = Vec::new();
        for name in names {
            if env.iter().any(|(k, _): &(String, String)| k == name) {
                continue;
            }
            if let Ok(value) = std::env::var(name) {
                env.push((name.to_string(), value));
            }
        }
        env
    }

    fn volumes(&self, agent: Agent, mount_dir: Option<&str>) -> Vec<VolumeMount> {
        let mut volumes = Vec::new();

        let config_dir = agent.def().config_dir;
        if let Some(host_dir) = self.home.as_ref().map(|h| h.join(config_dir)) {
            if host_dir.is_dir() {
                volumes.push(VolumeMount {
                    host_path: host_dir.to_string_lossy().to_string(),
                    container_path: format!("/root/{}", config_dir),
                    read_only: false,
                });
            }
        }

        if let Some(dir) = mount_dir {
            volumes.push(VolumeMount {
                host_path: dir.to_string(),
                container_path: WORK_DIR.to_string(),
                read_only: false,
            });
        }

        volumes
    }

    fn container_config(&self, name: String, image: &str, meta: &SessionMeta, command: String) -> ContainerConfig {
        let git_mode = meta.mount_dir.is_none();
        let mut environment = self.host_env(meta.agent, git_mode);
        environment.extend(meta.env.iter().cloned());
        environment.push(("ASB_BRANCH".to_string(), meta.branch.clone()));
        environment.push(("ASB_REPO".to_string(), meta.repo.clone()));

        ContainerConfig {
            name,
            image: image.to_string(),
            working_dir: WORK_DIR.to_string(),
            labels: meta.labels(),
            volumes: self.volumes(meta.agent, meta.mount_dir.as_deref()),
            environment,
            cpu_limit: self.settings.cpu_limit.clone(),
            memory_limit: self.settings.memory_limit.clone(),
            tty: meta.interactive,
            command: vec!["sh".to_string(), "-c".to_string(), command],
        }
    }

    async fn run(&self, config: ContainerConfig, progress: &Progress) -> Result<Session> {
        progress.report("Starting container");
        let id = self.runtime.run_container(&config).await?;
        tracing::info!("Started container {} ({})", config.name, truncate_id(&id, 12));
        self.require(truncate_id(&id, 12)).await
    }

    /// Run a throwaway shell container from a session's committed state,
    /// exec into it, then clean it up.
    async fn disposable_shell(&self, session: &Session) -> Result<()> {
        let image = resume_image(&session.id);
        self.runtime.commit(&session.id, &image).await?;

        let mut meta = SessionMeta::from_session(session);
        meta.kind = "shell";
        meta.interactive = true;
        meta.resumed_from = Some(session.id.clone());
        let name = generate_name(&session.branch, &uuid::Uuid::new_v4().simple().to_string());
        let config = self.container_config(name, &image, &meta, IDLE_COMMAND.to_string());
        let id = self.runtime.run_container(&config).await?;

        let argv = self.runtime.exec_command(&id, SHELL_COMMAND);
        let result = self.runtime.run_foreground(&argv).await;
        if let Err(e) = self.runtime.remove(&id, true).await {
            tracing::warn!("Failed to remove shell container {}: {}", id, e);
        }
        result?;
        Ok(())
    }
}

/// Label-level view of a session, before the runtime assigns an id.
struct SessionMeta {
    name: String,
    branch: String,
    agent: Agent,
    model: String,
    repo: String,
    prompt: String,
    interactive: bool,
    mount_dir: Option<String>,
    resumed_from: Option<String>,
    kind: &'static str,
    created: DateTime<Utc>,
    env: Vec<(String, String)>,
}

impl SessionMeta {
    fn from_session(session: &Session) -> Self {
        Self {
            name: session.name.clone(),
            branch: session.branch.clone(),
            agent: session.agent,
            model: session.model.clone(),
            repo: session.repo.clone(),
            prompt: session.prompt.clone(),
            interactive: session.interactive,
            mount_dir: session.mount_dir.clone(),
            resumed_from: session.resumed_from.clone(),
            kind: "agent",
            created: Utc::now(),
            env: Vec::new(),
        }
    }

    fn labels(&self) -> Vec<(String, String)> {
        let mut out = vec![
            (labels::SESSION.to_string(), "1".to_string()),
            (labels::NAME.to_string(), self.name.clone()),
            (labels::BRANCH.to_string(), self.branch.clone()),
            (labels::AGENT.to_string(), self.agent.as_str().to_string()),
            (labels::MODEL.to_string(), self.model.clone()),
            (labels::REPO.to_string(), self.repo.clone()),
            (labels::PROMPT.to_string(), self.prompt.clone()),
            (labels::CREATED.to_string(), self.created.to_rfc3339()),
            (labels::INTERACTIVE.to_string(), self.interactive.to_string()),
            (labels::KIND.to_string(), self.kind.to_string()),
        ];
        if let Some(dir) = &self.mount_dir {
            out.push((labels::MOUNT_DIR.to_string(), dir.clone()));
        }
        if let Some(from) = &self.resumed_from {
            out.push((labels::RESUMED_FROM.to_string(), from.clone()));
        }
        out
    }
}

pub fn status_from_state(state: &str, exit_code: i32) -> SessionStatus {
    match state {
        "running" | "restarting" => SessionStatus::Running,
        "exited" | "dead" if STOP_EXIT_CODES.contains(&exit_code) => SessionStatus::Stopped,
        "exited" | "dead" => SessionStatus::Exited { exit_code },
        "created" | "paused" => SessionStatus::Stopped,
        _ => SessionStatus::Unknown,
    }
}

/// `None` for containers we did not create.
pub fn session_from_info(info: &ContainerInfo) -> Option<Session> {
    let labels: &HashMap<String, String> = &info.labels;
    if labels.get(labels::SESSION).map(String::as_str) != Some("1") {
        return None;
    }
    let label = |key: &str| labels.get(key).cloned().unwrap_or_default();

    let id = truncate_id(&info.id, 12).to_string();
    let mut session = Session::new(id, label(labels::NAME), ProviderKind::Local);
    session.branch = label(labels::BRANCH);
    session.agent = labels
        .get(labels::AGENT)
        .and_then(|a| a.parse().ok())
        .unwrap_or_default();
    session.model = label(labels::MODEL);
    session.repo = labels
        .get(labels::REPO)
        .cloned()
        .unwrap_or_else(|| LOCAL_REPO.to_string());
    session.prompt = label(labels::PROMPT);
    session.mount_dir = labels.get(labels::MOUNT_DIR).cloned();
    session.resumed_from = labels.get(labels::RESUMED_FROM).cloned();
    session.interactive = labels.get(labels::INTERACTIVE).map(String::as_str) == Some("true");
    session.status = status_from_state(&info.state, info.exit_code);
    session.created = labels
        .get(labels::CREATED)
        .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
        .map(|c| c.with_timezone(&Utc))
        .or(info.created)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    if session.name.is_empty() {
        session.name = info.name.clone();
    }

    Some(session)
}

fn ignore_missing(result: std::result::Result<(), DockerError>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => Ok(other?),
    }
}

#[async_trait]
impl<R: ContainerRuntimeInterface> SandboxProvider for LocalProvider<R> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn ensure_ready(&self, progress: &Progress) -> Result<()> {
        progress.report("Checking Docker");
        if !self.runtime.is_docker_available().await {
            return Err(ProviderError::NeedsSetup(DockerError::NotInstalled.to_string()));
        }
        if !self.runtime.is_daemon_running().await {
            return Err(ProviderError::NeedsSetup(
                DockerError::DaemonNotRunning.to_string(),
            ));
        }
        Ok(())
    }

    async fn create(&self, spec: CreateSpec) -> Result<Session> {
        if let Some(dir) = &spec.mount_dir {
            if !Path::new(dir).is_dir() {
                return Err(ProviderError::Config(format!(
                    "Mount directory does not exist: {}",
                    dir
                )));
            }
        }

        spec.progress.report("Checking sandbox image");
        self.runtime.ensure_image(&self.settings.image).await?;

        let meta = SessionMeta {
            name: spec.branch.clone(),
            branch: spec.branch.clone(),
            agent: spec.agent,
            model: spec.model.clone(),
            repo: spec.repo.clone(),
            prompt: spec.prompt.clone(),
            interactive: spec.interactive(),
            mount_dir: spec.mount_dir.clone(),
            resumed_from: None,
            kind: "agent",
            created: Utc::now(),
            env: spec.env.clone(),
        };

        let argv = agents::build_command(spec.agent, &spec.invocation());
        let clone_repo = spec.mount_dir.is_none().then_some(spec.repo.as_str());
        let script = bootstrap_script(clone_repo, &spec.branch, &argv);
        let name = generate_name(&spec.branch, &uuid::Uuid::new_v4().simple().to_string());

        let config = self.container_config(name, &self.settings.image, &meta, script);
        self.run(config, &spec.progress).await
    }

    async fn resume(&self, id: &str, opts: ResumeOptions) -> Result<Session> {
        let old = self.require(id).await?;

        opts.progress.report("Saving session state");
        let image = resume_image(&old.id);
        self.runtime.commit(&old.id, &image).await?;

        let mut meta = SessionMeta::from_session(&old);
        meta.resumed_from = Some(old.id.clone());

        let command = match opts.invocation(&old) {
            Some(inv) => {
                meta.interactive = opts.mode == ResumeMode::Interactive;
                meta.model = inv.model.clone();
                if let Some(prompt) = &inv.prompt {
                    meta.prompt = prompt.clone();
                }
                let argv = agents::build_command(old.agent, &inv);
                format!("cd {} && exec {}", WORK_DIR, agents::shell_join(&argv))
            }
            None => {
                meta.kind = "shell";
                meta.interactive = true;
                IDLE_COMMAND.to_string()
            }
        };

        let name = generate_name(&old.branch, &uuid::Uuid::new_v4().simple().to_string());
        let config = self.container_config(name, &image, &meta, command);
        self.run(config, &opts.progress).await
    }

    async fn attach(&self, id: &str) -> Result<()> {
        let session = self.require(id).await?;
        if !session.interactive {
            return self.shell(id).await;
        }

        if !session.status.is_running() {
            self.runtime.start_container(&session.id).await?;
        }

        let argv = self.runtime.attach_command(&session.id);
        let status = self.runtime.run_foreground(&argv).await?;
        tracing::debug!("attach to {} ended with {}", session.id, status);
        Ok(())
    }

    async fn shell(&self, id: &str) -> Result<()> {
        let session = self.require(id).await?;
        if !session.status.is_running() {
            return self.disposable_shell(&session).await;
        }

        let argv = self.runtime.exec_command(&session.id, SHELL_COMMAND);
        let status = self.runtime.run_foreground(&argv).await?;
        tracing::debug!("shell in {} ended with {}", session.id, status);
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        ignore_missing(self.runtime.stop_container(id).await)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        ignore_missing(self.runtime.remove(id, true).await)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let infos = self.runtime.inspect(&[id.to_string()]).await?;
        Ok(infos.iter().find_map(session_from_info))
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let ids = self.runtime.list_ids(SESSION_LABEL).await?;
        let infos = self.runtime.inspect(&ids).await?;
        let mut sessions: Vec<Session> = infos.iter().filter_map(session_from_info).collect();
        sessions.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(sessions)
    }

    async fn stream_logs(&self, id: &str) -> Result<Option<LogStream>> {
        let session = self.require(id).await?;
        if !session.has_logs() {
            return Ok(None);
        }
        let stream = self
            .runtime
            .logs(&session.id, session.status.is_running())
            .await?;
        Ok(Some(stream))
    }

    async fn create_shell(&self, spec: ShellSpec) -> Result<Session> {
        spec.progress.report("Checking sandbox image");
        self.runtime.ensure_image(&self.settings.image).await?;

        let branch = spec.branch.clone().unwrap_or_else(|| "shell".to_string());
        let meta = SessionMeta {
            name: format!("shell-{}", branch),
            branch: branch.clone(),
            agent: spec.agent,
            model: String::new(),
            repo: spec.repo.clone(),
            prompt: String::new(),
            interactive: true,
            mount_dir: spec.mount_dir.clone(),
            resumed_from: None,
            kind: "shell",
            created: Utc::now(),
            env: Vec::new(),
        };

        let clone_repo = match (&spec.mount_dir, spec.repo.as_str()) {
            (None, repo) if repo != LOCAL_REPO => Some(repo),
            _ => None,
        };
        let idle = vec!["sleep".to_string(), "infinity".to_string()];
        let script = bootstrap_script(clone_repo, &branch, &idle);
        let name = generate_name(&meta.name, &uuid::Uuid::new_v4().simple().to_string());

        let config = self.container_config(name, &self.settings.image, &meta, script);
        self.run(config, &spec.progress).await
    }

    async fn stats(&self, id: &str) -> Result<Option<SessionStats>> {
        match self.runtime.stats(id).await {
            Ok(stats) => Ok(Some(stats.into())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::ContainerStats;
    use crate::session::RunMode;
    use futures_util::stream::{self, BoxStream, StreamExt};
    use std::process::ExitStatus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRuntime {
        containers: Mutex<Vec<ContainerInfo>>,
        runs: Mutex<Vec<ContainerConfig>>,
        foreground: Mutex<Vec<Vec<String>>>,
        commits: Mutex<Vec<(String, String)>>,
        removed: Mutex<Vec<String>>,
        daemon_down: bool,
    }

    impl FakeRuntime {
        fn with(infos: Vec<ContainerInfo>) -> Self {
            Self {
                containers: Mutex::new(infos),
                ..Default::default()
            }
        }

        fn find(&self, name: &str) -> Option<ContainerInfo> {
            self.containers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id.starts_with(name) || c.name == name)
                .cloned()
        }

        fn missing(name: &str) -> DockerError {
            DockerError::ContainerNotFound(name.to_string())
        }
    }

    #[cfg(unix)]
    fn success() -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(0)
    }

    #[async_trait]
    impl ContainerRuntimeInterface for FakeRuntime {
        async fn is_docker_available(&self) -> bool {
            true
        }

        async fn is_daemon_running(&self) -> bool {
            !self.daemon_down
        }

        async fn image_exists_locally(&self, _image: &str) -> bool {
            true
        }

        async fn pull_image(&self, _image: &str) -> crate::containers::error::Result<()> {
            Ok(())
        }

        async fn run_container(&self, config: &ContainerConfig) -> crate::containers::error::Result<String> {
            let mut containers = self.containers.lock().unwrap();
            let id = format!("{:012x}{}", containers.len() + 1, "f".repeat(52));
            containers.push(ContainerInfo {
                id: id.clone(),
                name: config.name.clone(),
                image: config.image.clone(),
                labels: config.labels.iter().cloned().collect(),
                state: "running".to_string(),
                exit_code: 0,
                tty: config.tty,
                created: None,
            });
            self.runs.lock().unwrap().push(config.clone());
            Ok(id)
        }

        async fn list_ids(&self, _label: &str) -> crate::containers::error::Result<Vec<String>> {
            Ok(self
                .containers
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.id.clone())
                .collect())
        }

        async fn inspect(&self, names: &[String]) -> crate::containers::error::Result<Vec<ContainerInfo>> {
            Ok(names.iter().filter_map(|n| self.find(n)).collect())
        }

        async fn start_container(&self, name: &str) -> crate::containers::error::Result<()> {
            self.find(name).map(|_| ()).ok_or_else(|| Self::missing(name))
        }

        async fn stop_container(&self, name: &str) -> crate::containers::error::Result<()> {
            self.find(name).map(|_| ()).ok_or_else(|| Self::missing(name))
        }

        async fn remove(&self, name: &str, _force: bool) -> crate::containers::error::Result<()> {
            self.find(name).ok_or_else(|| Self::missing(name))?;
            self.removed.lock().unwrap().push(name.to_string());
            self.containers
                .lock()
                .unwrap()
                .retain(|c| !(c.id.starts_with(name) || c.name == name));
            Ok(())
        }

        async fn commit(&self, name: &str, image: &str) -> crate::containers::error::Result<()> {
            self.commits
                .lock()
                .unwrap()
                .push((name.to_string(), image.to_string()));
            Ok(())
        }

        async fn stats(&self, name: &str) -> crate::containers::error::Result<ContainerStats> {
            self.find(name).ok_or_else(|| Self::missing(name))?;
            Ok(ContainerStats {
                cpu_percent: 3.0,
                memory_usage: "10MiB / 1GiB".to_string(),
                memory_percent: 1.0,
            })
        }

        async fn logs(&self, _name: &str, _follow: bool) -> crate::containers::error::Result<BoxStream<'static, String>> {
            Ok(stream::iter(vec!["one".to_string(), "two".to_string()]).boxed())
        }

        fn attach_command(&self, name: &str) -> Vec<String> {
            vec!["attach".to_string(), name.to_string()]
        }

        fn exec_command(&self, name: &str, cmd: &[&str]) -> Vec<String> {
            let mut argv = vec!["exec".to_string(), name.to_string()];
            argv.extend(cmd.iter().map(|s| s.to_string()));
            argv
        }

        async fn run_foreground(&self, argv: &[String]) -> crate::containers::error::Result<ExitStatus> {
            self.foreground.lock().unwrap().push(argv.to_vec());
            Ok(success())
        }
    }

    fn info(id: &str, state: &str, exit_code: i32, interactive: bool) -> ContainerInfo {
        let labels = [
            (labels::SESSION, "1"),
            (labels::NAME, "fix-flaky-test"),
            (labels::BRANCH, "fix-flaky-test"),
            (labels::AGENT, "claude"),
            (labels::MODEL, "sonnet"),
            (labels::REPO, "acme/widgets"),
            (labels::PROMPT, "fix the flaky test"),
            (labels::CREATED, "2026-03-01T10:00:00+00:00"),
            (labels::INTERACTIVE, if interactive { "true" } else { "false" }),
        ];
        ContainerInfo {
            id: id.to_string(),
            name: format!("asb-{}", id),
            image: "img".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            state: state.to_string(),
            exit_code,
            tty: interactive,
            created: None,
        }
    }

    fn provider(runtime: FakeRuntime) -> LocalProvider<FakeRuntime> {
        let mut p = LocalProvider::with_runtime(runtime, LocalConfig::default());
        p.home = None;
        p
    }

    fn spec(mode: RunMode) -> CreateSpec {
        CreateSpec {
            branch: "fix-flaky-test".to_string(),
            prompt: "fix the flaky test".to_string(),
            agent: Agent::Claude,
            model: "sonnet".to_string(),
            mode,
            repo: "acme/widgets".to_string(),
            env: vec![("DATABASE_URL".to_string(), "postgres://fork".to_string())],
            mount_dir: None,
            extra_args: Vec::new(),
            progress: Progress::none(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_from_state("running", 0), SessionStatus::Running);
        assert_eq!(status_from_state("restarting", 0), SessionStatus::Running);
        assert_eq!(status_from_state("exited", 0), SessionStatus::Exited { exit_code: 0 });
        assert_eq!(status_from_state("exited", 1), SessionStatus::Exited { exit_code: 1 });
        assert_eq!(status_from_state("exited", 137), SessionStatus::Stopped);
        assert_eq!(status_from_state("dead", 143), SessionStatus::Stopped);
        assert_eq!(status_from_state("created", 0), SessionStatus::Stopped);
        assert_eq!(status_from_state("paused", 0), SessionStatus::Stopped);
        assert_eq!(status_from_state("removing", 0), SessionStatus::Unknown);
    }

    #[test]
    fn test_session_from_info_reads_labels() {
        let session = session_from_info(&info("0123456789abcdef", "exited", 1, false)).unwrap();
        assert_eq!(session.id, "0123456789ab");
        assert_eq!(session.branch, "fix-flaky-test");
        assert_eq!(session.repo, "acme/widgets");
        assert_eq!(session.status, SessionStatus::Exited { exit_code: 1 });
        assert!(!session.interactive);
        assert_eq!(session.created.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_session_from_info_ignores_foreign_containers() {
        let mut foreign = info("abc", "running", 0, false);
        foreign.labels.clear();
        assert!(session_from_info(&foreign).is_none());
    }

    #[tokio::test]
    async fn test_stop_and_remove_missing_are_ok() {
        let p = provider(FakeRuntime::default());
        assert!(p.stop("nope").await.is_ok());
        assert!(p.remove("nope").await.is_ok());
    }

    #[tokio::test]
    async fn test_resume_missing_is_not_found() {
        let p = provider(FakeRuntime::default());
        let err = p.resume("nope", ResumeOptions::default()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ensure_ready_daemon_down_needs_setup() {
        let p = provider(FakeRuntime {
            daemon_down: true,
            ..Default::default()
        });
        let err = p.ensure_ready(&Progress::none()).await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::SetupNeeded);
    }

    #[tokio::test]
    async fn test_create_async_session() {
        let p = provider(FakeRuntime::default());
        let session = p.create(spec(RunMode::Async)).await.unwrap();

        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.branch, "fix-flaky-test");
        assert!(!session.interactive);

        let runs = p.runtime().runs.lock().unwrap();
        let run = &runs[0];
        assert!(!run.tty);
        assert!(run.name.starts_with("asb-fix-flaky-test-"));
        assert!(run
            .environment
            .contains(&("DATABASE_URL".to_string(), "postgres://fork".to_string())));
        assert!(run
            .environment
            .contains(&("ASB_REPO".to_string(), "acme/widgets".to_string())));
        let script = &run.command[2];
        assert!(script.contains("git clone"));
        assert!(script.contains("exec claude -p"));
    }

    #[tokio::test]
    async fn test_create_interactive_allocates_tty() {
        let p = provider(FakeRuntime::default());
        let session = p.create(spec(RunMode::Interactive)).await.unwrap();
        assert!(session.interactive);
        assert!(p.runtime().runs.lock().unwrap()[0].tty);
    }

    #[tokio::test]
    async fn test_create_missing_mount_dir_is_config_error() {
        let p = provider(FakeRuntime::default());
        let mut s = spec(RunMode::Async);
        s.mount_dir = Some("/definitely/not/here".to_string());
        let err = p.create(s).await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_resume_commits_and_links_back() {
        let p = provider(FakeRuntime::with(vec![info("0123456789abcdef", "exited", 0, false)]));
        let opts = ResumeOptions {
            mode: ResumeMode::Detached,
            prompt: Some("also update docs".to_string()),
            ..Default::default()
        };
        let resumed = p.resume("0123456789ab", opts).await.unwrap();

        assert_eq!(resumed.resumed_from.as_deref(), Some("0123456789ab"));
        assert_eq!(resumed.prompt, "also update docs");
        assert_eq!(
            p.runtime().commits.lock().unwrap()[0],
            ("0123456789ab".to_string(), "asb-resume:0123456789ab".to_string())
        );
        let runs = p.runtime().runs.lock().unwrap();
        assert_eq!(runs[0].image, "asb-resume:0123456789ab");
        assert!(runs[0].command[2].contains("--continue"));
    }

    #[tokio::test]
    async fn test_stream_logs_none_for_interactive() {
        let p = provider(FakeRuntime::with(vec![info("aaaaaaaaaaaa", "running", 0, true)]));
        assert!(p.stream_logs("aaaaaaaaaaaa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_logs_lines_for_detached() {
        let p = provider(FakeRuntime::with(vec![info("bbbbbbbbbbbb", "exited", 0, false)]));
        let lines: Vec<String> = p
            .stream_logs("bbbbbbbbbbbb")
            .await
            .unwrap()
            .unwrap()
            .collect()
            .await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_attach_non_interactive_opens_shell() {
        let p = provider(FakeRuntime::with(vec![info("cccccccccccc", "running", 0, false)]));
        p.attach("cccccccccccc").await.unwrap();
        let fg = p.runtime().foreground.lock().unwrap();
        assert_eq!(fg[0][0], "exec");
    }

    #[tokio::test]
    async fn test_shell_on_stopped_session_is_disposable() {
        let p = provider(FakeRuntime::with(vec![info("dddddddddddd", "exited", 0, false)]));
        p.shell("dddddddddddd").await.unwrap();

        assert_eq!(p.runtime().commits.lock().unwrap().len(), 1);
        assert_eq!(p.runtime().removed.lock().unwrap().len(), 1);
        // Only the original session is left.
        assert_eq!(p.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_missing_is_none() {
        let p = provider(FakeRuntime::default());
        assert!(p.stats("nope").await.unwrap().is_none());
    }
}
