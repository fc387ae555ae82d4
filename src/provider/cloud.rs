//! Cloud provider: sessions are sandboxes on the hosted sandbox API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use super::{
    bootstrap_script, CreateSpec, LogStream, Progress, ProviderError, ResumeMode, ResumeOptions,
    Result, SandboxProvider, SessionStats, ShellSpec,
};
use crate::agents::{self, Agent};
use crate::collab::CloudAuth;
use crate::containers::{forward_lines, receiver_stream};
use crate::session::config::CloudConfig;
use crate::session::{ProviderKind, Session, SessionStatus, LOCAL_REPO};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Label selecting sandboxes this tool created.
const SESSION_LABEL: &str = "asb";

/// tmux session the agent runs in, so ssh can re-attach to it.
const AGENT_TMUX_SESSION: &str = "agent";

/// Session metadata stored as sandbox labels.
#[derive(Debug, Clone, Default)]
struct SandboxLabels {
    name: String,
    branch: String,
    agent: Agent,
    model: String,
    repo: String,
    prompt: String,
    interactive: bool,
    kind: String,
    resumed_from: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SandboxDto {
    id: String,
    status: String,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    labels: HashMap<String, String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    volume_slug: Option<String>,
    #[serde(default)]
    snapshot_slug: Option<String>,
    /// The env the sandbox was created with, echoed back by the API.
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SandboxList {
    sandboxes: Vec<SandboxDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSandbox<'a> {
    region: &'a str,
    labels: HashMap<&'a str, String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    env: HashMap<String, String>,
    command: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    snapshot_slug: String,
}

#[derive(Debug, Deserialize)]
struct SshEndpoint {
    host: String,
    port: u16,
    user: String,
}

pub fn status_from_api(status: &str, exit_code: Option<i32>) -> SessionStatus {
    match status {
        "running" | "starting" | "provisioning" => SessionStatus::Running,
        "succeeded" => SessionStatus::Exited {
            exit_code: exit_code.unwrap_or(0),
        },
        "exited" | "failed" => SessionStatus::Exited {
            exit_code: exit_code.unwrap_or(1),
        },
        "stopping" | "stopped" => SessionStatus::Stopped,
        _ => SessionStatus::Unknown,
    }
}

impl SandboxDto {
    fn into_session(self) -> Session {
        let mut labels = self.labels;
        let mut take = |key: &str| labels.remove(key).unwrap_or_default();

        let mut session = Session::new(self.id, take("name"), ProviderKind::Cloud);
        session.branch = take("branch");
        session.agent = take("agent").parse().unwrap_or_default();
        session.model = take("model");
        session.repo = match take("repo") {
            repo if repo.is_empty() => LOCAL_REPO.to_string(),
            repo => repo,
        };
        session.prompt = take("prompt");
        session.interactive = take("interactive") == "true";
        session.resumed_from = Some(take("resumedFrom")).filter(|r| !r.is_empty());
        session.status = status_from_api(&self.status, self.exit_code);
        session.created = self.created_at;
        session.region = self.region;
        session.volume_slug = self.volume_slug;
        session.snapshot_slug = self.snapshot_slug;
        session
    }
}

/// Keep the agent in a tmux session so ssh attach/detach works, and keep the
/// sandbox alive for as long as that session exists.
fn tmux_wrapped(argv: &[String]) -> Vec<String> {
    let inner = agents::shell_join(argv);
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(
            "tmux new-session -d -s {s} {cmd} && while tmux has-session -t {s} 2>/dev/null; do sleep 5; done",
            s = AGENT_TMUX_SESSION,
            cmd = agents::shell_join(&[inner]),
        ),
    ]
}

/// Sandbox env: `carried` (fork vars, or whatever an earlier sandbox ran
/// with), then the agent's credential vars from this process and the
/// session's branch and repo on top.
fn session_env(
    agent: Agent,
    branch: &str,
    repo: &str,
    carried: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = carried.into_iter().collect();
    for name in agent.def().credential_env {
        if let Ok(value) = std::env::var(name) {
            env.insert(name.to_string(), value);
        }
    }
    env.insert("ASB_BRANCH".to_string(), branch.to_string());
    env.insert("ASB_REPO".to_string(), repo.to_string());
    env
}

pub struct CloudProvider {
    client: Client,
    settings: CloudConfig,
    auth: Arc<dyn CloudAuth>,
}

impl CloudProvider {
    pub fn new(settings: CloudConfig, auth: Arc<dyn CloudAuth>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("agent-sandbox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            settings,
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.auth.token().ok_or_else(|| {
            ProviderError::NeedsSetup("No cloud sandbox access token; log in first".to_string())
        })?;
        Ok(self.client.request(method, self.url(path)).bearer_auth(token))
    }

    async fn send(&self, builder: RequestBuilder, id: &str) -> Result<Response> {
        let response = builder.send().await?;
        check_status(response, id).await
    }

    async fn fetch(&self, id: &str) -> Result<SandboxDto> {
        let req = self.request(Method::GET, &format!("/sandboxes/{}", id))?;
        Ok(self.send(req, id).await?.json().await?)
    }

    async fn require(&self, id: &str) -> Result<Session> {
        self.get(id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn post_sandbox(&self, body: &CreateSandbox<'_>, progress: &Progress) -> Result<Session> {
        progress.report("Provisioning cloud sandbox");
        let req = self.request(Method::POST, "/sandboxes")?.json(body);
        let dto: SandboxDto = self.send(req, "").await?.json().await?;
        tracing::info!("Created cloud sandbox {}", dto.id);
        Ok(dto.into_session())
    }

    async fn ssh(&self, id: &str, remote: &[&str]) -> Result<()> {
        let req = self.request(Method::POST, &format!("/sandboxes/{}/ssh", id))?;
        let endpoint: SshEndpoint = self.send(req, id).await?.json().await?;

        let status = Command::new("ssh")
            .arg("-t")
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-p", &endpoint.port.to_string()])
            .arg(format!("{}@{}", endpoint.user, endpoint.host))
            .args(remote)
            .status()
            .await?;
        tracing::debug!("ssh to {} ended with {}", id, status);
        Ok(())
    }

    fn labels(&self, meta: &SandboxLabels) -> HashMap<&'static str, String> {
        let mut labels = HashMap::from([
            (SESSION_LABEL, "1".to_string()),
            ("name", meta.name.clone()),
            ("branch", meta.branch.clone()),
            ("agent", meta.agent.as_str().to_string()),
            ("model", meta.model.clone()),
            ("repo", meta.repo.clone()),
            ("prompt", meta.prompt.clone()),
            ("interactive", meta.interactive.to_string()),
            ("kind", meta.kind.clone()),
        ]);
        if let Some(from) = &meta.resumed_from {
            labels.insert("resumedFrom", from.clone());
        }
        labels
    }
}

async fn check_status(response: Response, id: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::NOT_FOUND => Err(ProviderError::NotFound(id.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProviderError::NeedsSetup(
            "Cloud sandbox access token was rejected; log in again".to_string(),
        )),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(ProviderError::Http {
                status: status.as_u16(),
                message: message.trim().to_string(),
            })
        }
    }
}

fn ignore_missing(result: Result<Response>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl SandboxProvider for CloudProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn ensure_ready(&self, progress: &Progress) -> Result<()> {
        progress.report("Checking cloud credentials");
        if self.auth.token().is_none() {
            return Err(ProviderError::NeedsSetup(
                "No cloud sandbox access token; log in first".to_string(),
            ));
        }
        Ok(())
    }

    async fn create(&self, spec: CreateSpec) -> Result<Session> {
        if spec.mount_dir.is_some() {
            return Err(ProviderError::Unsupported("Mount mode", "cloud"));
        }

        let meta = SandboxLabels {
            name: spec.branch.clone(),
            branch: spec.branch.clone(),
            agent: spec.agent,
            model: spec.model.clone(),
            repo: spec.repo.clone(),
            prompt: spec.prompt.clone(),
            interactive: spec.interactive(),
            kind: "agent".to_string(),
            resumed_from: None,
        };

        let mut argv = agents::build_command(spec.agent, &spec.invocation());
        if meta.interactive {
            argv = tmux_wrapped(&argv);
        }
        let script = bootstrap_script(Some(&spec.repo), &spec.branch, &argv);

        let env = session_env(spec.agent, &spec.branch, &spec.repo, spec.env.iter().cloned());

        let body = CreateSandbox {
            region: &self.settings.region,
            labels: self.labels(&meta),
            env,
            command: vec!["sh".to_string(), "-c".to_string(), script],
            snapshot_slug: None,
        };
        self.post_sandbox(&body, &spec.progress).await
    }

    async fn resume(&self, id: &str, opts: ResumeOptions) -> Result<Session> {
        let mut dto = self.fetch(id).await?;
        let carried = std::mem::take(&mut dto.env);
        let old = dto.into_session();

        opts.progress.report("Snapshotting sandbox volume");
        let req = self.request(Method::POST, &format!("/sandboxes/{}/snapshot", id))?;
        let snapshot: Snapshot = self.send(req, id).await?.json().await?;

        let mut meta = SandboxLabels {
            name: old.name.clone(),
            branch: old.branch.clone(),
            agent: old.agent,
            model: old.model.clone(),
            repo: old.repo.clone(),
            prompt: old.prompt.clone(),
            interactive: old.interactive,
            kind: "agent".to_string(),
            resumed_from: Some(old.id.clone()),
        };

        let argv = match opts.invocation(&old) {
            Some(inv) => {
                meta.interactive = opts.mode == ResumeMode::Interactive;
                meta.model = inv.model.clone();
                if let Some(prompt) = &inv.prompt {
                    meta.prompt = prompt.clone();
                }
                let argv = agents::build_command(old.agent, &inv);
                if meta.interactive {
                    tmux_wrapped(&argv)
                } else {
                    argv
                }
            }
            None => {
                meta.kind = "shell".to_string();
                meta.interactive = true;
                vec!["sleep".to_string(), "infinity".to_string()]
            }
        };

        let body = CreateSandbox {
            region: old.region.as_deref().unwrap_or(&self.settings.region),
            labels: self.labels(&meta),
            env: session_env(old.agent, &old.branch, &old.repo, carried),
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("cd /work && exec {}", agents::shell_join(&argv)),
            ],
            snapshot_slug: Some(snapshot.snapshot_slug),
        };
        self.post_sandbox(&body, &opts.progress).await
    }

    async fn attach(&self, id: &str) -> Result<()> {
        let session = self.require(id).await?;
        if !session.interactive {
            return self.shell(id).await;
        }
        self.ssh(id, &["tmux", "attach", "-t", AGENT_TMUX_SESSION]).await
    }

    async fn shell(&self, id: &str) -> Result<()> {
        let session = self.require(id).await?;
        if !session.status.is_running() {
            return Err(ProviderError::Config(format!(
                "Sandbox {} is not running; resume it in shell mode",
                id
            )));
        }
        self.ssh(id, &[]).await
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let req = self.request(Method::POST, &format!("/sandboxes/{}/stop", id))?;
        ignore_missing(self.send(req, id).await)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let req = self.request(Method::DELETE, &format!("/sandboxes/{}", id))?;
        ignore_missing(self.send(req, id).await)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        match self.fetch(id).await {
            Ok(dto) => Ok(Some(dto.into_session())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let req = self
            .request(Method::GET, "/sandboxes")?
            .query(&[("label", SESSION_LABEL)]);
        let list: SandboxList = self.send(req, "").await?.json().await?;
        let mut sessions: Vec<Session> = list
            .sandboxes
            .into_iter()
            .map(SandboxDto::into_session)
            .collect();
        sessions.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(sessions)
    }

    async fn stream_logs(&self, id: &str) -> Result<Option<LogStream>> {
        let session = self.require(id).await?;
        if !session.has_logs() {
            return Ok(None);
        }

        let follow = session.status.is_running();
        let req = self
            .request(Method::GET, &format!("/sandboxes/{}/logs", id))?
            .query(&[("follow", follow)])
            // A followed stream stays open for as long as the sandbox runs.
            .timeout(Duration::from_secs(24 * 60 * 60));
        let response = self.send(req, id).await?;

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let lines = FramedRead::new(StreamReader::new(body), LinesCodec::new());
        let (tx, rx) = mpsc::channel::<String>(256);
        tokio::spawn(forward_lines(lines, tx));

        Ok(Some(receiver_stream(rx)))
    }

    async fn create_shell(&self, spec: ShellSpec) -> Result<Session> {
        if spec.mount_dir.is_some() {
            return Err(ProviderError::Unsupported("Mount mode", "cloud"));
        }

        let branch = spec.branch.clone().unwrap_or_else(|| "shell".to_string());
        let meta = SandboxLabels {
            name: format!("shell-{}", branch),
            branch: branch.clone(),
            agent: spec.agent,
            repo: spec.repo.clone(),
            interactive: true,
            kind: "shell".to_string(),
            ..Default::default()
        };
        let idle = vec!["sleep".to_string(), "infinity".to_string()];
        let clone_repo = (spec.repo != LOCAL_REPO).then_some(spec.repo.as_str());
        let script = bootstrap_script(clone_repo, &branch, &idle);

        let body = CreateSandbox {
            region: &self.settings.region,
            labels: self.labels(&meta),
            env: HashMap::new(),
            command: vec!["sh".to_string(), "-c".to_string(), script],
            snapshot_slug: None,
        };
        self.post_sandbox(&body, &spec.progress).await
    }

    async fn stats(&self, _id: &str) -> Result<Option<SessionStats>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    struct NoToken;

    impl CloudAuth for NoToken {
        fn token(&self) -> Option<String> {
            None
        }

        fn login(&self) -> bool {
            false
        }
    }

    fn provider() -> CloudProvider {
        CloudProvider::new(CloudConfig::default(), Arc::new(NoToken)).unwrap()
    }

    #[test]
    fn test_status_from_api() {
        assert_eq!(status_from_api("running", None), SessionStatus::Running);
        assert_eq!(status_from_api("provisioning", None), SessionStatus::Running);
        assert_eq!(
            status_from_api("succeeded", None),
            SessionStatus::Exited { exit_code: 0 }
        );
        assert_eq!(
            status_from_api("failed", Some(2)),
            SessionStatus::Exited { exit_code: 2 }
        );
        assert_eq!(
            status_from_api("exited", None),
            SessionStatus::Exited { exit_code: 1 }
        );
        assert_eq!(status_from_api("stopped", None), SessionStatus::Stopped);
        assert_eq!(status_from_api("migrating", None), SessionStatus::Unknown);
    }

    #[test]
    fn test_sandbox_dto_into_session() {
        let raw = r#"{
            "id": "sbx_01",
            "status": "running",
            "labels": {
                "name": "fix-flaky-test",
                "branch": "fix-flaky-test",
                "agent": "codex",
                "model": "gpt-5-codex",
                "repo": "acme/widgets",
                "prompt": "fix the flaky test",
                "interactive": "false"
            },
            "createdAt": "2026-03-01T10:00:00Z",
            "region": "ord",
            "volumeSlug": "vol-1"
        }"#;
        let dto: SandboxDto = serde_json::from_str(raw).unwrap();
        let session = dto.into_session();
        assert_eq!(session.provider, ProviderKind::Cloud);
        assert_eq!(session.agent, Agent::Codex);
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.region.as_deref(), Some("ord"));
        assert_eq!(session.volume_slug.as_deref(), Some("vol-1"));
        assert!(session.snapshot_slug.is_none());
        assert!(session.mount_dir.is_none());
    }

    #[test]
    fn test_dto_without_repo_is_local_sentinel() {
        let raw = r#"{"id": "x", "status": "stopped", "createdAt": "2026-03-01T10:00:00Z"}"#;
        let dto: SandboxDto = serde_json::from_str(raw).unwrap();
        assert_eq!(dto.into_session().repo, LOCAL_REPO);
    }

    #[test]
    fn test_tmux_wrapped_quotes_agent_command() {
        let argv = vec!["claude".to_string(), "fix it".to_string()];
        let wrapped = tmux_wrapped(&argv);
        assert_eq!(wrapped[0], "sh");
        assert!(wrapped[2].starts_with("tmux new-session -d -s agent "));
        assert!(wrapped[2].contains("has-session -t agent"));
    }

    #[tokio::test]
    async fn test_mount_mode_unsupported() {
        let spec = CreateSpec {
            branch: "b".to_string(),
            prompt: String::new(),
            agent: Agent::Claude,
            model: "sonnet".to_string(),
            mode: crate::session::RunMode::Async,
            repo: LOCAL_REPO.to_string(),
            env: Vec::new(),
            mount_dir: Some("/tmp".to_string()),
            extra_args: Vec::new(),
            progress: Progress::none(),
        };
        let err = provider().create(spec).await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_missing_token_needs_setup() {
        let p = provider();
        let err = p.ensure_ready(&Progress::none()).await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::SetupNeeded);
        let err = p.list().await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::SetupNeeded);
    }

    #[tokio::test]
    async fn test_stats_unsupported() {
        assert!(provider().stats("x").await.unwrap().is_none());
    }

    struct FixedToken;

    impl CloudAuth for FixedToken {
        fn token(&self) -> Option<String> {
            Some("tok_test".to_string())
        }

        fn login(&self) -> bool {
            true
        }
    }

    /// `"METHOD /path"` (query excluded), status, JSON body.
    type Route = (&'static str, u16, &'static str);

    /// Every request the server saw: `"METHOD /path?query"` and its body.
    type Seen = Arc<Mutex<Vec<(String, String)>>>;

    /// A sandbox API on localhost answering from a fixed table, one
    /// connection per request. Unknown routes get a 500.
    async fn api(routes: Vec<Route>) -> (CloudProvider, Seen) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (read, mut write) = socket.into_split();
                let mut reader = BufReader::new(read);

                let mut head = String::new();
                reader.read_line(&mut head).await.unwrap();
                let mut length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    if line.trim().is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut body = vec![0; length];
                reader.read_exact(&mut body).await.unwrap();

                let target: Vec<&str> = head.split_whitespace().take(2).collect();
                let target = target.join(" ");
                let route = target.split('?').next().unwrap_or_default().to_string();
                log.lock()
                    .unwrap()
                    .push((target, String::from_utf8_lossy(&body).to_string()));

                let (status, reply) = routes
                    .iter()
                    .find(|(r, ..)| *r == route)
                    .map(|(_, status, reply)| (*status, *reply))
                    .unwrap_or((500, "no such route"));
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reply.len(),
                    reply
                );
                write.write_all(response.as_bytes()).await.unwrap();
                let _ = write.shutdown().await;
            }
        });

        let settings = CloudConfig {
            api_url: format!("http://{}", addr),
            region: "ord".to_string(),
        };
        let provider = CloudProvider::new(settings, Arc::new(FixedToken)).unwrap();
        (provider, seen)
    }

    #[tokio::test]
    async fn test_stop_and_remove_of_missing_sandbox_succeed() {
        let (p, seen) = api(vec![
            ("POST /sandboxes/gone/stop", 404, "{}"),
            ("DELETE /sandboxes/gone", 404, "{}"),
        ])
        .await;

        p.stop("gone").await.unwrap();
        p.remove("gone").await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_maps_status_codes() {
        let (p, _) = api(vec![
            ("GET /sandboxes/gone", 404, "{}"),
            ("GET /sandboxes/locked", 403, "{}"),
            ("GET /sandboxes/broken", 502, "upstream down"),
        ])
        .await;

        assert!(p.get("gone").await.unwrap().is_none());

        let err = p.get("locked").await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::SetupNeeded);

        let err = p.get("broken").await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::Transient);
        assert!(matches!(
            err,
            ProviderError::Http { status: 502, ref message } if message == "upstream down"
        ));
    }

    #[tokio::test]
    async fn test_rejected_token_on_list_needs_setup() {
        let (p, _) = api(vec![("GET /sandboxes", 401, "{}")]).await;
        let err = p.list().await.unwrap_err();
        assert_eq!(err.kind(), crate::provider::ErrorKind::SetupNeeded);
    }

    #[tokio::test]
    async fn test_list_filters_by_label_and_sorts_newest_first() {
        let (p, seen) = api(vec![(
            "GET /sandboxes",
            200,
            r#"{"sandboxes": [
                {"id": "sbx_old", "status": "succeeded", "createdAt": "2026-03-01T10:00:00Z",
                 "labels": {"name": "old", "branch": "old"}},
                {"id": "sbx_new", "status": "running", "createdAt": "2026-03-02T10:00:00Z",
                 "labels": {"name": "new", "branch": "new"}}
            ]}"#,
        )])
        .await;

        let sessions = p.list().await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["sbx_new", "sbx_old"]);
        assert_eq!(sessions[1].status, SessionStatus::Exited { exit_code: 0 });
        assert_eq!(seen.lock().unwrap()[0].0, "GET /sandboxes?label=asb");
    }

    #[tokio::test]
    #[serial]
    async fn test_resume_restores_env_and_refreshes_credentials() {
        let (p, seen) = api(vec![
            (
                "GET /sandboxes/sbx_1",
                200,
                r#"{"id": "sbx_1", "status": "exited", "exitCode": 0,
                    "createdAt": "2026-03-01T10:00:00Z", "region": "iad",
                    "labels": {"name": "fix-login", "branch": "fix-login", "agent": "claude",
                               "model": "sonnet", "repo": "acme/web", "interactive": "true"},
                    "env": {"DATABASE_URL": "postgres://fork",
                            "CLAUDE_CODE_OAUTH_TOKEN": "expired"}}"#,
            ),
            ("POST /sandboxes/sbx_1/snapshot", 200, r#"{"snapshotSlug": "snap-1"}"#),
            (
                "POST /sandboxes",
                200,
                r#"{"id": "sbx_2", "status": "running", "createdAt": "2026-03-02T10:00:00Z",
                    "labels": {"name": "fix-login", "resumedFrom": "sbx_1"}}"#,
            ),
        ])
        .await;

        std::env::set_var("CLAUDE_CODE_OAUTH_TOKEN", "fresh");
        let session = p.resume("sbx_1", ResumeOptions::default()).await;
        std::env::remove_var("CLAUDE_CODE_OAUTH_TOKEN");
        let session = session.unwrap();
        assert_eq!(session.id, "sbx_2");
        assert_eq!(session.resumed_from.as_deref(), Some("sbx_1"));

        let seen = seen.lock().unwrap().clone();
        let (_, body) = seen
            .iter()
            .find(|(target, _)| target == "POST /sandboxes")
            .expect("new sandbox requested");
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body["env"]["DATABASE_URL"], "postgres://fork");
        assert_eq!(body["env"]["CLAUDE_CODE_OAUTH_TOKEN"], "fresh");
        assert_eq!(body["env"]["ASB_BRANCH"], "fix-login");
        assert_eq!(body["env"]["ASB_REPO"], "acme/web");
        assert_eq!(body["snapshotSlug"], "snap-1");
        assert_eq!(body["region"], "iad");
        assert_eq!(body["labels"]["resumedFrom"], "sbx_1");
    }

    #[test]
    fn test_session_env_layers_credentials_over_carried() {
        let env = session_env(
            Agent::Codex,
            "fix-login",
            "acme/web",
            vec![
                ("DATABASE_URL".to_string(), "postgres://fork".to_string()),
                ("ASB_BRANCH".to_string(), "stale".to_string()),
            ],
        );
        assert_eq!(env["DATABASE_URL"], "postgres://fork");
        assert_eq!(env["ASB_BRANCH"], "fix-login");
        assert_eq!(env["ASB_REPO"], "acme/web");
    }
}
