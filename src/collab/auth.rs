use std::io::{BufRead, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::{AgentAuth, CloudAuth, HostAuth};
use crate::agents::Agent;
use crate::session::get_app_dir;

pub const CLOUD_TOKEN_ENV: &str = "AGENT_SANDBOX_CLOUD_TOKEN";
const CLOUD_TOKEN_FILE: &str = "cloud-token";

fn env_set(name: &str) -> bool {
    std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Agent credentials are valid when one of the agent's env vars is set or one
/// of its credential files exists under the home directory.
pub struct CliAgentAuth {
    home: Option<PathBuf>,
}

impl Default for CliAgentAuth {
    fn default() -> Self {
        Self {
            home: dirs::home_dir(),
        }
    }
}

impl CliAgentAuth {
    pub fn with_home(home: PathBuf) -> Self {
        Self { home: Some(home) }
    }

    fn has_credentials(&self, agent: Agent) -> bool {
        let def = agent.def();
        if def.credential_env.iter().any(|name| env_set(name)) {
            return true;
        }
        match &self.home {
            Some(home) => def.credential_files.iter().any(|f| home.join(f).is_file()),
            None => false,
        }
    }
}

#[async_trait]
impl AgentAuth for CliAgentAuth {
    async fn check_credentials(&self, agent: Agent, model: &str) -> bool {
        let ok = self.has_credentials(agent);
        tracing::debug!("{} credentials for model '{}': {}", agent, model, ok);
        ok
    }

    async fn ensure_auth(&self, agent: Agent) -> bool {
        let Some((program, args)) = agent.def().login_command.split_first() else {
            return false;
        };

        match Command::new(program).args(args).status().await {
            Ok(status) if status.success() => self.has_credentials(agent),
            Ok(status) => {
                tracing::warn!("{} login exited with {}", agent, status);
                false
            }
            Err(e) => {
                tracing::warn!("Failed to run {} login: {}", agent, e);
                false
            }
        }
    }
}

/// Git host credentials via the GitHub CLI, or a token in the environment.
#[derive(Default)]
pub struct GhHostAuth;

#[async_trait]
impl HostAuth for GhHostAuth {
    async fn check_credentials(&self) -> bool {
        if env_set("GH_TOKEN") || env_set("GITHUB_TOKEN") {
            return true;
        }
        Command::new("gh")
            .args(["auth", "status"])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Cloud access token kept in `<app_dir>/cloud-token`, overridable by env.
pub struct TokenFileAuth {
    path: Option<PathBuf>,
}

impl Default for TokenFileAuth {
    fn default() -> Self {
        Self {
            path: get_app_dir().ok().map(|d| d.join(CLOUD_TOKEN_FILE)),
        }
    }
}

impl TokenFileAuth {
    pub fn at(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn save(&self, token: &str) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no app directory for the cloud token",
            ));
        };
        std::fs::write(path, format!("{}\n", token.trim()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl CloudAuth for TokenFileAuth {
    fn token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(CLOUD_TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
        let content = std::fs::read_to_string(self.path.as_ref()?).ok()?;
        Some(content.trim().to_string()).filter(|t| !t.is_empty())
    }

    fn login(&self) -> bool {
        println!("Create an access token in the sandbox dashboard and paste it below.");
        print!("Cloud sandbox token: ");
        if std::io::stdout().flush().is_err() {
            return false;
        }

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() || line.trim().is_empty() {
            return false;
        }

        match self.save(&line) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Failed to save token: {}", e);
                false
            }
        }
    }
}
