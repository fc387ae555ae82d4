//! Centralized agent registry.
//!
//! All per-agent metadata lives here. Adding a new agent means adding a
//! variant to [`Agent`] and one `AgentDef` entry to `AGENTS`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::session::RunMode;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    #[default]
    Claude,
    Codex,
    Opencode,
    Gemini,
}

/// Everything we know about a single agent CLI.
pub struct AgentDef {
    pub agent: Agent,
    /// Canonical name: `"claude"`, `"codex"`, etc.
    pub name: &'static str,
    /// Binary to invoke inside the sandbox (and on the host for login).
    pub binary: &'static str,
    pub default_model: &'static str,
    pub model_flag: &'static str,
    /// Arguments placed right after the binary for a non-interactive run.
    pub print_args: &'static [&'static str],
    /// Arguments that continue the most recent conversation.
    pub continue_args: &'static [&'static str],
    /// Auto-approve flags; the sandbox is the permission boundary.
    pub yolo_args: &'static [&'static str],
    /// Arguments that restrict the agent to planning.
    pub plan_args: &'static [&'static str],
    /// Host command that runs the agent's own interactive login.
    pub login_command: &'static [&'static str],
    /// Any of these env vars being set counts as valid credentials.
    pub credential_env: &'static [&'static str],
    /// Credential files relative to the home directory.
    pub credential_files: &'static [&'static str],
    /// Config dir relative to home, bind-mounted into local sandboxes.
    pub config_dir: &'static str,
}

pub const AGENTS: &[AgentDef] = &[
    AgentDef {
        agent: Agent::Claude,
        name: "claude",
        binary: "claude",
        default_model: "sonnet",
        model_flag: "--model",
        print_args: &["-p"],
        continue_args: &["--continue"],
        yolo_args: &["--dangerously-skip-permissions"],
        plan_args: &["--permission-mode", "plan"],
        login_command: &["claude", "/login"],
        credential_env: &["ANTHROPIC_API_KEY", "CLAUDE_CODE_OAUTH_TOKEN"],
        credential_files: &[".claude/.credentials.json"],
        config_dir: ".claude",
    },
    AgentDef {
        agent: Agent::Codex,
        name: "codex",
        binary: "codex",
        default_model: "gpt-5-codex",
        model_flag: "--model",
        print_args: &["exec"],
        continue_args: &["resume", "--last"],
        yolo_args: &["--dangerously-bypass-approvals-and-sandbox"],
        plan_args: &["--sandbox", "read-only"],
        login_command: &["codex", "login"],
        credential_env: &["OPENAI_API_KEY"],
        credential_files: &[".codex/auth.json"],
        config_dir: ".codex",
    },
    AgentDef {
        agent: Agent::Opencode,
        name: "opencode",
        binary: "opencode",
        default_model: "anthropic/claude-sonnet-4-5",
        model_flag: "--model",
        print_args: &["run"],
        continue_args: &["--continue"],
        yolo_args: &[],
        plan_args: &["--agent", "plan"],
        login_command: &["opencode", "auth", "login"],
        credential_env: &["ANTHROPIC_API_KEY", "OPENAI_API_KEY"],
        credential_files: &[".local/share/opencode/auth.json"],
        config_dir: ".local/share/opencode",
    },
    AgentDef {
        agent: Agent::Gemini,
        name: "gemini",
        binary: "gemini",
        default_model: "gemini-2.5-pro",
        model_flag: "--model",
        print_args: &["-p"],
        continue_args: &["--resume", "latest"],
        yolo_args: &["--yolo"],
        plan_args: &["--approval-mode", "default"],
        login_command: &["gemini"],
        credential_env: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        credential_files: &[".gemini/oauth_creds.json"],
        config_dir: ".gemini",
    },
];

impl Agent {
    pub fn def(&self) -> &'static AgentDef {
        AGENTS
            .iter()
            .find(|d| d.agent == *self)
            .unwrap_or(&AGENTS[0])
    }

    pub fn as_str(&self) -> &'static str {
        self.def().name
    }

    pub fn default_model(&self) -> &'static str {
        self.def().default_model
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Agent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        AGENTS
            .iter()
            .find(|d| d.name == lower || d.binary == lower)
            .map(|d| d.agent)
            .ok_or_else(|| format!("unknown agent '{}'", s))
    }
}

/// What the agent should do when its sandbox process starts.
#[derive(Debug, Clone, Default)]
pub struct AgentInvocation {
    pub model: String,
    pub prompt: Option<String>,
    pub mode: RunMode,
    pub continue_session: bool,
    pub extra_args: Vec<String>,
}

/// Build the argv that runs `agent` inside a sandbox.
pub fn build_command(agent: Agent, inv: &AgentInvocation) -> Vec<String> {
    let def = agent.def();
    let mut argv = vec![def.binary.to_string()];
    let prompt = inv.prompt.as_deref().filter(|p| !p.trim().is_empty());

    let detached = inv.mode == RunMode::Async;
    if detached {
        argv.extend(def.print_args.iter().map(|s| s.to_string()));
    }
    if inv.continue_session {
        argv.extend(def.continue_args.iter().map(|s| s.to_string()));
    }
    if !inv.model.is_empty() {
        argv.push(def.model_flag.to_string());
        argv.push(inv.model.clone());
    }
    if inv.mode == RunMode::Plan {
        argv.extend(def.plan_args.iter().map(|s| s.to_string()));
    } else {
        argv.extend(def.yolo_args.iter().map(|s| s.to_string()));
    }
    argv.extend(inv.extra_args.iter().cloned());
    if let Some(prompt) = prompt {
        argv.push(prompt.to_string());
    }

    argv
}

/// Quote an argv for `sh -c`.
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:@".contains(c))
            {
                arg.clone()
            } else {
                format!("'{}'", arg.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_agent_has_a_def() {
        for agent in [Agent::Claude, Agent::Codex, Agent::Opencode, Agent::Gemini] {
            assert_eq!(agent.def().agent, agent);
        }
    }

    #[test]
    fn test_agent_from_str() {
        assert_eq!("claude".parse::<Agent>(), Ok(Agent::Claude));
        assert_eq!(" Codex ".parse::<Agent>(), Ok(Agent::Codex));
        assert!("cursor".parse::<Agent>().is_err());
    }

    #[test]
    fn test_async_command_uses_print_mode() {
        let inv = AgentInvocation {
            model: "sonnet".to_string(),
            prompt: Some("fix the flaky test".to_string()),
            mode: RunMode::Async,
            ..Default::default()
        };
        let argv = build_command(Agent::Claude, &inv);
        assert_eq!(
            argv,
            vec![
                "claude",
                "-p",
                "--model",
                "sonnet",
                "--dangerously-skip-permissions",
                "fix the flaky test"
            ]
        );
    }

    #[test]
    fn test_plan_command_skips_yolo() {
        let inv = AgentInvocation {
            mode: RunMode::Plan,
            ..Default::default()
        };
        let argv = build_command(Agent::Claude, &inv);
        assert!(argv.contains(&"plan".to_string()));
        assert!(!argv.contains(&"--dangerously-skip-permissions".to_string()));
    }

    #[test]
    fn test_continue_and_extra_args() {
        let inv = AgentInvocation {
            continue_session: true,
            extra_args: vec!["--verbose".to_string()],
            ..Default::default()
        };
        let argv = build_command(Agent::Codex, &inv);
        assert_eq!(argv[0], "codex");
        assert_eq!(&argv[1..3], &["resume", "--last"]);
        assert_eq!(argv.last().map(String::as_str), Some("--verbose"));
    }

    #[test]
    fn test_blank_prompt_is_dropped() {
        let inv = AgentInvocation {
            prompt: Some("   ".to_string()),
            ..Default::default()
        };
        let argv = build_command(Agent::Gemini, &inv);
        assert_eq!(argv, vec!["gemini", "--yolo"]);
    }

    #[test]
    fn test_shell_join_quotes_when_needed() {
        let argv = vec![
            "claude".to_string(),
            "-p".to_string(),
            "it's broken".to_string(),
        ];
        assert_eq!(shell_join(&argv), r"claude -p 'it'\''s broken'");
    }
}
