use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::BranchNamer;
use crate::agents::{self, Agent, AgentInvocation};
use crate::session::RunMode;

const MAX_BRANCH_LEN: usize = 40;
const NAMER_TIMEOUT: Duration = Duration::from_secs(60);

/// Lowercase, `[a-z0-9-/]` only. Separators never lead, trail or follow
/// another separator, so the result is always a valid ref component path.
pub fn sanitize_branch(raw: &str) -> String {
    let mut out = String::new();
    for c in raw.trim().chars() {
        let c = c.to_ascii_lowercase();
        let after_separator = out.is_empty() || out.ends_with('-') || out.ends_with('/');
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !after_separator {
            out.push(if c == '/' { '/' } else { '-' });
        }
    }

    let mut out: String = out.chars().take(MAX_BRANCH_LEN).collect();
    while out.ends_with('-') || out.ends_with('/') {
        out.pop();
    }
    out
}

fn random_tag(len: usize) -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(len)
        .collect()
}

/// `<mode>-<6 random chars>`, used when there is no prompt to name from.
pub fn random_branch(mode: RunMode) -> String {
    format!("{}-{}", mode, random_tag(6))
}

pub fn with_suffix(branch: &str) -> String {
    format!("{}-{}", branch, random_tag(4))
}

/// Asks the agent itself, in print mode on the host, for a branch name.
#[derive(Default)]
pub struct AgentBranchNamer;

fn naming_prompt(prompt: &str) -> String {
    format!(
        "Reply with only a short git branch name (kebab-case, at most 5 words, no prefix) \
         for this task:\n\n{}",
        prompt
    )
}

#[async_trait]
impl BranchNamer for AgentBranchNamer {
    async fn generate(&self, prompt: &str, agent: Agent, model: &str) -> Result<String> {
        let inv = AgentInvocation {
            model: model.to_string(),
            prompt: Some(naming_prompt(prompt)),
            mode: RunMode::Async,
            continue_session: false,
            extra_args: Vec::new(),
        };
        let mut argv = agents::build_command(agent, &inv).into_iter();
        let program = argv.next().unwrap_or_else(|| agent.def().binary.to_string());

        let output = tokio::time::timeout(
            NAMER_TIMEOUT,
            Command::new(program).args(argv).kill_on_drop(true).output(),
        )
        .await??;

        if !output.status.success() {
            bail!("{} exited with {} while naming the branch", agent, output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let raw = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .trim_matches(|c| c == '`' || c == '"' || c == '\'');
        let name = sanitize_branch(raw);
        if name.is_empty() {
            bail!("{} returned no usable branch name", agent);
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_branch() {
        assert_eq!(sanitize_branch("Fix the Flaky Test!"), "fix-the-flaky-test");
        assert_eq!(sanitize_branch("  feat/add_login  "), "feat/add-login");
        assert_eq!(sanitize_branch("--weird--"), "weird");
        assert_eq!(sanitize_branch("???"), "");
    }

    #[test]
    fn test_sanitize_branch_collapses_slashes() {
        assert_eq!(sanitize_branch("/fix//x"), "fix/x");
        assert_eq!(sanitize_branch("feat -/ login/"), "feat-login");
        assert_eq!(sanitize_branch("a/-b"), "a/b");
    }

    #[test]
    fn test_sanitize_branch_truncates() {
        let long = "a-".repeat(40);
        let name = sanitize_branch(&long);
        assert!(name.len() <= MAX_BRANCH_LEN);
        assert!(!name.ends_with('-'));
    }

    #[test]
    fn test_random_branch_prefixed_by_mode() {
        let name = random_branch(RunMode::Plan);
        assert!(name.starts_with("plan-"));
        assert_eq!(name.len(), "plan-".len() + 6);
        assert_ne!(random_branch(RunMode::Async), random_branch(RunMode::Async));
    }

    #[test]
    fn test_with_suffix() {
        let name = with_suffix("fix-flaky-test");
        assert!(name.starts_with("fix-flaky-test-"));
        assert_eq!(name.len(), "fix-flaky-test-".len() + 4);
    }
}
