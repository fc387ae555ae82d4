//! CLI command implementations

pub mod definition;
pub mod list;
pub mod session;

pub use definition::{Cli, Commands};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::collab::{
    AgentAuth, AgentBranchNamer, CliAgentAuth, CloudAuth, ConfigReader, FileConfigReader,
    GhHostAuth, GitRepoResolver, RepoResolver, TigerForker, TokenFileAuth,
};
use crate::engine::{Collaborators, ProcessRunner, Workflow};
use crate::provider::Providers;
use crate::session::{Config, ProviderKind, Session};

/// The real collaborators, wired once per process.
pub struct Services {
    pub config: Config,
    pub providers: Providers,
    pub workflow: Arc<Workflow>,
    pub reader: Arc<dyn ConfigReader>,
    pub repo: Arc<dyn RepoResolver>,
    pub agent_auth: Arc<dyn AgentAuth>,
    pub cloud_auth: Arc<dyn CloudAuth>,
    pub cwd: PathBuf,
}

impl Services {
    pub fn new(config: Config, active: Option<ProviderKind>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let cloud_auth: Arc<dyn CloudAuth> = Arc::new(TokenFileAuth::default());
        let mut providers = Providers::from_config(&config, cloud_auth.clone())?;
        if let Some(kind) = active {
            providers.set_active(kind);
        }
        let reader: Arc<dyn ConfigReader> = Arc::new(FileConfigReader);
        let repo: Arc<dyn RepoResolver> = Arc::new(GitRepoResolver::new(cwd.clone()));
        let agent_auth: Arc<dyn AgentAuth> = Arc::new(CliAgentAuth::default());

        let workflow = Workflow::new(
            providers.clone(),
            Collaborators {
                config: reader.clone(),
                agent_auth: agent_auth.clone(),
                host_auth: Arc::new(GhHostAuth),
                namer: Arc::new(AgentBranchNamer),
                repo: repo.clone(),
                forker: Arc::new(TigerForker),
                cloud_auth: cloud_auth.clone(),
            },
            cwd.clone(),
        );

        Ok(Self {
            config,
            providers,
            workflow: Arc::new(workflow),
            reader,
            repo,
            agent_auth,
            cloud_auth,
            cwd,
        })
    }

    /// Attach, shell and login children on the inherited terminal.
    pub fn children(&self) -> ProcessRunner {
        ProcessRunner::new(
            self.providers.clone(),
            self.agent_auth.clone(),
            self.cloud_auth.clone(),
        )
    }
}

/// Sessions to search: just `only`'s when given, otherwise everything the
/// providers report in active-first order.
pub async fn load_sessions(
    providers: &Providers,
    only: Option<ProviderKind>,
) -> Result<Vec<Session>> {
    match only {
        Some(kind) => Ok(providers.get(kind).list().await?),
        None => Ok(providers.list_all().await?),
    }
}

/// Exact id, then id prefix, then name. Each stage searches providers in
/// `order` before moving on to the next stage.
pub fn resolve_session<'a>(
    identifier: &str,
    sessions: &'a [Session],
    order: [ProviderKind; 2],
) -> Result<&'a Session> {
    let stages: [&dyn Fn(&Session) -> bool; 3] = [
        &|s: &Session| s.id == identifier,
        &|s: &Session| s.id.starts_with(identifier),
        &|s: &Session| s.name == identifier,
    ];

    for matches in stages {
        for kind in order {
            if let Some(session) = sessions
                .iter()
                .find(|s| s.provider == kind && matches(s))
            {
                return Ok(session);
            }
        }
    }

    bail!("Session not found: {}", identifier)
}

/// Compact age such as "45s", "12m", "3h" or "2d".
pub fn format_age(created: DateTime<Utc>) -> String {
    let secs = (Utc::now() - created).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

/// Fit `s` into `max` terminal columns, marking the cut with "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.width() <= max {
        return s.to_string();
    }
    let (budget, tail) = if max <= 3 { (max, "") } else { (max - 3, "...") };

    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str(tail);
    out
}

pub fn truncate_id(id: &str, max_len: usize) -> &str {
    match id.char_indices().nth(max_len) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_shorter_than_max() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_longer_than_max() {
        assert_eq!(truncate("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_with_small_max() {
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("hello", 0), "");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_truncate_counts_wide_chars_as_two_columns() {
        assert_eq!(truncate("日本語のブランチ名", 9), "日本語...");
    }

    #[test]
    fn test_truncate_id() {
        assert_eq!(truncate_id("abc123", 10), "abc123");
        assert_eq!(truncate_id("abc123def456", 8), "abc123de");
        assert_eq!(truncate_id("", 5), "");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Utc::now() - chrono::Duration::hours(3)), "3h");
        assert_eq!(format_age(Utc::now() - chrono::Duration::days(2)), "2d");
        // Clock skew never goes negative.
        assert_eq!(format_age(Utc::now() + chrono::Duration::minutes(5)), "0s");
    }

    fn sessions() -> Vec<Session> {
        let mut cloud = Session::new("sbx_7f3a", "fix-login", ProviderKind::Cloud);
        cloud.branch = "fix-login".to_string();
        let mut local = Session::new("7f3a9c0d1e2f", "add-docs", ProviderKind::Local);
        local.branch = "add-docs".to_string();
        let mut dup = Session::new("sbx_7f3a", "dup", ProviderKind::Local);
        dup.branch = "dup".to_string();
        vec![cloud, local, dup]
    }

    const LOCAL_FIRST: [ProviderKind; 2] = [ProviderKind::Local, ProviderKind::Cloud];
    const CLOUD_FIRST: [ProviderKind; 2] = [ProviderKind::Cloud, ProviderKind::Local];

    #[test]
    fn test_resolve_exact_id_uses_provider_order() {
        let list = sessions();
        assert_eq!(
            resolve_session("sbx_7f3a", &list, LOCAL_FIRST).unwrap().name,
            "dup"
        );
        assert_eq!(
            resolve_session("sbx_7f3a", &list, CLOUD_FIRST).unwrap().name,
            "fix-login"
        );
    }

    #[test]
    fn test_resolve_prefix_then_name() {
        let list = sessions();
        assert_eq!(
            resolve_session("7f3a", &list, LOCAL_FIRST).unwrap().name,
            "add-docs"
        );
        assert_eq!(
            resolve_session("fix-login", &list, LOCAL_FIRST).unwrap().id,
            "sbx_7f3a"
        );
    }

    #[test]
    fn test_resolve_exact_beats_prefix() {
        let mut list = sessions();
        list.push(Session::new("sbx", "short", ProviderKind::Cloud));
        assert_eq!(
            resolve_session("sbx", &list, LOCAL_FIRST).unwrap().name,
            "short"
        );
    }

    #[test]
    fn test_resolve_not_found() {
        let list = sessions();
        let err = resolve_session("nope", &list, LOCAL_FIRST).unwrap_err();
        assert!(err.to_string().contains("Session not found"));
    }
}
