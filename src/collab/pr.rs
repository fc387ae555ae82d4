use async_trait::async_trait;
use tokio::process::Command;

use super::{PrInfo, PrLookup};
use crate::session::LOCAL_REPO;

/// Looks up the PR for a branch with `gh pr view`.
#[derive(Default)]
pub struct GhPrLookup;

#[async_trait]
impl PrLookup for GhPrLookup {
    async fn get_pr_for_branch(&self, repo: &str, branch: &str) -> Option<PrInfo> {
        if repo == LOCAL_REPO || branch.is_empty() {
            return None;
        }

        let output = Command::new("gh")
            .args(["pr", "view", branch, "--repo", repo])
            .args(["--json", "number,title,state,url,isDraft"])
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            // No PR for the branch is the common case.
            tracing::debug!(
                "gh pr view {} failed: {}",
                branch,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        serde_json::from_slice(&output.stdout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pr_info_from_gh_json() {
        let raw = r#"{"isDraft":true,"number":42,"state":"OPEN","title":"Fix flaky test","url":"https://github.com/acme/widgets/pull/42"}"#;
        let pr: PrInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(pr.number, 42);
        assert!(pr.is_draft);
        assert_eq!(pr.state, "OPEN");
    }

    #[tokio::test]
    async fn test_local_repo_has_no_pr() {
        assert!(GhPrLookup
            .get_pr_for_branch(LOCAL_REPO, "main")
            .await
            .is_none());
    }
}
