use std::path::PathBuf;

use super::{RepoInfo, RepoResolver};
use crate::git::{GitRepo, DEFAULT_REMOTE};

/// Resolves repo context for a working directory via libgit2.
pub struct GitRepoResolver {
    cwd: PathBuf,
}

impl GitRepoResolver {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }

    pub fn current_dir() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl RepoResolver for GitRepoResolver {
    fn get_repo_info(&self) -> Option<RepoInfo> {
        let repo = GitRepo::discover(&self.cwd).ok()?;
        let full_name = match repo.full_name(DEFAULT_REMOTE) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("No repo context in {}: {}", self.cwd.display(), e);
                return None;
            }
        };

        Some(RepoInfo {
            full_name,
            root: repo.root().ok()?,
            current_branch: repo.current_branch().ok().flatten(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_repo_context_outside_git() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitRepoResolver::new(dir.path().to_path_buf())
            .get_repo_info()
            .is_none());
    }

    #[test]
    fn test_repo_without_remote_has_no_context() {
        let dir = tempfile::tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        assert!(GitRepoResolver::new(dir.path().to_path_buf())
            .get_repo_info()
            .is_none());
    }

    #[test]
    fn test_repo_with_origin() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        repo.remote("origin", "https://github.com/acme/widgets.git")
            .unwrap();

        let info = GitRepoResolver::new(dir.path().to_path_buf())
            .get_repo_info()
            .unwrap();
        assert_eq!(info.full_name, "acme/widgets");
    }
}
