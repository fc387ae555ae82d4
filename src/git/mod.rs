//! Repository context: which hosted repo and branch a directory belongs to

use std::path::{Path, PathBuf};

pub mod error;

use error::{GitError, Result};

pub const DEFAULT_REMOTE: &str = "origin";

pub struct GitRepo {
    repo: git2::Repository,
}

impl GitRepo {
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotAGitRepo)?;
        Ok(Self { repo })
    }

    pub fn is_git_repo(path: &Path) -> bool {
        git2::Repository::discover(path).is_ok()
    }

    pub fn root(&self) -> Result<PathBuf> {
        Ok(self.repo.workdir().ok_or(GitError::NotAGitRepo)?.to_path_buf())
    }

    pub fn remote_url(&self, name: &str) -> Result<String> {
        let remote = self
            .repo
            .find_remote(name)
            .map_err(|_| GitError::NoRemote(name.to_string()))?;
        remote
            .url()
            .map(str::to_string)
            .ok_or_else(|| GitError::NoRemote(name.to_string()))
    }

    /// `owner/name` of the given remote.
    pub fn full_name(&self, remote: &str) -> Result<String> {
        let url = self.remote_url(remote)?;
        parse_full_name(&url).ok_or(GitError::UnrecognizedRemote(url))
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        if self.repo.head_detached()? {
            return Ok(None);
        }
        let head = match self.repo.head() {
            Ok(head) => head,
            // Unborn branch: no commits yet.
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(head.shorthand().map(str::to_string))
    }
}

/// Extract `owner/name` from the usual remote URL shapes:
/// `git@host:owner/name.git`, `https://host/owner/name(.git)`,
/// `ssh://git@host[:port]/owner/name.git`.
pub fn parse_full_name(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    let path = if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/')?.1
    } else if let Some((host, rest)) = url.split_once(':') {
        if !host.contains('@') && !host.contains('.') {
            return None;
        }
        rest
    } else {
        return None;
    };

    let path = path.trim_end_matches(".git");
    let mut parts = path.rsplitn(3, '/');
    let name = parts.next().filter(|s| !s.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    Some(format!("{}/{}", owner, name))
}
