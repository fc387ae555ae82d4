//! Git error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Path is not in a git repository")]
    NotAGitRepo,
    #[error("Repository has no '{0}' remote")]
    NoRemote(String),
    #[error("Cannot determine owner/name from remote URL '{0}'")]
    UnrecognizedRemote(String),
    #[error("Git error: {0}")]
    Git2Error(#[from] git2::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;
