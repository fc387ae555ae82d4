use thiserror::Error;

use crate::containers::error::DockerError;

/// How a caller should react to a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Substrate or credential not ready; branch into a setup flow.
    SetupNeeded,
    /// The target session is gone.
    NotFound,
    /// Fatal to the current workflow, not to the process.
    Configuration,
    /// Reported once, never retried automatically.
    Transient,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    NeedsSetup(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Config(String),

    #[error("{0} is not supported by the {1} provider")]
    Unsupported(&'static str, &'static str),

    #[error(transparent)]
    Docker(DockerError),

    #[error("Sandbox API error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("Sandbox API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Command(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NeedsSetup(_) => ErrorKind::SetupNeeded,
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::Config(_) | ProviderError::Unsupported(..) => ErrorKind::Configuration,
            ProviderError::Docker(_)
            | ProviderError::Http { .. }
            | ProviderError::Request(_)
            | ProviderError::Command(_)
            | ProviderError::Io(_) => ErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<DockerError> for ProviderError {
    fn from(err: DockerError) -> Self {
        match err {
            DockerError::NotInstalled
            | DockerError::DaemonNotRunning
            | DockerError::PermissionDenied => ProviderError::NeedsSetup(err.to_string()),
            DockerError::ContainerNotFound(name) => ProviderError::NotFound(name),
            other => ProviderError::Docker(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docker_setup_errors_need_setup() {
        for err in [
            DockerError::NotInstalled,
            DockerError::DaemonNotRunning,
            DockerError::PermissionDenied,
        ] {
            assert_eq!(ProviderError::from(err).kind(), ErrorKind::SetupNeeded);
        }
    }

    #[test]
    fn test_docker_missing_container_is_not_found() {
        let err = ProviderError::from(DockerError::ContainerNotFound("asb-x".to_string()));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Session not found: asb-x");
    }

    #[test]
    fn test_unsupported_is_configuration() {
        let err = ProviderError::Unsupported("Mount mode", "cloud");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "Mount mode is not supported by the cloud provider");
    }

    #[test]
    fn test_other_failures_are_transient() {
        let err = ProviderError::from(DockerError::CreateFailed("boom".to_string()));
        assert_eq!(err.kind(), ErrorKind::Transient);
        let err = ProviderError::Http {
            status: 500,
            message: "oops".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}
