use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error(
        "Docker is not installed or not in PATH.\n\
         Install Docker: https://docs.docker.com/get-docker/"
    )]
    NotInstalled,

    #[error(
        "Docker daemon is not running.\n\
         Start Docker Desktop or run: sudo systemctl start docker"
    )]
    DaemonNotRunning,

    #[error(
        "Docker permission denied.\n\
         On Linux, add your user to the docker group:\n\
         sudo usermod -aG docker $USER\n\
         Then log out and back in."
    )]
    PermissionDenied,

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container already exists: {0}")]
    ContainerAlreadyExists(String),

    #[error("Docker image not found: {0}")]
    ImageNotFound(String),

    #[error("Failed to create container: {0}")]
    CreateFailed(String),

    #[error("Failed to start container: {0}")]
    StartFailed(String),

    #[error("Failed to stop container: {0}")]
    StopFailed(String),

    #[error("Failed to remove container: {0}")]
    RemoveFailed(String),

    #[error("Docker command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DockerError {
    /// Map well-known stderr fragments onto specific variants; anything else
    /// goes through `fallback`.
    pub fn classify(name: &str, stderr: &str, fallback: fn(String) -> DockerError) -> Self {
        let lower = stderr.to_lowercase();
        if lower.contains("no such container") || lower.contains("no such object") {
            return DockerError::ContainerNotFound(name.to_string());
        }
        if lower.contains("permission denied") {
            return DockerError::PermissionDenied;
        }
        if lower.contains("cannot connect to the docker daemon") {
            return DockerError::DaemonNotRunning;
        }
        if lower.contains("is already in use by container") {
            return DockerError::ContainerAlreadyExists(name.to_string());
        }
        if lower.contains("no such image") || lower.contains("unable to find image") {
            return DockerError::ImageNotFound(name.to_string());
        }
        fallback(stderr.trim().to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DockerError::ContainerNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, DockerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = DockerError::classify(
            "asb-1",
            "Error response from daemon: No such container: asb-1",
            DockerError::StopFailed,
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_daemon_down() {
        let err = DockerError::classify(
            "asb-1",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
            DockerError::CreateFailed,
        );
        assert!(matches!(err, DockerError::DaemonNotRunning));
    }

    #[test]
    fn test_classify_name_conflict() {
        let err = DockerError::classify(
            "asb-fix",
            "Conflict. The container name \"/asb-fix\" is already in use by container \"abc\"",
            DockerError::CreateFailed,
        );
        assert!(matches!(err, DockerError::ContainerAlreadyExists(n) if n == "asb-fix"));
    }

    #[test]
    fn test_classify_fallback() {
        let err = DockerError::classify("x", "  boom \n", DockerError::RemoveFailed);
        assert!(matches!(err, DockerError::RemoveFailed(msg) if msg == "boom"));
    }
}
