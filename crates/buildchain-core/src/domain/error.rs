//! Domain-level error taxonomy for build-chain.

use buildchain_hosting::HostingError;

/// Build-chain domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildChainError {
    /// No branch/fork/repository could be located for a node.
    #[error("not found for {project}: {detail}")]
    NotFound { project: String, detail: String },

    /// A local git invocation exited non-zero.
    #[error("git {args} failed with exit code {exit_code}: {output}")]
    GitExecution {
        args: String,
        exit_code: i32,
        output: String,
    },

    /// Every hosting credential was rate limited.
    #[error("hosting API rate limit exhausted: {0}")]
    RateLimitExhausted(String),

    /// A build command returned non-zero.
    #[error("command '{command}' failed for {project}: {message}")]
    CommandExecution {
        project: String,
        command: String,
        message: String,
    },

    /// The resumable state file is missing, corrupt or inconsistent.
    #[error("state serialization error: {0}")]
    Serialization(String),

    /// The flow options do not describe a runnable flow.
    #[error("invalid flow: {0}")]
    InvalidFlow(String),

    #[error("hosting error: {0}")]
    Hosting(HostingError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    TaskJoin(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HostingError> for BuildChainError {
    fn from(err: HostingError) -> Self {
        match err {
            HostingError::RateLimitExhausted { .. } => {
                BuildChainError::RateLimitExhausted(err.to_string())
            }
            other => BuildChainError::Hosting(other),
        }
    }
}

impl From<tokio::task::JoinError> for BuildChainError {
    fn from(err: tokio::task::JoinError) -> Self {
        BuildChainError::TaskJoin(err.to_string())
    }
}

/// Result type for build-chain domain operations.
pub type Result<T> = std::result::Result<T, BuildChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = BuildChainError::NotFound {
            project: "org/core".to_string(),
            detail: "no branch main".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("org/core"));
        assert!(msg.contains("no branch main"));
    }

    #[test]
    fn test_git_execution_carries_exit_code_and_output() {
        let err = BuildChainError::GitExecution {
            args: "clone --branch main".to_string(),
            exit_code: 128,
            output: "fatal: repository not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("repository not found"));
    }

    #[test]
    fn test_rate_limit_hosting_error_maps_to_dedicated_variant() {
        let err: BuildChainError = HostingError::RateLimitExhausted { tried: 2 }.into();
        assert!(matches!(err, BuildChainError::RateLimitExhausted(_)));

        let err: BuildChainError = HostingError::Http("reset".to_string()).into();
        assert!(matches!(err, BuildChainError::Hosting(_)));
    }
}
