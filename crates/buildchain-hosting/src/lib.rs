//! Buildchain-Hosting: Git hosting provider clients for build-chain
//!
//! This crate answers the questions the branch resolver asks of a hosting
//! provider: does a branch exist, is there an open pull request, which forks
//! does a repository have. GitHub, GitLab and Gerrit dialects sit behind the
//! single [`GitHostingClient`] trait.
//!
//! Throttled requests are retried with the next credential from a
//! [`CredentialPool`]; when the pool runs dry the call fails with
//! [`HostingError::RateLimitExhausted`].

pub mod client;
pub mod config;
pub mod credentials;
mod error;
pub mod gerrit;
pub mod github;
pub mod gitlab;
pub mod http;

use std::sync::Arc;

pub use client::{GitHostingClient, PullRequestHead, RepoRef};
pub use config::{ProviderConfig, ProviderKind};
pub use credentials::CredentialPool;
pub use error::HostingError;
pub use gerrit::GerritClient;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Result type for hosting operations
pub type Result<T> = std::result::Result<T, HostingError>;

/// Build the client matching `config.kind`
pub fn connect(config: &ProviderConfig) -> Result<Arc<dyn GitHostingClient>> {
    tracing::debug!(provider = %config.kind, api = %config.api_url, "Connecting hosting client");
    Ok(match config.kind {
        ProviderKind::GitHub => Arc::new(GitHubClient::new(config)?),
        ProviderKind::GitLab => Arc::new(GitLabClient::new(config)?),
        ProviderKind::Gerrit => Arc::new(GerritClient::new(config)?),
    })
}
