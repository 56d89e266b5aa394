//! Provider configuration
//!
//! Mirrors the environment-first configuration style used across build-chain:
//! defaults come from well-known environment variables and can be overridden
//! with the `with_*` builders.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::HostingError;

/// Supported hosting providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Gerrit,
}

impl ProviderKind {
    /// Default REST API root for the provider's public SaaS offering
    pub fn default_api_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::GitHub => Some("https://api.github.com"),
            ProviderKind::GitLab => Some("https://gitlab.com/api/v4"),
            ProviderKind::Gerrit => None,
        }
    }

    /// Default web/clone root for the provider's public SaaS offering
    pub fn default_server_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::GitHub => Some("https://github.com"),
            ProviderKind::GitLab => Some("https://gitlab.com"),
            ProviderKind::Gerrit => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::GitLab => "gitlab",
            ProviderKind::Gerrit => "gerrit",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = HostingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            "gerrit" => Ok(ProviderKind::Gerrit),
            other => Err(HostingError::InvalidConfig(format!(
                "unknown provider '{other}' (expected github, gitlab or gerrit)"
            ))),
        }
    }
}

/// Connection settings for one hosting provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which REST dialect to speak
    pub kind: ProviderKind,
    /// REST API root, e.g. `https://api.github.com`
    pub api_url: String,
    /// Web root used to build clone URLs, e.g. `https://github.com`
    pub server_url: String,
    /// Credential pool, tried in order when the provider throttles
    #[serde(skip_serializing, default)]
    pub tokens: Vec<String>,
}

impl ProviderConfig {
    /// Create a config for `kind` using its public defaults.
    ///
    /// Fails for providers without a public default (Gerrit); use
    /// [`ProviderConfig::with_urls`] for those.
    pub fn new(kind: ProviderKind) -> Result<Self, HostingError> {
        let (api_url, server_url) = match (kind.default_api_url(), kind.default_server_url()) {
            (Some(api), Some(server)) => (api.to_string(), server.to_string()),
            _ => {
                return Err(HostingError::InvalidConfig(format!(
                    "{kind} has no default endpoint; an explicit API and server URL are required"
                )))
            }
        };
        Ok(Self {
            kind,
            api_url,
            server_url,
            tokens: Vec::new(),
        })
    }

    /// Create a config with explicit endpoints
    pub fn with_urls(kind: ProviderKind, api_url: &str, server_url: &str) -> Self {
        Self {
            kind,
            api_url: api_url.trim_end_matches('/').to_string(),
            server_url: server_url.trim_end_matches('/').to_string(),
            tokens: Vec::new(),
        }
    }

    /// Build a GitHub config from the environment.
    ///
    /// Reads `BUILD_CHAIN_API_URL`, `BUILD_CHAIN_SERVER_URL` and the credential
    /// pool from `BUILD_CHAIN_TOKENS` (comma-separated), falling back to
    /// `GITHUB_TOKEN`.
    pub fn from_env() -> Self {
        let kind = ProviderKind::GitHub;
        let api_url = std::env::var("BUILD_CHAIN_API_URL")
            .unwrap_or_else(|_| kind.default_api_url().unwrap_or_default().to_string());
        let server_url = std::env::var("BUILD_CHAIN_SERVER_URL")
            .unwrap_or_else(|_| kind.default_server_url().unwrap_or_default().to_string());
        let tokens = std::env::var("BUILD_CHAIN_TOKENS")
            .or_else(|_| std::env::var("GITHUB_TOKEN"))
            .map(|raw| split_tokens(&raw))
            .unwrap_or_default();

        Self::with_urls(kind, &api_url, &server_url).with_tokens(tokens)
    }

    /// Replace the credential pool
    pub fn with_tokens(mut self, tokens: Vec<String>) -> Self {
        self.tokens = tokens.into_iter().filter(|t| !t.trim().is_empty()).collect();
        self
    }

    /// Append a single credential to the pool
    pub fn with_token(mut self, token: &str) -> Self {
        if !token.trim().is_empty() {
            self.tokens.push(token.to_string());
        }
        self
    }
}

/// Split a comma-separated credential list, dropping blanks
pub fn split_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parses_case_insensitively() {
        assert_eq!("GitHub".parse::<ProviderKind>().unwrap(), ProviderKind::GitHub);
        assert_eq!("gitlab".parse::<ProviderKind>().unwrap(), ProviderKind::GitLab);
        assert_eq!(" GERRIT ".parse::<ProviderKind>().unwrap(), ProviderKind::Gerrit);
        assert!("bitbucket".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_github_defaults() {
        let config = ProviderConfig::new(ProviderKind::GitHub).unwrap();
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.server_url, "https://github.com");
        assert!(config.tokens.is_empty());
    }

    #[test]
    fn test_gerrit_requires_explicit_urls() {
        assert!(ProviderConfig::new(ProviderKind::Gerrit).is_err());
        let config = ProviderConfig::with_urls(
            ProviderKind::Gerrit,
            "https://review.example.org/",
            "https://review.example.org",
        );
        assert_eq!(config.api_url, "https://review.example.org");
    }

    #[test]
    fn test_split_tokens_drops_blanks() {
        assert_eq!(split_tokens("a, b,,c ,"), vec!["a", "b", "c"]);
        assert!(split_tokens("  ").is_empty());
    }

    #[test]
    fn test_with_token_ignores_empty_values() {
        let config = ProviderConfig::new(ProviderKind::GitLab)
            .unwrap()
            .with_token("")
            .with_token("glpat-1");
        assert_eq!(config.tokens, vec!["glpat-1"]);
    }
}
