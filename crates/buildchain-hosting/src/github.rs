//! GitHub REST provider

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::client::{authenticated_url, GitHostingClient, PullRequestHead, RepoRef};
use crate::config::{ProviderConfig, ProviderKind};
use crate::http::{AuthScheme, RestTransport};
use crate::Result;

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct Fork {
    name: String,
    owner: Owner,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
}

/// Client for github.com and GitHub Enterprise
pub struct GitHubClient {
    transport: RestTransport,
    server_url: String,
}

impl GitHubClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            transport: RestTransport::new(&config.api_url, AuthScheme::Bearer, config.tokens.clone())?,
            server_url: config.server_url.clone(),
        })
    }
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl GitHostingClient for GitHubClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn branch_exists(&self, owner: &str, repo: &str, branch: &str) -> Result<bool> {
        let path = format!(
            "/repos/{}/{}/branches/{}",
            segment(owner),
            segment(repo),
            segment(branch)
        );
        Ok(self.transport.get_text(&path, &[]).await?.is_some())
    }

    async fn pull_request_exists(
        &self,
        owner: &str,
        repo: &str,
        head: PullRequestHead<'_>,
        base: &str,
    ) -> Result<bool> {
        let path = format!("/repos/{}/{}/pulls", segment(owner), segment(repo));
        let query = [
            ("state", "open".to_string()),
            ("head", format!("{}:{}", head.owner, head.branch)),
            ("base", base.to_string()),
        ];
        let pulls: Vec<PullRequest> = self.transport.get_json(&path, &query).await?.unwrap_or_default();
        if let Some(pr) = pulls.first() {
            debug!(number = pr.number, "Found open pull request");
        }
        Ok(!pulls.is_empty())
    }

    async fn list_forks(&self, owner: &str, repo: &str) -> Result<Vec<RepoRef>> {
        let path = format!("/repos/{}/{}/forks", segment(owner), segment(repo));
        let forks: Vec<Fork> = self.transport.get_paged_json(&path).await?;
        Ok(forks
            .into_iter()
            .map(|f| RepoRef {
                owner: f.owner.login,
                name: f.name,
            })
            .collect())
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<bool> {
        let path = format!("/repos/{}/{}", segment(owner), segment(repo));
        Ok(self.transport.get_text(&path, &[]).await?.is_some())
    }

    fn clone_url(&self, owner: &str, repo: &str) -> String {
        let token = self.transport.current_token();
        let user = token.as_ref().map(|_| "x-access-token");
        authenticated_url(
            &self.server_url,
            &format!("{owner}/{repo}.git"),
            user,
            token.as_deref(),
        )
    }
}
