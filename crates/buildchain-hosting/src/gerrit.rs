//! Gerrit REST provider
//!
//! Gerrit has no forks: every change is pushed against a branch of the one
//! canonical project, so fork listing is always empty and a "pull request"
//! is an open change on the base branch whose topic is the head branch.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::client::{authenticated_url, GitHostingClient, PullRequestHead, RepoRef};
use crate::config::{ProviderConfig, ProviderKind};
use crate::http::{AuthScheme, RestTransport};
use crate::Result;

/// Prefix Gerrit prepends to every JSON body to defeat XSSI
const XSSI_PREFIX: &str = ")]}'";

#[derive(Debug, Deserialize)]
struct ChangeInfo {
    #[serde(rename = "_number")]
    number: u64,
}

/// Client for a Gerrit code-review server
pub struct GerritClient {
    transport: RestTransport,
    server_url: String,
}

fn strip_xssi(body: &str) -> &str {
    body.trim_start()
        .strip_prefix(XSSI_PREFIX)
        .unwrap_or(body)
        .trim_start()
}

fn project_name(owner: &str, repo: &str) -> String {
    urlencoding::encode(&format!("{owner}/{repo}")).into_owned()
}

impl GerritClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            transport: RestTransport::new(&config.api_url, AuthScheme::Basic, config.tokens.clone())?,
            server_url: config.server_url.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        match self.transport.get_text(path, query).await? {
            Some(body) => Ok(Some(serde_json::from_str(strip_xssi(&body))?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl GitHostingClient for GerritClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Gerrit
    }

    async fn branch_exists(&self, owner: &str, repo: &str, branch: &str) -> Result<bool> {
        let path = format!(
            "/projects/{}/branches/{}",
            project_name(owner, repo),
            urlencoding::encode(branch)
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
        if head.owner != owner || head.repo != repo {
            return Ok(false);
        }
        let query = [(
            "q",
            format!(
                "status:open project:{owner}/{repo} branch:{base} topic:{}",
                head.branch
            ),
        )];
        let changes: Vec<ChangeInfo> = self.get_json("/changes/", &query).await?.unwrap_or_default();
        Ok(changes.iter().any(|c| c.number > 0))
    }

    async fn list_forks(&self, _owner: &str, _repo: &str) -> Result<Vec<RepoRef>> {
        Ok(Vec::new())
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<bool> {
        let path = format!("/projects/{}", project_name(owner, repo));
        Ok(self.transport.get_text(&path, &[]).await?.is_some())
    }

    fn clone_url(&self, owner: &str, repo: &str) -> String {
        let token = self.transport.current_token();
        let (user, password) = match token.as_deref().and_then(|t| t.split_once(':')) {
            Some((user, password)) => (Some(user), Some(password)),
            None => (token.as_deref(), None),
        };
        authenticated_url(&self.server_url, &format!("{owner}/{repo}"), user, password)
    }
}
