//! GitLab REST (v4) provider

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::{authenticated_url, GitHostingClient, PullRequestHead, RepoRef};
use crate::config::{ProviderConfig, ProviderKind};
use crate::http::{AuthScheme, RestTransport};
use crate::Result;

#[derive(Debug, Deserialize)]
struct Namespace {
    full_path: String,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: u64,
    path: String,
    namespace: Namespace,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    source_project_id: u64,
}

/// Client for gitlab.com and self-managed GitLab
pub struct GitLabClient {
    transport: RestTransport,
    server_url: String,
}

/// URL-encoded `namespace/project` id as GitLab expects in paths
fn project_id(owner: &str, repo: &str) -> String {
    urlencoding::encode(&format!("{owner}/{repo}")).into_owned()
}

impl GitLabClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            transport: RestTransport::new(
                &config.api_url,
                AuthScheme::PrivateToken,
                config.tokens.clone(),
            )?,
            server_url: config.server_url.clone(),
        })
    }

    async fn project(&self, owner: &str, repo: &str) -> Result<Option<Project>> {
        let path = format!("/projects/{}", project_id(owner, repo));
        self.transport.get_json(&path, &[]).await
    }
}

#[async_trait]
impl GitHostingClient for GitLabClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GitLab
    }

    async fn branch_exists(&self, owner: &str, repo: &str, branch: &str) -> Result<bool> {
        let path = format!(
            "/projects/{}/repository/branches/{}",
            project_id(owner, repo),
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
        // Merge requests only carry the source project id, so resolve the head
        // project first to tell forks with the same branch name apart.
        let Some(source) = self.project(head.owner, head.repo).await? else {
            return Ok(false);
        };
        let path = format!("/projects/{}/merge_requests", project_id(owner, repo));
        let query = [
            ("state", "opened".to_string()),
            ("source_branch", head.branch.to_string()),
            ("target_branch", base.to_string()),
        ];
        let merge_requests: Vec<MergeRequest> =
            self.transport.get_json(&path, &query).await?.unwrap_or_default();
        Ok(merge_requests
            .iter()
            .any(|mr| mr.source_project_id == source.id))
    }

    async fn list_forks(&self, owner: &str, repo: &str) -> Result<Vec<RepoRef>> {
        let path = format!("/projects/{}/forks", project_id(owner, repo));
        let forks: Vec<Project> = self.transport.get_paged_json(&path).await?;
        Ok(forks
            .into_iter()
            .map(|p| RepoRef {
                owner: p.namespace.full_path,
                name: p.path,
            })
            .collect())
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<bool> {
        Ok(self.project(owner, repo).await?.is_some())
    }

    fn clone_url(&self, owner: &str, repo: &str) -> String {
        let token = self.transport.current_token();
        let user = token.as_ref().map(|_| "oauth2");
        authenticated_url(
            &self.server_url,
            &format!("{owner}/{repo}.git"),
            user,
            token.as_deref(),
        )
    }
}
