//! Branch resolution: which (group, repository, branch, merge) to check out.
//!
//! For every node the resolver tries, in order:
//!
//! 1. the source branch in the source group's fork of the node,
//! 2. the source branch in the node's own repository,
//! 3. the (mapped) target branch in the node's own repository.
//!
//! In pull-request flows (1) and (2) also require an open pull request from
//! that branch into the target branch; `merge` records whether one exists.
//! Existence checks never fail the resolution: errors are logged and count
//! as "does not exist".

use std::path::PathBuf;
use std::sync::Arc;

use buildchain_hosting::{GitHostingClient, PullRequestHead};
use tracing::{debug, info, warn};

use crate::checkout::layout::folder_for;
use crate::checkout::mapping::target_branch_for;
use crate::domain::checkout::CheckoutInfo;
use crate::domain::error::{BuildChainError, Result};
use crate::domain::flow::ProjectRef;
use crate::domain::node::Node;

/// Resolves [`CheckoutInfo`] for nodes of one flow.
#[derive(Clone)]
pub struct BranchResolver {
    client: Arc<dyn GitHostingClient>,
    source: ProjectRef,
    target: ProjectRef,
    root: PathBuf,
}

struct Candidate<'a> {
    group: &'a str,
    name: &'a str,
    branch: &'a str,
}

impl BranchResolver {
    /// `source` carries the fork owner and branch of the change, `target`
    /// the branch it is headed for; checkouts live under `root`.
    pub fn new(
        client: Arc<dyn GitHostingClient>,
        source: ProjectRef,
        target: ProjectRef,
        root: PathBuf,
    ) -> Self {
        Self {
            client,
            source,
            target,
            root,
        }
    }

    pub fn client(&self) -> &Arc<dyn GitHostingClient> {
        &self.client
    }

    /// Resolve the checkout of `node` for a run triggered by `triggering`.
    pub async fn resolve(
        &self,
        node: &Node,
        triggering: &Node,
        pull_request_flow: bool,
    ) -> Result<CheckoutInfo> {
        let target_group = node.group();
        let target_name = node.name();
        let source_group = self.source.group.as_str();
        let source_branch = self.source.branch.as_str();
        let target_branch = target_branch_for(node, triggering, &self.target.branch);
        let repo_dir = folder_for(&self.root, &node.project);

        debug!(
            project = %node.project,
            source = %format!("{source_group}:{source_branch}"),
            target_branch = %target_branch,
            "Resolving checkout"
        );

        let target = Candidate {
            group: target_group,
            name: target_name,
            branch: &target_branch,
        };
        let info = |source: Candidate<'_>, merge: bool| CheckoutInfo {
            source_group: source.group.to_string(),
            source_name: source.name.to_string(),
            source_branch: source.branch.to_string(),
            target_group: target_group.to_string(),
            target_name: target_name.to_string(),
            target_branch: target_branch.clone(),
            merge,
            repo_dir: repo_dir.clone(),
        };

        // 1. source branch in the source group's fork
        let fork_name = self.fork_name(source_group, target_group, target_name).await;
        let fork = Candidate {
            group: source_group,
            name: &fork_name,
            branch: source_branch,
        };
        if let Some(merge) = self.accept(&fork, &target, pull_request_flow).await {
            info!(project = %node.project, fork = %format!("{source_group}/{fork_name}"), merge, "Using source fork branch");
            return Ok(info(fork, merge));
        }

        // 2. source branch in the node's own repository
        let same_repo = source_group == target_group && fork_name == target_name;
        if !same_repo {
            let direct = Candidate {
                group: target_group,
                name: target_name,
                branch: source_branch,
            };
            if let Some(merge) = self.accept(&direct, &target, pull_request_flow).await {
                info!(project = %node.project, merge, "Using source branch in target repository");
                return Ok(info(direct, merge));
            }
        }

        // 3. target branch in the node's own repository
        if self
            .branch_exists(target_group, target_name, &target_branch)
            .await
        {
            info!(project = %node.project, branch = %target_branch, "Using target branch");
            let plain = Candidate {
                group: target_group,
                name: target_name,
                branch: &target_branch,
            };
            return Ok(info(plain, false));
        }

        Err(BuildChainError::NotFound {
            project: node.project.clone(),
            detail: format!(
                "neither {source_group}/{fork_name}:{source_branch}, \
                 {target_group}/{target_name}:{source_branch} nor \
                 {target_group}/{target_name}:{target_branch} exist"
            ),
        })
    }

    /// `Some(merge)` when `candidate` is usable, `None` otherwise.
    async fn accept(
        &self,
        candidate: &Candidate<'_>,
        target: &Candidate<'_>,
        pull_request_flow: bool,
    ) -> Option<bool> {
        if !self
            .branch_exists(candidate.group, candidate.name, candidate.branch)
            .await
        {
            return None;
        }
        if !pull_request_flow {
            return Some(false);
        }
        let head = PullRequestHead {
            owner: candidate.group,
            repo: candidate.name,
            branch: candidate.branch,
        };
        match self
            .client
            .pull_request_exists(target.group, target.name, head, target.branch)
            .await
        {
            Ok(true) => Some(true),
            Ok(false) => None,
            Err(e) => {
                warn!(
                    repo = %format!("{}/{}", target.group, target.name),
                    head = %format!("{}:{}", candidate.group, candidate.branch),
                    error = %e,
                    "Pull request lookup failed; treating as absent"
                );
                None
            }
        }
    }

    async fn branch_exists(&self, owner: &str, repo: &str, branch: &str) -> bool {
        match self.client.branch_exists(owner, repo, branch).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    repo = %format!("{owner}/{repo}"),
                    branch = %branch,
                    error = %e,
                    "Branch lookup failed; treating as absent"
                );
                false
            }
        }
    }

    /// Name of `source_group`'s fork of `target_group/name`.
    ///
    /// Tries the same name under the source group, then the target's fork
    /// list; falls back to `name` when nothing is found.
    pub async fn fork_name(&self, source_group: &str, target_group: &str, name: &str) -> String {
        if source_group == target_group {
            return name.to_string();
        }
        match self.client.get_repo(source_group, name).await {
            Ok(true) => return name.to_string(),
            Ok(false) => {}
            Err(e) => {
                warn!(repo = %format!("{source_group}/{name}"), error = %e, "Repository lookup failed");
            }
        }
        match self.client.list_forks(target_group, name).await {
            Ok(forks) => {
                if let Some(fork) = forks.into_iter().find(|f| f.owner == source_group) {
                    debug!(fork = %fork.full_name(), "Found fork by owner");
                    return fork.name;
                }
            }
            Err(e) => {
                warn!(repo = %format!("{target_group}/{name}"), error = %e, "Fork listing failed");
            }
        }
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeHostingClient;

    fn resolver(client: Arc<FakeHostingClient>) -> BranchResolver {
        BranchResolver::new(
            client,
            ProjectRef::new("alice", "core", "feature-x"),
            ProjectRef::new("org", "core", "main"),
            PathBuf::from("/work"),
        )
    }

    #[tokio::test]
    async fn fork_name_prefers_same_named_repo() {
        let client = Arc::new(FakeHostingClient::new());
        client.add_repo("alice", "core");
        let r = resolver(client);
        assert_eq!(r.fork_name("alice", "org", "core").await, "core");
    }

    #[tokio::test]
    async fn fork_name_found_through_fork_list() {
        let client = Arc::new(FakeHostingClient::new());
        client.add_fork("org", "core", "bob", "core-bob");
        client.add_fork("org", "core", "alice", "my-core");
        let r = resolver(client);
        assert_eq!(r.fork_name("alice", "org", "core").await, "my-core");
    }

    #[tokio::test]
    async fn fork_name_falls_back_to_original() {
        let client = Arc::new(FakeHostingClient::new());
        let r = resolver(client);
        assert_eq!(r.fork_name("alice", "org", "core").await, "core");
    }

    #[tokio::test]
    async fn lookup_errors_count_as_absent() {
        let client = Arc::new(FakeHostingClient::new());
        client.add_branch("org", "core", "main");
        client.fail_branch_lookups_for("alice", "core");
        let r = resolver(client);
        let core = Node::new("org/core");
        let info = r.resolve(&core, &core, true).await.unwrap();
        assert_eq!(info.source_group, "org");
        assert_eq!(info.source_branch, "main");
        assert!(!info.merge);
    }

    #[tokio::test]
    async fn nothing_found_is_not_found_error() {
        let client = Arc::new(FakeHostingClient::new());
        let r = resolver(client);
        let core = Node::new("org/core");
        let err = r.resolve(&core, &core, true).await.unwrap_err();
        assert!(matches!(err, BuildChainError::NotFound { ref project, .. } if project == "org/core"));
    }

    #[tokio::test]
    async fn repo_dir_follows_layout() {
        let client = Arc::new(FakeHostingClient::new());
        client.add_branch("org", "my-lib", "main");
        let r = resolver(client);
        let core = Node::new("org/core");
        let lib = Node::new("org/my-lib");
        let info = r.resolve(&lib, &core, false).await.unwrap();
        assert_eq!(info.repo_dir, PathBuf::from("/work/org_my_lib"));
    }
}
