//! Checkout of a whole node chain, in parallel or in chain order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::checkout::layout::{copy_dir, folder_for};
use crate::checkout::resolver::BranchResolver;
use crate::domain::checkout::{CheckoutInfo, CheckoutMap, NodeCheckout};
use crate::domain::error::{BuildChainError, Result};
use crate::domain::flow::{FlowKind, NodePolicy};
use crate::domain::node::Node;
use crate::git::GitExecutor;

/// Drives the [`BranchResolver`] and a [`GitExecutor`] over a node chain.
///
/// Both modes yield the same [`CheckoutMap`] and folder layout. Parallel
/// mode lets every started node finish before reporting the first error in
/// chain order; sequential mode stops at the first error.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    resolver: Arc<BranchResolver>,
    git: Arc<dyn GitExecutor>,
    root: PathBuf,
    parallel: bool,
}

impl CheckoutOrchestrator {
    pub fn new(
        resolver: Arc<BranchResolver>,
        git: Arc<dyn GitExecutor>,
        root: PathBuf,
        parallel: bool,
    ) -> Self {
        Self {
            resolver,
            git,
            root,
            parallel,
        }
    }

    /// Check out every node of `chain`.
    ///
    /// Nodes recorded in `previous` as checked out, or whose folder already
    /// exists, are left untouched.
    pub async fn checkout_all(
        &self,
        chain: &[Node],
        triggering: &Node,
        kind: FlowKind,
        policies: &BTreeMap<String, NodePolicy>,
        previous: &CheckoutMap,
    ) -> Result<CheckoutMap> {
        match self
            .checkout_partial(chain, triggering, kind, policies, previous)
            .await
        {
            (checkouts, None) => Ok(checkouts),
            (_, Some(err)) => Err(err),
        }
    }

    /// Like [`checkout_all`](Self::checkout_all), but hands back the nodes
    /// that did check out together with the first error in chain order.
    pub async fn checkout_partial(
        &self,
        chain: &[Node],
        triggering: &Node,
        kind: FlowKind,
        policies: &BTreeMap<String, NodePolicy>,
        previous: &CheckoutMap,
    ) -> (CheckoutMap, Option<BuildChainError>) {
        info!(
            nodes = chain.len(),
            flow = %kind,
            parallel = self.parallel,
            "Checking out node chain"
        );
        let pull_request_flow = kind.is_pull_request_flow();
        let mut checkouts = CheckoutMap::new();

        if !self.parallel {
            for node in chain {
                let policy = policies.get(&node.project).copied().unwrap_or_default();
                let prior = previous.get(&node.project).cloned();
                match self
                    .checkout_node(node, triggering, pull_request_flow, policy, prior)
                    .await
                {
                    Ok(checkout) => {
                        checkouts.insert(node.project.clone(), checkout);
                    }
                    Err(err) => return (checkouts, Some(err)),
                }
            }
            return (checkouts, None);
        }

        let mut set = JoinSet::new();
        for (idx, node) in chain.iter().enumerate() {
            let this = self.clone();
            let node = node.clone();
            let triggering = triggering.clone();
            let policy = policies.get(&node.project).copied().unwrap_or_default();
            let prior = previous.get(&node.project).cloned();
            set.spawn(async move {
                let result = this
                    .checkout_node(&node, &triggering, pull_request_flow, policy, prior)
                    .await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<NodeCheckout>>> = (0..chain.len()).map(|_| None).collect();
        let mut join_failure = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(err) => {
                    join_failure.get_or_insert(BuildChainError::from(err));
                }
            }
        }

        let mut first_error = None;
        for (node, slot) in chain.iter().zip(slots) {
            match slot {
                Some(Ok(checkout)) => {
                    checkouts.insert(node.project.clone(), checkout);
                }
                Some(Err(err)) => {
                    warn!(project = %node.project, error = %err, "Checkout failed");
                    first_error.get_or_insert(err);
                }
                None => {}
            }
        }
        (checkouts, first_error.or(join_failure))
    }

    async fn checkout_node(
        &self,
        node: &Node,
        triggering: &Node,
        pull_request_flow: bool,
        policy: NodePolicy,
        prior: Option<NodeCheckout>,
    ) -> Result<NodeCheckout> {
        let repo_dir = folder_for(&self.root, &node.project);

        if let Some(prior) = prior.filter(|p| p.checked_out && p.repo_dir.is_dir()) {
            debug!(project = %node.project, "Checkout recorded by previous run");
            return Ok(prior);
        }

        if policy.skip_checkout {
            let checkout_info = match self
                .resolver
                .resolve(node, triggering, pull_request_flow)
                .await
            {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(project = %node.project, error = %e, "Could not resolve skipped node");
                    None
                }
            };
            let checked_out = repo_dir.is_dir();
            if checked_out {
                self.replicate(node, &repo_dir).await?;
            }
            info!(project = %node.project, "Checkout skipped");
            return Ok(NodeCheckout {
                project: node.project.clone(),
                repo_dir,
                checkout_info,
                checked_out,
                skipped: true,
            });
        }

        if repo_dir.is_dir() {
            info!(project = %node.project, dir = %repo_dir.display(), "Folder already present");
            self.replicate(node, &repo_dir).await?;
            return Ok(NodeCheckout::already_present(&node.project, repo_dir));
        }

        let checkout_info = self
            .resolver
            .resolve(node, triggering, pull_request_flow)
            .await?;
        self.clone_and_merge(&checkout_info).await?;
        self.replicate(node, &repo_dir).await?;

        Ok(NodeCheckout {
            project: node.project.clone(),
            repo_dir,
            checkout_info: Some(checkout_info),
            checked_out: true,
            skipped: false,
        })
    }

    async fn clone_and_merge(&self, info: &CheckoutInfo) -> Result<()> {
        let client = self.resolver.client();
        if info.merge {
            let target_url = client.clone_url(&info.target_group, &info.target_name);
            let source_url = client.clone_url(&info.source_group, &info.source_name);
            info!(
                target = %format!("{}:{}", info.target_project(), info.target_branch),
                source = %format!("{}:{}", info.source_project(), info.source_branch),
                "Cloning target and merging source"
            );
            self.git
                .clone_repo(&target_url, &info.repo_dir, &info.target_branch)
                .await?;
            self.git
                .merge(&info.repo_dir, &source_url, &info.source_branch)
                .await?;
            self.git.rename(&info.repo_dir, &info.source_branch).await?;
        } else {
            let source_url = client.clone_url(&info.source_group, &info.source_name);
            info!(
                source = %format!("{}:{}", info.source_project(), info.source_branch),
                "Cloning"
            );
            self.git
                .clone_repo(&source_url, &info.repo_dir, &info.source_branch)
                .await?;
        }
        Ok(())
    }

    /// Copy `repo_dir` into each of the node's extra clone folders that do
    /// not exist yet.
    ///
    /// The tree copy runs on the blocking pool.
    async fn replicate(&self, node: &Node, repo_dir: &Path) -> Result<()> {
        for name in &node.clone {
            let dst = self.root.join(name);
            if dst.exists() {
                debug!(project = %node.project, target = %dst.display(), "Clone target exists");
                continue;
            }
            info!(project = %node.project, target = %dst.display(), "Replicating checkout");
            let src = repo_dir.to_path_buf();
            tokio::task::spawn_blocking(move || copy_dir(&src, &dst)).await??;
        }
        Ok(())
    }
}
