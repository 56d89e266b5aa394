//! `run_flow` / `resume_flow`: checkout, phased execution, post commands
//! and artifact upload for one triggering event.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use buildchain_hosting::GitHostingClient;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checkout::{BranchResolver, CheckoutOrchestrator};
use crate::domain::checkout::CheckoutMap;
use crate::domain::error::{BuildChainError, Result};
use crate::domain::execution::{ExecutionStatus, NodeExecution, Phase, PhaseResults};
use crate::domain::flow::{FlowOptions, NodePolicy};
use crate::domain::node::Node;
use crate::execution::{CommandExecutor, ExecutionPlan, PhaseRunner};
use crate::git::GitExecutor;
use crate::resume::ResumeState;

/// Outcome of one artifact upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactUploadResult {
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Receives the final checkout and execution state of a flow.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn upload(
        &self,
        checkouts: &CheckoutMap,
        results: &PhaseResults,
    ) -> Vec<ArtifactUploadResult>;
}

/// Sink that uploads nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopArtifactSink;

#[async_trait]
impl ArtifactSink for NoopArtifactSink {
    async fn upload(&self, _: &CheckoutMap, _: &PhaseResults) -> Vec<ArtifactUploadResult> {
        Vec::new()
    }
}

/// Capabilities a flow runs against.
#[derive(Clone)]
pub struct FlowServices {
    pub hosting: Arc<dyn GitHostingClient>,
    pub git: Arc<dyn GitExecutor>,
    pub executor: Arc<dyn CommandExecutor>,
    pub artifacts: Arc<dyn ArtifactSink>,
}

impl FlowServices {
    pub fn new(
        hosting: Arc<dyn GitHostingClient>,
        git: Arc<dyn GitExecutor>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            hosting,
            git,
            executor,
            artifacts: Arc::new(NoopArtifactSink),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactSink>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

/// Everything a flow produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    pub run_id: Uuid,
    pub checkout_info: CheckoutMap,
    pub execution_result: PhaseResults,
    pub artifact_upload_results: Vec<ArtifactUploadResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<NodeExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<NodeExecution>,
}

impl FlowResult {
    /// Pre commands, every node execution, post commands and every upload succeeded.
    pub fn is_success(&self) -> bool {
        let ok = |e: &Option<NodeExecution>| {
            e.as_ref()
                .map_or(true, |n| n.status() != ExecutionStatus::NotOk)
        };
        ok(&self.pre)
            && self.execution_result.all_ok()
            && ok(&self.post)
            && self.artifact_upload_results.iter().all(|a| a.success)
    }
}

const PRE_LABEL: &str = "pre";
const POST_LABEL: &str = "post";

struct FlowRun<'a> {
    services: &'a FlowServices,
    run_id: Uuid,
    chain: &'a [Node],
    triggering_project: &'a str,
    options: &'a FlowOptions,
    nodes: &'a [Node],
    triggering_index: usize,
    root: PathBuf,
    runner: PhaseRunner,
}

impl<'a> FlowRun<'a> {
    fn new(
        services: &'a FlowServices,
        run_id: Uuid,
        chain: &'a [Node],
        triggering_project: &'a str,
        options: &'a FlowOptions,
    ) -> Result<Self> {
        let (nodes, triggering_index) = options
            .kind
            .select(chain, triggering_project)
            .ok_or_else(|| {
                BuildChainError::InvalidFlow(format!(
                    "triggering project {triggering_project} is not part of the node chain"
                ))
            })?;
        let root = options.root();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            services,
            run_id,
            chain,
            triggering_project,
            options,
            nodes,
            triggering_index,
            root,
            runner: PhaseRunner::new(services.executor.clone()),
        })
    }

    fn triggering(&self) -> &Node {
        &self.nodes[self.triggering_index]
    }

    async fn checkout(
        &self,
        policies: &BTreeMap<String, NodePolicy>,
        previous: &CheckoutMap,
    ) -> (CheckoutMap, Option<BuildChainError>) {
        let resolver = Arc::new(BranchResolver::new(
            self.services.hosting.clone(),
            self.options.source.clone(),
            self.options.target.clone(),
            self.root.clone(),
        ));
        let orchestrator = CheckoutOrchestrator::new(
            resolver,
            self.services.git.clone(),
            self.root.clone(),
            self.options.parallel_checkout,
        );
        orchestrator
            .checkout_partial(
                self.nodes,
                self.triggering(),
                self.options.kind,
                policies,
                previous,
            )
            .await
    }

    fn save(&self, checkouts: &CheckoutMap, results: &PhaseResults) -> Result<()> {
        let Some(path) = &self.options.state_file else {
            return Ok(());
        };
        ResumeState::snapshot(
            self.run_id,
            self.chain,
            self.triggering_project,
            self.options,
            checkouts,
            results,
        )
        .write(path)?;
        info!(path = %path.display(), "Flow state written");
        Ok(())
    }

    async fn pre(&self) -> Option<NodeExecution> {
        if self.options.pre.is_empty() {
            return None;
        }
        info!(commands = self.options.pre.len(), "Running pre commands");
        Some(
            self.runner
                .run_commands(PRE_LABEL, &self.root, &self.options.pre)
                .await,
        )
    }

    /// Checkout, then phases from `start`, keeping `previous` results of
    /// nodes before it.
    ///
    /// Results of nodes at or after `start` are dropped from every phase
    /// before any phase runs. The state file is written even when checkout
    /// fails.
    async fn drive(
        &self,
        previous_checkouts: &CheckoutMap,
        previous_results: PhaseResults,
        start: usize,
        pre: Option<NodeExecution>,
    ) -> Result<FlowResult> {
        let policies = NodePolicy::for_chain(self.nodes, self.options);
        let kept = &self.nodes[..start.min(self.nodes.len())];
        let mut results = previous_results;
        for phase in Phase::ALL {
            results
                .get_mut(phase)
                .retain(|e| kept.iter().any(|n| n.project == e.project));
        }

        let (mut checkouts, failure) = self.checkout(&policies, previous_checkouts).await;
        if let Some(err) = failure {
            for (project, checkout) in previous_checkouts {
                checkouts
                    .entry(project.clone())
                    .or_insert_with(|| checkout.clone());
            }
            self.save(&checkouts, &results)?;
            error!(error = %err, "Checkout failed; no phase is run");
            return Err(err);
        }
        self.save(&checkouts, &results)?;

        let plan = ExecutionPlan {
            nodes: self.nodes,
            triggering_index: self.triggering_index,
            checkouts: &checkouts,
            policies: &policies,
            root: &self.root,
            start,
        };

        for phase in Phase::ALL {
            let fresh = match (&self.options.command, phase) {
                (Some(command), Phase::Commands) => self.runner.run_command(&plan, command).await,
                (Some(_), _) => continue,
                (None, phase) => self.runner.run_phase(&plan, phase).await,
            };
            let failed = fresh.iter().any(|n| n.status() == ExecutionStatus::NotOk);

            results.get_mut(phase).extend(fresh);
            self.save(&checkouts, &results)?;

            if failed {
                error!(phase = %phase, "Phase failed; later phases are not run");
                break;
            }
        }

        let post = self.post(pre.as_ref(), &results).await;
        Ok(self.finish(checkouts, results, pre, post).await)
    }

    async fn post(&self, pre: Option<&NodeExecution>, results: &PhaseResults) -> Option<NodeExecution> {
        let pre_ok = pre.map_or(true, |p| p.status() != ExecutionStatus::NotOk);
        let commands = if pre_ok && results.all_ok() {
            &self.options.post.success
        } else {
            &self.options.post.failure
        };
        if commands.is_empty() {
            return None;
        }
        info!(commands = commands.len(), "Running post commands");
        Some(self.runner.run_commands(POST_LABEL, &self.root, commands).await)
    }

    async fn finish(
        &self,
        checkouts: CheckoutMap,
        results: PhaseResults,
        pre: Option<NodeExecution>,
        post: Option<NodeExecution>,
    ) -> FlowResult {
        let artifact_upload_results = self.services.artifacts.upload(&checkouts, &results).await;
        for failed in artifact_upload_results.iter().filter(|a| !a.success) {
            warn!(artifact = %failed.name, message = ?failed.message, "Artifact upload failed");
        }
        let result = FlowResult {
            run_id: self.run_id,
            checkout_info: checkouts,
            execution_result: results,
            artifact_upload_results,
            pre,
            post,
        };
        info!(run_id = %self.run_id, success = result.is_success(), "Flow finished");
        result
    }
}

/// Run a flow over `chain` for an event on `triggering_project`.
///
/// Checkout and state-file errors are returned as `Err`; command failures
/// are recorded in the result (see [`FlowResult::is_success`]).
pub async fn run_flow(
    services: &FlowServices,
    chain: &[Node],
    triggering_project: &str,
    options: FlowOptions,
) -> Result<FlowResult> {
    let run = FlowRun::new(services, Uuid::new_v4(), chain, triggering_project, &options)?;
    info!(
        run_id = %run.run_id,
        flow = %options.kind,
        triggering = %triggering_project,
        nodes = run.nodes.len(),
        "Starting flow"
    );

    let pre = run.pre().await;
    if pre
        .as_ref()
        .is_some_and(|p| p.status() == ExecutionStatus::NotOk)
    {
        error!("Pre commands failed; skipping checkout and execution");
        let results = PhaseResults::default();
        let post = run.post(pre.as_ref(), &results).await;
        return Ok(run.finish(CheckoutMap::new(), results, pre, post).await);
    }

    run.drive(&CheckoutMap::new(), PhaseResults::default(), 0, pre)
        .await
}

/// Continue a flow from its saved state.
///
/// Nodes still checked out are not touched again; execution restarts at the
/// resume index and earlier results are kept. Pre commands are not re-run.
pub async fn resume_flow(services: &FlowServices, state: ResumeState) -> Result<FlowResult> {
    let restored = state.restore()?;
    let run = FlowRun::new(
        services,
        restored.run_id,
        &restored.node_chain,
        &restored.triggering_project,
        &restored.options,
    )?;
    let start = restored.resume_from;
    info!(
        run_id = %run.run_id,
        resume_from = %run.nodes.get(start).map(|n| n.project.as_str()).unwrap_or("-"),
        "Resuming flow"
    );
    run.drive(&restored.checkouts, restored.results, start, None)
        .await
}
