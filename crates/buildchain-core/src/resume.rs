//! Resumable flow state.
//!
//! The state file is the JSON triple `{configurationService, checkoutService,
//! flowService}`. Field names are part of the on-disk contract: a state
//! written by one process must be readable by the next.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::checkout::CheckoutMap;
use crate::domain::error::{BuildChainError, Result};
use crate::domain::execution::{ExecutionStatus, NodeExecution, Phase, PhaseResults};
use crate::domain::flow::FlowOptions;
use crate::domain::node::Node;

/// What the flow was asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationState {
    pub run_id: Uuid,
    pub node_chain: Vec<Node>,
    pub triggering_project: String,
    pub flow_options: FlowOptions,
    pub created_at: DateTime<Utc>,
}

/// Per-node checkout outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutState {
    pub nodes: CheckoutMap,
}

/// Execution results recorded so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    pub execution_result: PhaseResults,
    /// Index, among participating nodes, of the last node with recorded results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_node_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Serialisable snapshot of a flow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    pub configuration_service: ConfigurationState,
    pub checkout_service: CheckoutState,
    pub flow_service: FlowState,
}

/// In-memory state rebuilt from a [`ResumeState`].
#[derive(Debug, Clone)]
pub struct Restored {
    pub run_id: Uuid,
    pub node_chain: Vec<Node>,
    pub triggering_project: String,
    pub options: FlowOptions,
    pub checkouts: CheckoutMap,
    pub results: PhaseResults,
    /// Index, among participating nodes, execution restarts from.
    pub resume_from: usize,
}

impl ResumeState {
    pub fn snapshot(
        run_id: Uuid,
        node_chain: &[Node],
        triggering_project: &str,
        options: &FlowOptions,
        checkouts: &CheckoutMap,
        results: &PhaseResults,
    ) -> Self {
        let last_node_index = options
            .kind
            .select(node_chain, triggering_project)
            .and_then(|(nodes, _)| last_executed_index(nodes, results));
        Self {
            configuration_service: ConfigurationState {
                run_id,
                node_chain: node_chain.to_vec(),
                triggering_project: triggering_project.to_string(),
                flow_options: options.clone(),
                created_at: Utc::now(),
            },
            checkout_service: CheckoutState {
                nodes: checkouts.clone(),
            },
            flow_service: FlowState {
                execution_result: results.clone(),
                last_node_index,
                updated_at: Some(Utc::now()),
            },
        }
    }

    /// Override the project execution restarts from.
    pub fn with_starting_project(mut self, project: &str) -> Self {
        self.configuration_service.flow_options.starting_project = Some(project.to_string());
        self
    }

    /// Rebuild in-memory state and compute where to resume.
    ///
    /// Recorded checkouts whose folder vanished are marked as not checked out.
    pub fn restore(self) -> Result<Restored> {
        let ResumeState {
            configuration_service: config,
            checkout_service,
            flow_service,
        } = self;

        let (nodes, _) = config
            .flow_options
            .kind
            .select(&config.node_chain, &config.triggering_project)
            .ok_or_else(|| {
                BuildChainError::Serialization(format!(
                    "triggering project {} is not part of the recorded node chain",
                    config.triggering_project
                ))
            })?;

        let results = flow_service.execution_result;
        let resume_from = resume_index(
            nodes,
            &results,
            config.flow_options.starting_project.as_deref(),
        )?;

        let mut checkouts = checkout_service.nodes;
        for checkout in checkouts.values_mut() {
            if checkout.checked_out && !checkout.repo_dir.is_dir() {
                warn!(
                    project = %checkout.project,
                    dir = %checkout.repo_dir.display(),
                    "Recorded checkout folder is missing; it will be checked out again"
                );
                checkout.checked_out = false;
            }
        }

        info!(run_id = %config.run_id, resume_from, "Restored flow state");
        Ok(Restored {
            run_id: config.run_id,
            node_chain: config.node_chain,
            triggering_project: config.triggering_project,
            options: config.flow_options,
            checkouts,
            results,
            resume_from,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BuildChainError::Serialization(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            BuildChainError::Serialization(format!("corrupt state file {}: {e}", path.display()))
        })
    }
}

fn has_results(results: &PhaseResults, project: &str) -> bool {
    results.for_project(project).next().is_some()
}

fn has_executed(bucket: &[NodeExecution], project: &str) -> bool {
    bucket
        .iter()
        .filter(|n| n.project == project)
        .flat_map(|n| n.executions.iter())
        .any(|e| e.result != ExecutionStatus::Skip)
}

/// Last node, scanning from the end, with any non-`SKIP` command result in
/// the latest phase that recorded one.
pub fn last_executed_index(nodes: &[Node], results: &PhaseResults) -> Option<usize> {
    Phase::ALL.iter().rev().find_map(|&phase| {
        let bucket = results.get(phase);
        nodes
            .iter()
            .rposition(|node| has_executed(bucket, &node.project))
    })
}

/// Index execution restarts from.
///
/// Defaults to the last node with executed commands (0 when none ran).
/// `starting_project` overrides it when every node before it has recorded
/// results; an override outside the chain is an error.
pub fn resume_index(
    nodes: &[Node],
    results: &PhaseResults,
    starting_project: Option<&str>,
) -> Result<usize> {
    let computed = last_executed_index(nodes, results).unwrap_or(0);
    let Some(project) = starting_project else {
        return Ok(computed);
    };

    let index = nodes
        .iter()
        .position(|n| n.project == project)
        .ok_or_else(|| {
            BuildChainError::Serialization(format!(
                "starting project {project} is not part of the node chain"
            ))
        })?;

    if nodes[..index]
        .iter()
        .all(|n| has_results(results, &n.project))
    {
        Ok(index)
    } else {
        warn!(
            starting_project = %project,
            resume_from = computed,
            "Earlier nodes have no recorded results; ignoring starting project"
        );
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkout::NodeCheckout;
    use crate::domain::execution::CommandResult;
    use crate::domain::flow::{FlowKind, ProjectRef};

    fn chain() -> Vec<Node> {
        vec![Node::new("org/a"), Node::new("org/b"), Node::new("org/c")]
    }

    fn executed(project: &str, status: ExecutionStatus) -> NodeExecution {
        let now = Utc::now();
        NodeExecution {
            project: project.to_string(),
            executions: vec![CommandResult {
                command: "make".to_string(),
                result: status,
                starting_date: now,
                ending_date: now,
                error_message: None,
            }],
        }
    }

    #[test]
    fn resume_defaults_to_first_node_without_results() {
        assert_eq!(resume_index(&chain(), &PhaseResults::default(), None).unwrap(), 0);
    }

    #[test]
    fn skip_only_results_do_not_count() {
        let mut results = PhaseResults::default();
        results.commands.push(executed("org/a", ExecutionStatus::Ok));
        results.commands.push(executed("org/b", ExecutionStatus::Skip));
        results.commands.push(NodeExecution::skipped("org/c"));
        assert_eq!(resume_index(&chain(), &results, None).unwrap(), 0);
    }

    #[test]
    fn resume_points_at_last_executed_node() {
        let mut results = PhaseResults::default();
        results.commands.push(executed("org/a", ExecutionStatus::Ok));
        results.commands.push(executed("org/b", ExecutionStatus::NotOk));
        assert_eq!(resume_index(&chain(), &results, None).unwrap(), 1);
    }

    #[test]
    fn latest_phase_decides_resume_point() {
        let mut results = PhaseResults::default();
        for project in ["org/a", "org/b", "org/c"] {
            results.before.push(executed(project, ExecutionStatus::Ok));
        }
        results.commands.push(executed("org/a", ExecutionStatus::Ok));
        results.commands.push(executed("org/b", ExecutionStatus::NotOk));
        assert_eq!(resume_index(&chain(), &results, None).unwrap(), 1);
    }

    #[test]
    fn override_requires_results_for_earlier_nodes() {
        let mut results = PhaseResults::default();
        results.commands.push(executed("org/a", ExecutionStatus::Ok));
        assert_eq!(resume_index(&chain(), &results, Some("org/b")).unwrap(), 1);
        assert_eq!(resume_index(&chain(), &results, Some("org/c")).unwrap(), 0);
    }

    #[test]
    fn unknown_override_is_serialization_error() {
        let err = resume_index(&chain(), &PhaseResults::default(), Some("org/zzz")).unwrap_err();
        assert!(matches!(err, BuildChainError::Serialization(_)));
    }

    #[test]
    fn state_uses_stable_top_level_keys() {
        let options = FlowOptions::new(
            FlowKind::FullDownstream,
            ProjectRef::new("alice", "a", "feature"),
            ProjectRef::new("org", "a", "main"),
        );
        let state = ResumeState::snapshot(
            Uuid::new_v4(),
            &chain(),
            "org/a",
            &options,
            &CheckoutMap::new(),
            &PhaseResults::default(),
        );
        let value = serde_json::to_value(&state).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["configurationService", "checkoutService", "flowService"] {
            assert!(obj.contains_key(key), "missing key: {key}");
        }
        assert!(value["configurationService"]["nodeChain"].is_array());
        assert!(value["flowService"]["executionResult"].is_object());
    }

    #[test]
    fn write_read_restore_marks_missing_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("org_a");
        std::fs::create_dir_all(&present).unwrap();

        let mut checkouts = CheckoutMap::new();
        checkouts.insert(
            "org/a".to_string(),
            NodeCheckout::already_present("org/a", present.clone()),
        );
        checkouts.insert(
            "org/b".to_string(),
            NodeCheckout::already_present("org/b", tmp.path().join("org_b")),
        );
        let options = FlowOptions::new(
            FlowKind::FullDownstream,
            ProjectRef::new("alice", "a", "feature"),
            ProjectRef::new("org", "a", "main"),
        );
        let mut results = PhaseResults::default();
        results.commands.push(executed("org/a", ExecutionStatus::Ok));

        let path = tmp.path().join("state/flow.json");
        ResumeState::snapshot(Uuid::new_v4(), &chain(), "org/a", &options, &checkouts, &results)
            .write(&path)
            .unwrap();

        let restored = ResumeState::read(&path).unwrap().restore().unwrap();
        assert!(restored.checkouts["org/a"].checked_out);
        assert!(!restored.checkouts["org/b"].checked_out);
        assert_eq!(restored.resume_from, 0);
        assert_eq!(restored.results, results);
    }

    #[test]
    fn corrupt_state_file_is_serialization_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("flow.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ResumeState::read(&path).unwrap_err(),
            BuildChainError::Serialization(_)
        ));
        assert!(matches!(
            ResumeState::read(&tmp.path().join("missing.json")).unwrap_err(),
            BuildChainError::Serialization(_)
        ));
    }
}
