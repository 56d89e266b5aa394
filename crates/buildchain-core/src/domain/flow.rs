//! Flow options and per-node policy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::domain::node::{split_project, Node};

/// Which slice of the node chain a flow touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Upstream nodes plus the triggering node, pull-request resolution.
    CrossPr,
    /// Whole chain, pull-request resolution.
    FullDownstream,
    /// Triggering node only, pull-request resolution.
    SinglePr,
    /// Upstream nodes plus the triggering node, plain branch resolution.
    Branch,
}

impl FlowKind {
    pub fn is_pull_request_flow(&self) -> bool {
        !matches!(self, FlowKind::Branch)
    }

    /// Node indices taking part, given the chain length and triggering index.
    pub fn participants(&self, len: usize, triggering_index: usize) -> RangeInclusive<usize> {
        match self {
            FlowKind::CrossPr | FlowKind::Branch => 0..=triggering_index,
            FlowKind::FullDownstream => 0..=len.saturating_sub(1),
            FlowKind::SinglePr => triggering_index..=triggering_index,
        }
    }

    /// Participating slice of `chain` and the triggering node's index within it.
    ///
    /// `None` when `triggering_project` is not part of the chain.
    pub fn select<'a>(&self, chain: &'a [Node], triggering_project: &str) -> Option<(&'a [Node], usize)> {
        let k = chain.iter().position(|n| n.project == triggering_project)?;
        let range = self.participants(chain.len(), k);
        let start = *range.start();
        Some((&chain[range], k - start))
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FlowKind::CrossPr => "cross_pr",
            FlowKind::FullDownstream => "full_downstream",
            FlowKind::SinglePr => "single_pr",
            FlowKind::Branch => "branch",
        };
        f.write_str(s)
    }
}

/// A branch of a project: the source or target side of the triggering event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub group: String,
    pub name: String,
    pub branch: String,
}

impl ProjectRef {
    pub fn new(group: &str, name: &str, branch: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
        }
    }

    /// Parse `group/name` plus a branch.
    pub fn from_project(project: &str, branch: &str) -> Self {
        let (group, name) = split_project(project);
        Self::new(group, name, branch)
    }

    pub fn project(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }
}

/// Commands run once after all phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCommands {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failure: Vec<String>,
}

/// Everything a flow run needs besides the node chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOptions {
    pub kind: FlowKind,
    /// Folder the checkouts live under; the current directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,
    /// Fork owner and branch the change comes from.
    pub source: ProjectRef,
    /// Project and branch the change targets.
    pub target: ProjectRef,
    #[serde(default)]
    pub skip_checkout: BTreeSet<String>,
    #[serde(default)]
    pub skip_execution: BTreeSet<String>,
    #[serde(default = "default_parallel")]
    pub parallel_checkout: bool,
    /// Ad-hoc command replacing every node's build commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub pre: Vec<String>,
    #[serde(default)]
    pub post: PostCommands,
    /// Where the resumable state is written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
    /// Resume override: project to restart execution from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_project: Option<String>,
}

fn default_parallel() -> bool {
    true
}

impl FlowOptions {
    pub fn new(kind: FlowKind, source: ProjectRef, target: ProjectRef) -> Self {
        Self {
            kind,
            root_folder: None,
            source,
            target,
            skip_checkout: BTreeSet::new(),
            skip_execution: BTreeSet::new(),
            parallel_checkout: true,
            command: None,
            pre: Vec::new(),
            post: PostCommands::default(),
            state_file: None,
            starting_project: None,
        }
    }

    /// Root folder for checkouts (current directory when unset).
    pub fn root(&self) -> PathBuf {
        self.root_folder.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_folder = Some(root.into());
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel_checkout = false;
        self
    }
}

/// Skip decisions for one node, fixed before orchestration starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePolicy {
    pub skip_checkout: bool,
    pub skip_execution: bool,
}

impl NodePolicy {
    /// Compute the policy of every node in `chain` from `options` and `Node::skip`.
    pub fn for_chain(chain: &[Node], options: &FlowOptions) -> BTreeMap<String, NodePolicy> {
        chain
            .iter()
            .map(|node| {
                let policy = NodePolicy {
                    skip_checkout: options.skip_checkout.contains(&node.project),
                    skip_execution: node.skip || options.skip_execution.contains(&node.project),
                };
                (node.project.clone(), policy)
            })
            .collect()
    }
}
