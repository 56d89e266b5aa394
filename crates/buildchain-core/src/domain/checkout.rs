//! Checkout decisions and per-node checkout state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Resolved (group, project, branch, merge) decision for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutInfo {
    pub source_group: String,
    pub source_name: String,
    pub source_branch: String,
    pub target_group: String,
    pub target_name: String,
    pub target_branch: String,
    /// Clone the target side and merge the source side into it.
    pub merge: bool,
    /// Working directory of the checkout.
    pub repo_dir: PathBuf,
}

impl CheckoutInfo {
    pub fn source_project(&self) -> String {
        format!("{}/{}", self.source_group, self.source_name)
    }

    pub fn target_project(&self) -> String {
        format!("{}/{}", self.target_group, self.target_name)
    }
}

/// Checkout outcome of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCheckout {
    pub project: String,
    pub repo_dir: PathBuf,
    /// `None` when the directory was already on disk and nothing was resolved.
    pub checkout_info: Option<CheckoutInfo>,
    /// The working directory is populated.
    pub checked_out: bool,
    /// Checkout was skipped by policy.
    #[serde(default)]
    pub skipped: bool,
}

impl NodeCheckout {
    pub fn already_present(project: &str, repo_dir: PathBuf) -> Self {
        Self {
            project: project.to_string(),
            repo_dir,
            checkout_info: None,
            checked_out: true,
            skipped: false,
        }
    }
}

/// Checkout state of every node, keyed by project.
pub type CheckoutMap = BTreeMap<String, NodeCheckout>;
