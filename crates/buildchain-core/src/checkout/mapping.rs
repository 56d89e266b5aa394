//! Target-branch mapping between peer projects.
//!
//! Everything here is a pure function of its arguments: the node being
//! checked out, the triggering node and the build's own target branch.

use regex::Regex;
use tracing::{debug, warn};

use crate::domain::node::{Mapping, MappingRule, Node};

/// Outcome of applying one rule set to a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedBranch {
    Mapped(String),
    Unmapped,
}

impl MappedBranch {
    pub fn or_else(self, f: impl FnOnce() -> MappedBranch) -> MappedBranch {
        match self {
            MappedBranch::Unmapped => f(),
            mapped => mapped,
        }
    }

    pub fn unwrap_or(self, fallback: &str) -> String {
        match self {
            MappedBranch::Mapped(branch) => branch,
            MappedBranch::Unmapped => fallback.to_string(),
        }
    }
}

/// Which side of a peer relationship a rule set describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSide {
    /// Rules owned by the triggering node, applied to its dependencies.
    Dependencies,
    /// Rules owned by the node itself, applied when it depends on the trigger.
    Dependant,
}

/// Apply the rules `mapping` declares for `peer_project` to `branch`.
///
/// `Unmapped` when there is no mapping, the peer is excluded, no bucket
/// covers the peer or no rule matches.
pub fn map_branch(
    mapping: Option<&Mapping>,
    side: MappingSide,
    peer_project: &str,
    branch: &str,
) -> MappedBranch {
    let Some(mapping) = mapping else {
        return MappedBranch::Unmapped;
    };
    if mapping.excludes(peer_project) {
        debug!(peer = %peer_project, "Peer excluded from mapping");
        return MappedBranch::Unmapped;
    }
    let set = match side {
        MappingSide::Dependencies => &mapping.dependencies,
        MappingSide::Dependant => &mapping.dependant,
    };
    match set.rules_for(peer_project) {
        Some(rules) => apply_rules(rules, branch),
        None => MappedBranch::Unmapped,
    }
}

/// Match `branch` against `rules`: exact names first, then full-branch regexes.
///
/// The first match wins; further matches of the same kind log a warning.
pub fn apply_rules(rules: &[MappingRule], branch: &str) -> MappedBranch {
    let exact: Vec<&MappingRule> = rules.iter().filter(|r| r.source == branch).collect();
    if let Some(first) = exact.first() {
        if exact.len() > 1 {
            warn!(
                branch = %branch,
                matches = exact.len(),
                target = %first.target,
                "Multiple exact mapping rules match; using the first"
            );
        }
        return MappedBranch::Mapped(first.target.clone());
    }

    let mut matched: Option<String> = None;
    let mut count = 0usize;
    for rule in rules {
        let Some(re) = full_match_regex(&rule.source) else {
            continue;
        };
        if !re.is_match(branch) {
            continue;
        }
        count += 1;
        if matched.is_none() {
            matched = Some(re.replace(branch, rule.target.as_str()).into_owned());
        }
    }
    if count > 1 {
        warn!(
            branch = %branch,
            matches = count,
            "Multiple regex mapping rules match; using the first"
        );
    }
    matched.map_or(MappedBranch::Unmapped, MappedBranch::Mapped)
}

fn full_match_regex(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => Some(re),
        Err(e) => {
            debug!(pattern = %pattern, error = %e, "Mapping source is not a valid regex");
            None
        }
    }
}

/// Branch `node` should be compared against, given the build's target branch.
///
/// The triggering node keeps `target_branch`. Any other node first tries the
/// triggering node's `dependencies` rules, then its own `dependant` rules.
pub fn target_branch_for(node: &Node, triggering: &Node, target_branch: &str) -> String {
    if node.project == triggering.project {
        return target_branch.to_string();
    }
    map_branch(
        triggering.mapping.as_ref(),
        MappingSide::Dependencies,
        &node.project,
        target_branch,
    )
    .or_else(|| {
        map_branch(
            node.mapping.as_ref(),
            MappingSide::Dependant,
            &triggering.project,
            target_branch,
        )
    })
    .unwrap_or(target_branch)
}
