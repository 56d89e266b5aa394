//! Command execution results, per node and per phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Ok,
    NotOk,
    Skip,
}

/// Result of a single command in a node's working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command: String,
    pub result: ExecutionStatus,
    pub starting_date: DateTime<Utc>,
    pub ending_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CommandResult {
    pub fn duration_ms(&self) -> i64 {
        (self.ending_date - self.starting_date).num_milliseconds()
    }
}

/// Ordered command results of one node within one phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecution {
    pub project: String,
    pub executions: Vec<CommandResult>,
}

impl NodeExecution {
    /// Entry for a node whose execution was skipped; it carries no commands.
    pub fn skipped(project: &str) -> Self {
        Self {
            project: project.to_string(),
            executions: Vec::new(),
        }
    }

    /// Aggregate status: `NotOk` if any command failed, `Skip` if nothing
    /// but skips (or nothing at all) was recorded, `Ok` otherwise.
    pub fn status(&self) -> ExecutionStatus {
        if self.executions.iter().any(|e| e.result == ExecutionStatus::NotOk) {
            ExecutionStatus::NotOk
        } else if self.executions.iter().all(|e| e.result == ExecutionStatus::Skip) {
            ExecutionStatus::Skip
        } else {
            ExecutionStatus::Ok
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &CommandResult> {
        self.executions
            .iter()
            .filter(|e| e.result == ExecutionStatus::NotOk)
    }
}

/// A phase of build-command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    Commands,
    After,
}

impl Phase {
    /// Phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Before, Phase::Commands, Phase::After];
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Before => "before",
            Phase::Commands => "commands",
            Phase::After => "after",
        };
        f.write_str(s)
    }
}

/// Per-run results bucketed by phase, each in node-chain order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseResults {
    #[serde(default)]
    pub before: Vec<NodeExecution>,
    #[serde(default)]
    pub commands: Vec<NodeExecution>,
    #[serde(default)]
    pub after: Vec<NodeExecution>,
}

impl PhaseResults {
    pub fn get(&self, phase: Phase) -> &[NodeExecution] {
        match phase {
            Phase::Before => &self.before,
            Phase::Commands => &self.commands,
            Phase::After => &self.after,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut Vec<NodeExecution> {
        match phase {
            Phase::Before => &mut self.before,
            Phase::Commands => &mut self.commands,
            Phase::After => &mut self.after,
        }
    }

    /// Every result recorded for `project`, across phases.
    pub fn for_project<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a NodeExecution> {
        Phase::ALL
            .into_iter()
            .flat_map(move |phase| self.get(phase).iter())
            .filter(move |n| n.project == project)
    }

    /// `true` when no command in any phase failed.
    pub fn all_ok(&self) -> bool {
        Phase::ALL
            .into_iter()
            .all(|phase| self.get(phase).iter().all(|n| n.status() != ExecutionStatus::NotOk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(command: &str, status: ExecutionStatus) -> CommandResult {
        let now = Utc::now();
        CommandResult {
            command: command.to_string(),
            result: status,
            starting_date: now,
            ending_date: now,
            error_message: None,
        }
    }

    #[test]
    fn test_execution_status_serde() {
        assert_eq!(serde_json::to_string(&ExecutionStatus::NotOk).unwrap(), "\"NOT_OK\"");
        assert_eq!(serde_json::to_string(&ExecutionStatus::Ok).unwrap(), "\"OK\"");
        assert_eq!(serde_json::to_string(&ExecutionStatus::Skip).unwrap(), "\"SKIP\"");
    }

    #[test]
    fn test_node_status_aggregation() {
        let mut node = NodeExecution::skipped("org/core");
        assert_eq!(node.status(), ExecutionStatus::Skip);

        node.executions.push(result("make", ExecutionStatus::Ok));
        assert_eq!(node.status(), ExecutionStatus::Ok);

        node.executions.push(result("make test", ExecutionStatus::NotOk));
        assert_eq!(node.status(), ExecutionStatus::NotOk);
        assert_eq!(node.failed().count(), 1);
    }

    #[test]
    fn test_phase_results_all_ok() {
        let mut results = PhaseResults::default();
        assert!(results.all_ok());

        results.commands.push(NodeExecution {
            project: "org/core".to_string(),
            executions: vec![result("make", ExecutionStatus::Ok)],
        });
        results.after.push(NodeExecution {
            project: "org/core".to_string(),
            executions: vec![result("cleanup", ExecutionStatus::NotOk)],
        });
        assert!(!results.all_ok());
        assert_eq!(results.for_project("org/core").count(), 2);
    }

    #[test]
    fn test_command_result_uses_camel_case_fields() {
        let value = serde_json::to_value(result("make", ExecutionStatus::Ok)).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["command", "result", "startingDate", "endingDate"] {
            assert!(obj.contains_key(key), "missing key: {key}");
        }
    }
}
