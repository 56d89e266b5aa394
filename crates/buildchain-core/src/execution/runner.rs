//! Phased, fail-fast execution of node build commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info};

use crate::checkout::layout::folder_for;
use crate::domain::checkout::CheckoutMap;
use crate::domain::error::{BuildChainError, Result};
use crate::domain::execution::{CommandResult, ExecutionStatus, NodeExecution, Phase};
use crate::domain::flow::NodePolicy;
use crate::domain::node::{ExecutionLevel, LevelCommands, Node};

/// Captured output of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout/stderr.
    pub stdout: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one shell command in a working directory.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, cwd: &Path, command: &str) -> Result<CommandOutput>;
}

/// Where and how the nodes of one flow execute.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionPlan<'a> {
    /// Participating nodes in chain order.
    pub nodes: &'a [Node],
    /// Index of the triggering node within `nodes`.
    pub triggering_index: usize,
    pub checkouts: &'a CheckoutMap,
    pub policies: &'a BTreeMap<String, NodePolicy>,
    /// Fallback root for nodes without a recorded checkout.
    pub root: &'a Path,
    /// First node to execute; earlier nodes are left out of the results.
    pub start: usize,
}

impl ExecutionPlan<'_> {
    fn working_dir(&self, node: &Node) -> PathBuf {
        self.checkouts
            .get(&node.project)
            .map(|c| c.repo_dir.clone())
            .unwrap_or_else(|| folder_for(self.root, &node.project))
    }

    fn skips_execution(&self, node: &Node) -> bool {
        node.skip
            || self
                .policies
                .get(&node.project)
                .is_some_and(|p| p.skip_execution)
    }
}

/// Executes a phase across the node chain.
///
/// Nodes run strictly one after another. The first failing command stops
/// its node and every later node of the phase.
#[derive(Clone)]
pub struct PhaseRunner {
    executor: Arc<dyn CommandExecutor>,
}

impl PhaseRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run the node-declared commands of `phase`.
    pub async fn run_phase(&self, plan: &ExecutionPlan<'_>, phase: Phase) -> Vec<NodeExecution> {
        info!(phase = %phase, nodes = plan.nodes.len().saturating_sub(plan.start), "Executing phase");
        self.run_with(plan, phase, |node, level| {
            let build = node.build.as_ref()?;
            let commands: Option<&LevelCommands> = match phase {
                Phase::Before => build.before.as_ref(),
                Phase::Commands => Some(&build.current),
                Phase::After => build.after.as_ref(),
            };
            commands.map(|c| c.for_level(level).to_vec())
        })
        .await
    }

    /// Run one ad-hoc `command` in every node instead of its build commands.
    pub async fn run_command(&self, plan: &ExecutionPlan<'_>, command: &str) -> Vec<NodeExecution> {
        info!(command = %command, "Executing command across node chain");
        self.run_with(plan, Phase::Commands, |_, _| Some(vec![command.to_string()]))
            .await
    }

    async fn run_with<F>(&self, plan: &ExecutionPlan<'_>, phase: Phase, commands_for: F) -> Vec<NodeExecution>
    where
        F: Fn(&Node, ExecutionLevel) -> Option<Vec<String>>,
    {
        let mut results = Vec::new();
        for (idx, node) in plan.nodes.iter().enumerate().skip(plan.start) {
            if plan.skips_execution(node) {
                debug!(project = %node.project, phase = %phase, "Execution skipped");
                results.push(NodeExecution::skipped(&node.project));
                continue;
            }

            let level = ExecutionLevel::of(idx, plan.triggering_index);
            let commands = commands_for(node, level).unwrap_or_default();
            let cwd = plan.working_dir(node);
            let execution = self.run_commands(&node.project, &cwd, &commands).await;
            let failed = execution.status() == ExecutionStatus::NotOk;
            results.push(execution);

            if failed {
                error!(
                    project = %node.project,
                    phase = %phase,
                    level = %level,
                    "Command failed; aborting remaining nodes"
                );
                break;
            }
        }
        results
    }

    /// Run `commands` in `cwd`, stopping at the first failure.
    pub async fn run_commands(&self, project: &str, cwd: &Path, commands: &[String]) -> NodeExecution {
        let mut executions = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.run_one(project, cwd, command).await;
            let failed = result.result == ExecutionStatus::NotOk;
            executions.push(result);
            if failed {
                break;
            }
        }
        NodeExecution {
            project: project.to_string(),
            executions,
        }
    }

    async fn run_one(&self, project: &str, cwd: &Path, command: &str) -> CommandResult {
        let starting_date = Utc::now();
        info!(project = %project, command = %command, "Running command");
        let outcome = match self.executor.execute(cwd, command).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(BuildChainError::CommandExecution {
                project: project.to_string(),
                command: command.to_string(),
                message: failure_message(&output),
            }),
            Err(e) => Err(e),
        };
        let ending_date = Utc::now();

        match outcome {
            Ok(()) => CommandResult {
                command: command.to_string(),
                result: ExecutionStatus::Ok,
                starting_date,
                ending_date,
                error_message: None,
            },
            Err(e) => {
                error!(project = %project, command = %command, error = %e, "Command failed");
                CommandResult {
                    command: command.to_string(),
                    result: ExecutionStatus::NotOk,
                    starting_date,
                    ending_date,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}

fn failure_message(output: &CommandOutput) -> String {
    let trimmed = output.stdout.trim();
    if trimmed.is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        format!("exit code {}: {}", output.exit_code, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{BuildCommand, LevelMap};
    use crate::fakes::FakeCommandExecutor;

    fn node(project: &str, commands: &[&str]) -> Node {
        Node::new(project).with_build(BuildCommand::new(LevelCommands::all(commands)))
    }

    fn plan<'a>(
        nodes: &'a [Node],
        checkouts: &'a CheckoutMap,
        policies: &'a BTreeMap<String, NodePolicy>,
        root: &'a Path,
    ) -> ExecutionPlan<'a> {
        ExecutionPlan {
            nodes,
            triggering_index: 0,
            checkouts,
            policies,
            root,
            start: 0,
        }
    }

    #[tokio::test]
    async fn commands_run_in_node_folders_in_order() {
        let exec = Arc::new(FakeCommandExecutor::new());
        let runner = PhaseRunner::new(exec.clone());
        let nodes = vec![node("org/a", &["make", "make test"]), node("org/b", &["make"])];
        let (checkouts, policies) = (CheckoutMap::new(), BTreeMap::new());
        let root = Path::new("/work");

        let results = runner
            .run_phase(&plan(&nodes, &checkouts, &policies, root), Phase::Commands)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status() == ExecutionStatus::Ok));
        assert_eq!(
            exec.calls(),
            vec![
                (PathBuf::from("/work/org_a"), "make".to_string()),
                (PathBuf::from("/work/org_a"), "make test".to_string()),
                (PathBuf::from("/work/org_b"), "make".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn failure_stops_node_and_rest_of_chain() {
        let exec = Arc::new(FakeCommandExecutor::new());
        exec.fail_on("make test");
        let runner = PhaseRunner::new(exec.clone());
        let nodes = vec![
            node("org/a", &["make"]),
            node("org/b", &["make test", "make install"]),
            node("org/c", &["make"]),
        ];
        let (checkouts, policies) = (CheckoutMap::new(), BTreeMap::new());

        let results = runner
            .run_phase(&plan(&nodes, &checkouts, &policies, Path::new("/w")), Phase::Commands)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].executions.len(), 1);
        let failed = &results[1].executions[0];
        assert_eq!(failed.result, ExecutionStatus::NotOk);
        assert!(failed.error_message.as_deref().unwrap().contains("make test: failed"));
        assert_eq!(exec.commands(), vec!["make", "make test"]);
    }

    #[tokio::test]
    async fn skipped_nodes_record_empty_entry() {
        let exec = Arc::new(FakeCommandExecutor::new());
        let runner = PhaseRunner::new(exec.clone());
        let nodes = vec![node("org/a", &["make"]).skipped(), node("org/b", &["make"])];
        let mut policies = BTreeMap::new();
        policies.insert(
            "org/b".to_string(),
            NodePolicy {
                skip_checkout: false,
                skip_execution: true,
            },
        );
        let checkouts = CheckoutMap::new();

        let results = runner
            .run_phase(&plan(&nodes, &checkouts, &policies, Path::new("/w")), Phase::Commands)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.executions.is_empty()));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn level_selects_command_list() {
        let exec = Arc::new(FakeCommandExecutor::new());
        let runner = PhaseRunner::new(exec.clone());
        let by_level = LevelCommands::ByLevel(LevelMap {
            upstream: Some(vec!["install".to_string()]),
            current: Some(vec!["verify".to_string()]),
            downstream: None,
        });
        let nodes: Vec<Node> = ["org/a", "org/b", "org/c"]
            .iter()
            .map(|p| Node::new(p).with_build(BuildCommand::new(by_level.clone())))
            .collect();
        let (checkouts, policies) = (CheckoutMap::new(), BTreeMap::new());
        let mut p = plan(&nodes, &checkouts, &policies, Path::new("/w"));
        p.triggering_index = 1;

        runner.run_phase(&p, Phase::Commands).await;
        assert_eq!(exec.commands(), vec!["install", "verify", "verify"]);
    }

    #[tokio::test]
    async fn before_phase_without_commands_records_nothing_to_run() {
        let exec = Arc::new(FakeCommandExecutor::new());
        let runner = PhaseRunner::new(exec.clone());
        let nodes = vec![node("org/a", &["make"])];
        let (checkouts, policies) = (CheckoutMap::new(), BTreeMap::new());

        let results = runner
            .run_phase(&plan(&nodes, &checkouts, &policies, Path::new("/w")), Phase::Before)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status(), ExecutionStatus::Skip);
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn start_index_leaves_earlier_nodes_out() {
        let exec = Arc::new(FakeCommandExecutor::new());
        let runner = PhaseRunner::new(exec.clone());
        let nodes = vec![node("org/a", &["a"]), node("org/b", &["b"])];
        let (checkouts, policies) = (CheckoutMap::new(), BTreeMap::new());
        let mut p = plan(&nodes, &checkouts, &policies, Path::new("/w"));
        p.start = 1;

        let results = runner.run_command(&p, "echo hi").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].project, "org/b");
        assert_eq!(exec.commands(), vec!["echo hi"]);
    }
}
