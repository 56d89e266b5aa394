//! Build command execution across the node chain.

pub mod runner;

pub use runner::{CommandExecutor, CommandOutput, ExecutionPlan, PhaseRunner};
