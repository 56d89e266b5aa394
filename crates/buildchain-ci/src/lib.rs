//! Build Chain CI - command execution for build-chain nodes
//!
//! Provides the shell-backed `CommandExecutor` used by the phase runner:
//! - Runs each command through a configurable shell in the node folder
//! - Captures stdout/stderr and exit status
//! - Optional per-command timeout

pub mod runner;
pub mod shell;

// Re-export key types
pub use runner::{CommandRun, ShellCommandExecutor};
pub use shell::ShellConfig;
