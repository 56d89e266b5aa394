//! Build Chain Core Library
//!
//! Branch resolution, checkout orchestration and phased build execution
//! over a dependency-ordered chain of repositories.

pub mod checkout;
pub mod domain;
pub mod execution;
pub mod fakes;
pub mod flow;
pub mod git;
pub mod reporting;
pub mod resume;
pub mod telemetry;

pub use domain::{
    split_project, BuildChainError, BuildCommand, CheckoutInfo, CheckoutMap, CommandResult,
    ExecutionLevel, ExecutionStatus, FlowKind, FlowOptions, LevelCommands, LevelMap, Mapping,
    MappingRule, MappingSet, Node, NodeCheckout, NodeExecution, NodePolicy, Phase, PhaseResults,
    PostCommands, ProjectRef, Result,
};

pub use checkout::{
    apply_rules, folder_for, map_branch, target_branch_for, BranchResolver, CheckoutOrchestrator,
    MappedBranch, MappingSide,
};
pub use execution::{CommandExecutor, CommandOutput, ExecutionPlan, PhaseRunner};
pub use flow::{
    resume_flow, run_flow, ArtifactSink, ArtifactUploadResult, FlowResult, FlowServices,
    NoopArtifactSink,
};
pub use git::{is_git_repo, GitCli, GitExecutor};
pub use reporting::{render_summary, write_summary_md};
pub use resume::{resume_index, ResumeState, Restored};
pub use telemetry::{init_tracing, level_for_verbosity};

/// Build Chain version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
