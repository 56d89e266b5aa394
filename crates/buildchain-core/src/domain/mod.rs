//! Domain models for build-chain.
//!
//! Canonical definitions for the core entities:
//! - `Node`: one repository of the chain, with mapping and build commands
//! - `CheckoutInfo` / `NodeCheckout`: what was checked out, and where
//! - `NodeExecution` / `PhaseResults`: command outcomes per node and phase
//! - `FlowOptions` / `NodePolicy`: how a run is configured

pub mod checkout;
pub mod error;
pub mod execution;
pub mod flow;
pub mod node;

// Re-export main types and errors
pub use checkout::{CheckoutInfo, CheckoutMap, NodeCheckout};
pub use error::{BuildChainError, Result};
pub use execution::{CommandResult, ExecutionStatus, NodeExecution, Phase, PhaseResults};
pub use flow::{FlowKind, FlowOptions, NodePolicy, PostCommands, ProjectRef};
pub use node::{
    split_project, BuildCommand, ExecutionLevel, LevelCommands, LevelMap, Mapping, MappingRule,
    MappingSet, Node,
};
