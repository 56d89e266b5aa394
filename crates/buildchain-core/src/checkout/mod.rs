//! Branch resolution and checkout of the node chain.
//!
//! Provides:
//! - [`mapping::target_branch_for`]: target-branch mapping between peer projects
//! - [`resolver::BranchResolver`]: fork/branch/pull-request fallback resolution
//! - [`orchestrator::CheckoutOrchestrator`]: parallel or sequential checkout
//! - [`layout`]: checkout folder naming and tree replication

pub mod layout;
pub mod mapping;
pub mod orchestrator;
pub mod resolver;

pub use layout::{copy_dir, folder_for};
pub use mapping::{apply_rules, map_branch, target_branch_for, MappedBranch, MappingSide};
pub use orchestrator::CheckoutOrchestrator;
pub use resolver::BranchResolver;
