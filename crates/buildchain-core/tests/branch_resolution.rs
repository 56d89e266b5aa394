//! Integration tests for branch resolution priority and fork discovery.

use std::path::PathBuf;
use std::sync::Arc;

use buildchain_core::fakes::FakeHostingClient;
use buildchain_core::{
    BranchResolver, BuildChainError, CheckoutInfo, Mapping, MappingRule, MappingSet, Node,
    ProjectRef,
};

fn resolver(client: Arc<FakeHostingClient>) -> BranchResolver {
    BranchResolver::new(
        client,
        ProjectRef::new("alice", "core", "feature-x"),
        ProjectRef::new("org", "core", "main"),
        PathBuf::from("/work"),
    )
}

#[derive(Debug, Clone, Copy)]
struct Combo {
    fork_has_source: bool,
    target_has_source: bool,
    target_has_target: bool,
    pull_requests: bool,
}

fn all_combos() -> Vec<Combo> {
    let mut combos = Vec::new();
    for bits in 0..16u8 {
        combos.push(Combo {
            fork_has_source: bits & 1 != 0,
            target_has_source: bits & 2 != 0,
            target_has_target: bits & 4 != 0,
            pull_requests: bits & 8 != 0,
        });
    }
    combos
}

fn client_for(combo: Combo) -> Arc<FakeHostingClient> {
    let client = Arc::new(FakeHostingClient::new());
    client.add_repo("org", "core");
    if combo.fork_has_source {
        client.add_branch("alice", "core", "feature-x");
    }
    if combo.target_has_source {
        client.add_branch("org", "core", "feature-x");
    }
    if combo.target_has_target {
        client.add_branch("org", "core", "main");
    }
    if combo.pull_requests {
        client.add_pull_request("org", "core", "alice", "feature-x", "main");
        client.add_pull_request("org", "core", "org", "feature-x", "main");
    }
    client
}

/// (source group, source branch, merge) the resolver must pick, or `None`.
fn expected(combo: Combo, pull_request_flow: bool) -> Option<(&'static str, &'static str, bool)> {
    let pr_ok = !pull_request_flow || combo.pull_requests;
    let merge = pull_request_flow && combo.pull_requests;
    if combo.fork_has_source && pr_ok {
        return Some(("alice", "feature-x", merge));
    }
    if combo.target_has_source && pr_ok {
        return Some(("org", "feature-x", merge));
    }
    if combo.target_has_target {
        return Some(("org", "main", false));
    }
    None
}

async fn check_grid(pull_request_flow: bool) {
    let core = Node::new("org/core");
    for combo in all_combos() {
        let r = resolver(client_for(combo));
        let actual = r.resolve(&core, &core, pull_request_flow).await;
        match (expected(combo, pull_request_flow), actual) {
            (Some((group, branch, merge)), Ok(info)) => {
                assert_eq!(info.source_group, group, "{combo:?}");
                assert_eq!(info.source_branch, branch, "{combo:?}");
                assert_eq!(info.merge, merge, "{combo:?}");
                assert_eq!(info.target_group, "org", "{combo:?}");
                assert_eq!(info.target_branch, "main", "{combo:?}");
            }
            (None, Err(BuildChainError::NotFound { project, .. })) => {
                assert_eq!(project, "org/core");
            }
            (want, got) => panic!("{combo:?}: expected {want:?}, got {got:?}"),
        }
    }
}

#[tokio::test]
async fn resolution_priority_pull_request_flow() {
    check_grid(true).await;
}

#[tokio::test]
async fn resolution_priority_branch_flow() {
    check_grid(false).await;
}

#[tokio::test]
async fn fork_with_open_pull_request_resolves_to_merge() {
    let client = Arc::new(FakeHostingClient::new());
    client.add_branch("alice", "core", "feature-x");
    client.add_branch("org", "core", "main");
    client.add_pull_request("org", "core", "alice", "feature-x", "main");

    let core = Node::new("org/core");
    let info = resolver(client).resolve(&core, &core, true).await.unwrap();
    assert_eq!(
        info,
        CheckoutInfo {
            source_group: "alice".to_string(),
            source_name: "core".to_string(),
            source_branch: "feature-x".to_string(),
            target_group: "org".to_string(),
            target_name: "core".to_string(),
            target_branch: "main".to_string(),
            merge: true,
            repo_dir: PathBuf::from("/work/org_core"),
        }
    );
}

#[tokio::test]
async fn renamed_fork_is_found_through_fork_list() {
    let client = Arc::new(FakeHostingClient::new());
    client.add_fork("org", "core", "alice", "core-fork");
    client.add_branch("alice", "core-fork", "feature-x");
    client.add_branch("org", "core", "main");
    client.add_pull_request("org", "core", "alice", "feature-x", "main");

    let core = Node::new("org/core");
    let info = resolver(client).resolve(&core, &core, true).await.unwrap();
    assert_eq!(info.source_name, "core-fork");
    assert!(info.merge);
}

#[tokio::test]
async fn dependant_mapping_changes_target_branch() {
    let client = Arc::new(FakeHostingClient::new());
    client.add_branch("org", "ui", "release");

    let core = Node::new("org/core");
    let ui = Node::new("org/ui").with_mapping(Mapping {
        dependant: MappingSet::with_default(vec![MappingRule::new("main", "release")]),
        ..Mapping::default()
    });

    let info = resolver(client).resolve(&ui, &core, true).await.unwrap();
    assert_eq!(info.target_branch, "release");
    assert_eq!(info.source_branch, "release");
    assert!(!info.merge);
}

#[tokio::test]
async fn pull_request_into_mapped_branch_is_required() {
    let client = Arc::new(FakeHostingClient::new());
    client.add_branch("alice", "ui", "feature-x");
    client.add_branch("org", "ui", "release");
    client.add_pull_request("org", "ui", "alice", "feature-x", "release");

    let core = Node::new("org/core");
    let ui = Node::new("org/ui").with_mapping(Mapping {
        dependant: MappingSet::with_default(vec![MappingRule::new("main", "release")]),
        ..Mapping::default()
    });

    let info = resolver(client).resolve(&ui, &core, true).await.unwrap();
    assert_eq!(info.source_group, "alice");
    assert_eq!(info.target_branch, "release");
    assert!(info.merge);
}
