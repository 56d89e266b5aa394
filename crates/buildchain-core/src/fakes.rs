//! In-memory fakes for the capability traits (testing only)
//!
//! Provides `FakeHostingClient`, `FakeGitExecutor` and `FakeCommandExecutor`
//! that satisfy the trait contracts without network, git or a shell.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use buildchain_hosting::{GitHostingClient, HostingError, ProviderKind, PullRequestHead, RepoRef};

use crate::domain::error::{BuildChainError, Result};
use crate::execution::runner::{CommandExecutor, CommandOutput};
use crate::git::GitExecutor;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// FakeHostingClient
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HostingState {
    repos: BTreeSet<(String, String)>,
    branches: BTreeSet<(String, String, String)>,
    forks: BTreeMap<(String, String), Vec<RepoRef>>,
    /// (owner, repo, head owner, head branch, base)
    pulls: BTreeSet<(String, String, String, String, String)>,
    failing: BTreeSet<(String, String)>,
    queries: usize,
}

/// Hosting provider backed by in-memory repository, branch and PR sets.
#[derive(Debug, Default)]
pub struct FakeHostingClient {
    state: Mutex<HostingState>,
}

impl FakeHostingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repo(&self, owner: &str, repo: &str) {
        lock(&self.state)
            .repos
            .insert((owner.to_string(), repo.to_string()));
    }

    /// Add `branch` to `owner/repo`, creating the repository if needed.
    pub fn add_branch(&self, owner: &str, repo: &str, branch: &str) {
        let mut state = lock(&self.state);
        state.repos.insert((owner.to_string(), repo.to_string()));
        state
            .branches
            .insert((owner.to_string(), repo.to_string(), branch.to_string()));
    }

    /// Register `fork_owner/fork_name` as a fork of `owner/repo`.
    pub fn add_fork(&self, owner: &str, repo: &str, fork_owner: &str, fork_name: &str) {
        lock(&self.state)
            .forks
            .entry((owner.to_string(), repo.to_string()))
            .or_default()
            .push(RepoRef::new(fork_owner, fork_name));
    }

    /// Open a pull request from `head_owner:head_branch` into `owner/repo:base`.
    pub fn add_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head_owner: &str,
        head_branch: &str,
        base: &str,
    ) {
        lock(&self.state).pulls.insert((
            owner.to_string(),
            repo.to_string(),
            head_owner.to_string(),
            head_branch.to_string(),
            base.to_string(),
        ));
    }

    /// Make every branch lookup against `owner/repo` fail with an HTTP error.
    pub fn fail_branch_lookups_for(&self, owner: &str, repo: &str) {
        lock(&self.state)
            .failing
            .insert((owner.to_string(), repo.to_string()));
    }

    /// Number of API queries answered so far.
    pub fn queries(&self) -> usize {
        lock(&self.state).queries
    }
}

#[async_trait]
impl GitHostingClient for FakeHostingClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    async fn branch_exists(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> buildchain_hosting::Result<bool> {
        let mut state = lock(&self.state);
        state.queries += 1;
        if state.failing.contains(&(owner.to_string(), repo.to_string())) {
            return Err(HostingError::Http(format!("{owner}/{repo}: connection reset")));
        }
        Ok(state
            .branches
            .contains(&(owner.to_string(), repo.to_string(), branch.to_string())))
    }

    async fn pull_request_exists(
        &self,
        owner: &str,
        repo: &str,
        head: PullRequestHead<'_>,
        base: &str,
    ) -> buildchain_hosting::Result<bool> {
        let mut state = lock(&self.state);
        state.queries += 1;
        Ok(state.pulls.contains(&(
            owner.to_string(),
            repo.to_string(),
            head.owner.to_string(),
            head.branch.to_string(),
            base.to_string(),
        )))
    }

    async fn list_forks(&self, owner: &str, repo: &str) -> buildchain_hosting::Result<Vec<RepoRef>> {
        let mut state = lock(&self.state);
        state.queries += 1;
        Ok(state
            .forks
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> buildchain_hosting::Result<bool> {
        let mut state = lock(&self.state);
        state.queries += 1;
        Ok(state.repos.contains(&(owner.to_string(), repo.to_string())))
    }

    fn clone_url(&self, owner: &str, repo: &str) -> String {
        format!("https://git.example.test/{owner}/{repo}.git")
    }
}

// ---------------------------------------------------------------------------
// FakeGitExecutor
// ---------------------------------------------------------------------------

/// A git operation recorded by [`FakeGitExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Clone { from: String, to: PathBuf, branch: String },
    Merge { dir: PathBuf, remote: String, branch: String },
    Rename { dir: PathBuf, branch: String },
    Push { dir: PathBuf, remote: String, branch: String, force: bool },
    Fetch { dir: PathBuf, remote: String, branch: String },
}

/// Git executor that records calls and materialises clone folders on disk.
///
/// A clone creates the target folder with a `BRANCH` file naming the
/// branch; merges append to a `MERGED` file.
#[derive(Debug, Default)]
pub struct FakeGitExecutor {
    calls: Mutex<Vec<GitCall>>,
    failing_urls: Mutex<Vec<String>>,
}

impl FakeGitExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any clone or merge whose remote URL contains `fragment`.
    pub fn fail_remote(&self, fragment: &str) {
        lock(&self.failing_urls).push(fragment.to_string());
    }

    pub fn calls(&self) -> Vec<GitCall> {
        lock(&self.calls).clone()
    }

    fn check_remote(&self, args: &str, url: &str) -> Result<()> {
        if lock(&self.failing_urls).iter().any(|f| url.contains(f.as_str())) {
            return Err(BuildChainError::GitExecution {
                args: format!("{args} {url}"),
                exit_code: 128,
                output: "fatal: repository not found".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GitExecutor for FakeGitExecutor {
    async fn clone_repo(&self, from: &str, to: &Path, branch: &str) -> Result<()> {
        lock(&self.calls).push(GitCall::Clone {
            from: from.to_string(),
            to: to.to_path_buf(),
            branch: branch.to_string(),
        });
        self.check_remote("clone", from)?;
        std::fs::create_dir_all(to)?;
        std::fs::write(to.join("BRANCH"), branch)?;
        Ok(())
    }

    async fn merge(&self, dir: &Path, remote_url: &str, branch: &str) -> Result<()> {
        lock(&self.calls).push(GitCall::Merge {
            dir: dir.to_path_buf(),
            remote: remote_url.to_string(),
            branch: branch.to_string(),
        });
        self.check_remote("pull", remote_url)?;
        std::fs::write(dir.join("MERGED"), format!("{remote_url} {branch}\n"))?;
        Ok(())
    }

    async fn rename(&self, dir: &Path, new_branch: &str) -> Result<()> {
        lock(&self.calls).push(GitCall::Rename {
            dir: dir.to_path_buf(),
            branch: new_branch.to_string(),
        });
        std::fs::write(dir.join("BRANCH"), new_branch)?;
        Ok(())
    }

    async fn push(&self, dir: &Path, remote_url: &str, branch: &str, force: bool) -> Result<()> {
        lock(&self.calls).push(GitCall::Push {
            dir: dir.to_path_buf(),
            remote: remote_url.to_string(),
            branch: branch.to_string(),
            force,
        });
        Ok(())
    }

    async fn fetch(&self, dir: &Path, remote_url: &str, branch: &str) -> Result<()> {
        lock(&self.calls).push(GitCall::Fetch {
            dir: dir.to_path_buf(),
            remote: remote_url.to_string(),
            branch: branch.to_string(),
        });
        Ok(())
    }

    async fn common_ancestor(&self, _dir: &Path, _a: &str, _b: &str) -> Result<String> {
        Ok("0".repeat(40))
    }

    async fn rev_parse(&self, _dir: &Path, _rev: &str) -> Result<String> {
        Ok("0".repeat(40))
    }
}

// ---------------------------------------------------------------------------
// FakeCommandExecutor
// ---------------------------------------------------------------------------

/// Command executor that records `(cwd, command)` pairs and fails the
/// commands it was told to fail with exit code 1.
#[derive(Debug, Default)]
pub struct FakeCommandExecutor {
    calls: Mutex<Vec<(PathBuf, String)>>,
    failing: Mutex<BTreeSet<(Option<PathBuf>, String)>>,
}

impl FakeCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `command` wherever it runs.
    pub fn fail_on(&self, command: &str) {
        lock(&self.failing).insert((None, command.to_string()));
    }

    /// Fail `command` only when run in `cwd`.
    pub fn fail_in(&self, cwd: &Path, command: &str) {
        lock(&self.failing).insert((Some(cwd.to_path_buf()), command.to_string()));
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        lock(&self.calls).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.calls).iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl CommandExecutor for FakeCommandExecutor {
    async fn execute(&self, cwd: &Path, command: &str) -> Result<CommandOutput> {
        lock(&self.calls).push((cwd.to_path_buf(), command.to_string()));
        let failing = lock(&self.failing);
        let fails = failing.contains(&(None, command.to_string()))
            || failing.contains(&(Some(cwd.to_path_buf()), command.to_string()));
        if fails {
            return Ok(CommandOutput {
                stdout: format!("{command}: failed"),
                exit_code: 1,
            });
        }
        Ok(CommandOutput {
            stdout: String::new(),
            exit_code: 0,
        })
    }
}
