//! Build Chain CLI
//!
//! The `build-chain` command checks out a dependency-ordered chain of
//! repositories for a change and runs their build commands.
//!
//! ## Commands
//!
//! - `build`: Resolve, check out and build the chain for one triggering project
//! - `resume`: Continue a previous run from its saved state file

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use buildchain_ci::{ShellCommandExecutor, ShellConfig};
use buildchain_core::flow::FlowServices;
use buildchain_core::{
    level_for_verbosity, render_summary, resume_flow, run_flow, write_summary_md, FlowKind,
    FlowOptions, FlowResult, GitCli, Node, ProjectRef, ResumeState,
};
use buildchain_hosting::{ProviderConfig, ProviderKind};

#[derive(Parser)]
#[command(name = "build-chain")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check out and build a chain of dependent repositories", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines and print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check out and build the node chain for a triggering project
    Build(BuildArgs),

    /// Resume a previous run from its state file
    Resume(ResumeArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FlowArg {
    CrossPr,
    FullDownstream,
    SinglePr,
    Branch,
}

impl From<FlowArg> for FlowKind {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::CrossPr => FlowKind::CrossPr,
            FlowArg::FullDownstream => FlowKind::FullDownstream,
            FlowArg::SinglePr => FlowKind::SinglePr,
            FlowArg::Branch => FlowKind::Branch,
        }
    }
}

/// Hosting provider connection
#[derive(Args, Clone, Debug)]
struct ProviderArgs {
    /// Hosting provider: github, gitlab or gerrit
    #[arg(long, default_value = "github", env = "BUILD_CHAIN_PROVIDER")]
    provider: String,

    /// REST API root (defaults to the provider's public endpoint)
    #[arg(long, env = "BUILD_CHAIN_API_URL")]
    api_url: Option<String>,

    /// Web root used for clone URLs (defaults to the provider's public host)
    #[arg(long, env = "BUILD_CHAIN_SERVER_URL")]
    server_url: Option<String>,

    /// Access tokens, tried in order when one is throttled
    #[arg(long = "token", env = "BUILD_CHAIN_TOKENS", value_delimiter = ',', hide_env_values = true)]
    tokens: Vec<String>,

    /// Per-command timeout in seconds (0 = none)
    #[arg(long, default_value = "0")]
    timeout: u64,

    /// Write a markdown summary of the run here
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct BuildArgs {
    /// Flow type
    #[arg(short, long, value_enum)]
    flow: FlowArg,

    /// Node chain definition (JSON array of nodes, in dependency order)
    #[arg(short, long)]
    definition: PathBuf,

    /// Project (`group/name`) whose change triggered the build
    #[arg(short, long)]
    project: String,

    /// Branch the change targets
    #[arg(long)]
    target_branch: String,

    /// Group the change comes from (defaults to the target group)
    #[arg(long)]
    source_group: Option<String>,

    /// Branch the change comes from (defaults to the target branch)
    #[arg(long)]
    source_branch: Option<String>,

    /// Folder the repositories are checked out into
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Projects whose checkout is skipped
    #[arg(long, value_delimiter = ',')]
    skip_checkout: Vec<String>,

    /// Projects whose commands are skipped
    #[arg(long, value_delimiter = ',')]
    skip_execution: Vec<String>,

    /// Check repositories out one at a time
    #[arg(long)]
    sequential: bool,

    /// Run this command on every node instead of its build commands
    #[arg(short, long)]
    command: Option<String>,

    /// Commands run in the root folder before checkout
    #[arg(long)]
    pre: Vec<String>,

    /// Commands run once after a successful flow
    #[arg(long)]
    post_success: Vec<String>,

    /// Commands run once after a failed flow
    #[arg(long)]
    post_failure: Vec<String>,

    /// Where the resumable state is written
    #[arg(long)]
    state_file: Option<PathBuf>,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args, Clone, Debug)]
struct ResumeArgs {
    /// State file written by a previous `build`
    #[arg(long)]
    state_file: PathBuf,

    /// Restart execution from this project instead of the last executed one
    #[arg(long)]
    starting_project: Option<String>,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    buildchain_core::init_tracing(cli.json, level_for_verbosity(cli.verbose));

    let (result, provider) = match &cli.command {
        Commands::Build(args) => {
            let services = services(&args.provider)?;
            (cmd_build(&services, args).await?, &args.provider)
        }
        Commands::Resume(args) => {
            let services = services(&args.provider)?;
            (cmd_resume(&services, args).await?, &args.provider)
        }
    };

    report(&result, cli.json, provider.summary.as_deref())?;

    if !result.is_success() {
        anyhow::bail!("build chain failed (run {})", result.run_id);
    }
    Ok(())
}

fn provider_config(args: &ProviderArgs) -> Result<ProviderConfig> {
    let kind: ProviderKind = args.provider.parse()?;
    let config = match (&args.api_url, &args.server_url) {
        (Some(api), Some(server)) => ProviderConfig::with_urls(kind, api, server),
        (None, None) => ProviderConfig::new(kind)?,
        (api, server) => {
            let defaults = ProviderConfig::new(kind)
                .context("both --api-url and --server-url are required for this provider")?;
            ProviderConfig::with_urls(
                kind,
                api.as_deref().unwrap_or(&defaults.api_url),
                server.as_deref().unwrap_or(&defaults.server_url),
            )
        }
    };
    Ok(config.with_tokens(args.tokens.clone()))
}

fn services(args: &ProviderArgs) -> Result<FlowServices> {
    let hosting = buildchain_hosting::connect(&provider_config(args)?)?;
    let shell = ShellCommandExecutor::new(ShellConfig::default().with_timeout(args.timeout));
    Ok(FlowServices::new(hosting, Arc::new(GitCli), Arc::new(shell)))
}

fn read_chain(path: &Path) -> Result<Vec<Node>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read node chain {}", path.display()))?;
    let chain: Vec<Node> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid node chain {}", path.display()))?;
    if chain.is_empty() {
        anyhow::bail!("node chain {} is empty", path.display());
    }
    Ok(chain)
}

fn flow_options(args: &BuildArgs) -> FlowOptions {
    let target = ProjectRef::from_project(&args.project, &args.target_branch);
    let source = ProjectRef::new(
        args.source_group.as_deref().unwrap_or(&target.group),
        &target.name,
        args.source_branch.as_deref().unwrap_or(&args.target_branch),
    );

    let mut options = FlowOptions::new(args.flow.into(), source, target).with_root(&args.root);
    options.parallel_checkout = !args.sequential;
    options.skip_checkout = args.skip_checkout.iter().cloned().collect::<BTreeSet<_>>();
    options.skip_execution = args.skip_execution.iter().cloned().collect::<BTreeSet<_>>();
    options.command = args.command.clone();
    options.pre = args.pre.clone();
    options.post.success = args.post_success.clone();
    options.post.failure = args.post_failure.clone();
    options.state_file = args.state_file.clone();
    options
}

async fn cmd_build(services: &FlowServices, args: &BuildArgs) -> Result<FlowResult> {
    let chain = read_chain(&args.definition)?;
    let options = flow_options(args);
    info!(
        flow = %options.kind,
        project = %args.project,
        nodes = chain.len(),
        "Starting build chain"
    );
    run_flow(services, &chain, &args.project, options)
        .await
        .context("Build chain flow failed")
}

async fn cmd_resume(services: &FlowServices, args: &ResumeArgs) -> Result<FlowResult> {
    let mut state = ResumeState::read(&args.state_file)
        .with_context(|| format!("Failed to load state {}", args.state_file.display()))?;
    if let Some(project) = &args.starting_project {
        state = state.with_starting_project(project);
    }
    info!(state = %args.state_file.display(), "Resuming build chain");
    resume_flow(services, state)
        .await
        .context("Resumed flow failed")
}

fn report(result: &FlowResult, json: bool, summary: Option<&Path>) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", render_summary(result));
    }
    if let Some(path) = summary {
        write_summary_md(path, result)?;
        info!(path = %path.display(), "Wrote summary");
    }
    Ok(())
}
