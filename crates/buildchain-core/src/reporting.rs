use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::checkout::NodeCheckout;
use crate::domain::execution::{ExecutionStatus, NodeExecution, Phase};
use crate::flow::FlowResult;

fn checkout_line(checkout: &NodeCheckout) -> String {
    let what = match (&checkout.checkout_info, checkout.skipped) {
        (Some(info), skipped) => {
            let target = format!("{}:{}", info.target_project(), info.target_branch);
            let source = format!("{}:{}", info.source_project(), info.source_branch);
            let resolved = if info.merge {
                format!("{source} merged into {target}")
            } else {
                source
            };
            if skipped {
                format!("skipped (would use {resolved})")
            } else {
                resolved
            }
        }
        (None, true) => "skipped".to_string(),
        (None, false) => "already present".to_string(),
    };
    format!("- `{}`: {}\n", checkout.project, what)
}

fn counts(nodes: &[NodeExecution]) -> (usize, usize, usize) {
    nodes.iter().fold((0, 0, 0), |(ok, failed, skipped), n| match n.status() {
        ExecutionStatus::Ok => (ok + 1, failed, skipped),
        ExecutionStatus::NotOk => (ok, failed + 1, skipped),
        ExecutionStatus::Skip => (ok, failed, skipped + 1),
    })
}

fn failure_lines(out: &mut String, label: &str, node: &NodeExecution) {
    for failed in node.failed() {
        out.push_str(&format!(
            "- [{}] `{}` `{}`: {}\n",
            label,
            node.project,
            failed.command,
            failed.error_message.as_deref().unwrap_or("failed")
        ));
    }
}

/// Render the markdown summary printed at the end of a flow.
pub fn render_summary(result: &FlowResult) -> String {
    let mut out = String::new();
    out.push_str("# Build Chain Summary\n\n");

    out.push_str("## Checkout\n");
    if result.checkout_info.is_empty() {
        out.push_str("- nothing checked out\n");
    }
    for checkout in result.checkout_info.values() {
        out.push_str(&checkout_line(checkout));
    }
    out.push('\n');

    out.push_str("## Execution\n");
    for phase in Phase::ALL {
        let (ok, failed, skipped) = counts(result.execution_result.get(phase));
        out.push_str(&format!(
            "- {phase}: {ok} ok, {failed} failed, {skipped} skipped\n"
        ));
    }
    out.push('\n');

    let mut failures = String::new();
    if let Some(pre) = &result.pre {
        failure_lines(&mut failures, "pre", pre);
    }
    for phase in Phase::ALL {
        for node in result.execution_result.get(phase) {
            failure_lines(&mut failures, &phase.to_string(), node);
        }
    }
    if let Some(post) = &result.post {
        failure_lines(&mut failures, "post", post);
    }
    for upload in result.artifact_upload_results.iter().filter(|a| !a.success) {
        failures.push_str(&format!(
            "- [artifact] `{}`: {}\n",
            upload.name,
            upload.message.as_deref().unwrap_or("upload failed")
        ));
    }
    if !failures.is_empty() {
        out.push_str("## Failures\n");
        out.push_str(&failures);
        out.push('\n');
    }

    let status = if result.is_success() { "SUCCESS" } else { "FAILURE" };
    out.push_str(&format!("## Result: {status}\n"));
    out
}

/// Write the summary as markdown.
pub fn write_summary_md(path: &Path, result: &FlowResult) -> Result<()> {
    let md = render_summary(result);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkout::{CheckoutInfo, CheckoutMap};
    use crate::domain::execution::{CommandResult, PhaseResults};
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("parse RFC3339")
            .with_timezone(&Utc)
    }

    #[test]
    fn summary_markdown_render_is_stable() {
        let mut checkouts = CheckoutMap::new();
        checkouts.insert(
            "org/core".to_string(),
            NodeCheckout {
                project: "org/core".to_string(),
                repo_dir: PathBuf::from("/w/org_core"),
                checkout_info: Some(CheckoutInfo {
                    source_group: "alice".to_string(),
                    source_name: "core".to_string(),
                    source_branch: "feature-x".to_string(),
                    target_group: "org".to_string(),
                    target_name: "core".to_string(),
                    target_branch: "main".to_string(),
                    merge: true,
                    repo_dir: PathBuf::from("/w/org_core"),
                }),
                checked_out: true,
                skipped: false,
            },
        );
        checkouts.insert(
            "org/ui".to_string(),
            NodeCheckout::already_present("org/ui", PathBuf::from("/w/org_ui")),
        );

        let mut results = PhaseResults::default();
        results.commands.push(NodeExecution {
            project: "org/core".to_string(),
            executions: vec![CommandResult {
                command: "make test".to_string(),
                result: ExecutionStatus::NotOk,
                starting_date: at("2026-01-01T00:00:00Z"),
                ending_date: at("2026-01-01T00:00:05Z"),
                error_message: Some("exit code 2".to_string()),
            }],
        });

        let result = FlowResult {
            run_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("valid UUID"),
            checkout_info: checkouts,
            execution_result: results,
            artifact_upload_results: Vec::new(),
            pre: None,
            post: None,
        };

        let expected = "# Build Chain Summary\n\n## Checkout\n- `org/core`: alice/core:feature-x merged into org/core:main\n- `org/ui`: already present\n\n## Execution\n- before: 0 ok, 0 failed, 0 skipped\n- commands: 0 ok, 1 failed, 0 skipped\n- after: 0 ok, 0 failed, 0 skipped\n\n## Failures\n- [commands] `org/core` `make test`: exit code 2\n\n## Result: FAILURE\n";
        assert_eq!(render_summary(&result), expected);
    }

    #[test]
    fn write_summary_md_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("summary.md");
        let result = FlowResult {
            run_id: Uuid::new_v4(),
            checkout_info: CheckoutMap::new(),
            execution_result: PhaseResults::default(),
            artifact_upload_results: Vec::new(),
            pre: None,
            post: None,
        };
        write_summary_md(&path, &result).unwrap();
        let md = std::fs::read_to_string(&path).unwrap();
        assert!(md.contains("nothing checked out"));
        assert!(md.ends_with("## Result: SUCCESS\n"));
    }
}
