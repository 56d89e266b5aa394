//! Shell execution of node commands.

use crate::shell::ShellConfig;
use async_trait::async_trait;
use buildchain_core::{BuildChainError, CommandExecutor, CommandOutput};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Result of one command execution.
#[derive(Debug, Clone)]
pub struct CommandRun {
    /// Command line as given.
    pub command: String,

    /// Exit code (0 = success, -1 when killed or timed out).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// The timeout elapsed before the command finished.
    pub timed_out: bool,
}

impl CommandRun {
    /// Whether this command passed (exit code 0).
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Runs node commands through a shell.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandExecutor {
    config: ShellConfig,
}

impl ShellCommandExecutor {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Run `command` in `cwd` and capture its output.
    ///
    /// A timeout is reported as a failed run, not as an error.
    pub async fn run(&self, cwd: &Path, command: &str) -> anyhow::Result<CommandRun> {
        let start = Instant::now();

        if command.trim().is_empty() {
            anyhow::bail!("empty command for {}", cwd.display());
        }

        debug!(cwd = %cwd.display(), command = %command, "Spawning shell");
        let child = Command::new(&self.config.program)
            .arg(&self.config.flag)
            .arg(command)
            .current_dir(cwd)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = if self.config.timeout_secs > 0 {
            match tokio::time::timeout(
                std::time::Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(output) => output?,
                Err(_) => {
                    return Ok(CommandRun {
                        command: command.to_string(),
                        exit_code: -1,
                        stdout: String::new(),
                        stderr: format!("timed out after {} seconds", self.config.timeout_secs),
                        duration_ms: start.elapsed().as_millis() as u64,
                        timed_out: true,
                    });
                }
            }
        } else {
            child.wait_with_output().await?
        };

        Ok(CommandRun {
            command: command.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
        })
    }
}

#[async_trait]
impl CommandExecutor for ShellCommandExecutor {
    async fn execute(&self, cwd: &Path, command: &str) -> buildchain_core::Result<CommandOutput> {
        let run = self
            .run(cwd, command)
            .await
            .map_err(|e| BuildChainError::CommandExecution {
                project: cwd.display().to_string(),
                command: command.to_string(),
                message: e.to_string(),
            })?;
        debug!(
            command = %command,
            exit_code = run.exit_code,
            duration_ms = run.duration_ms,
            "Command finished"
        );
        Ok(CommandOutput {
            stdout: run.combined_output(),
            exit_code: run.exit_code,
        })
    }
}
