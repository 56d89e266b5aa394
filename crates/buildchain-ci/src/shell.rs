//! Shell configuration for node commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How node commands are handed to the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Shell executable.
    pub program: String,

    /// Flag that makes the shell read the command from its next argument.
    pub flag: String,

    /// Per-command timeout in seconds (0 = no timeout).
    #[serde(default)]
    pub timeout_secs: u64,

    /// Extra environment variables for every command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("cmd", "/C")
        } else {
            Self::new("sh", "-c")
        }
    }
}

impl ShellConfig {
    pub fn new(program: &str, flag: &str) -> Self {
        Self {
            program: program.to_string(),
            flag: flag.to_string(),
            timeout_secs: 0,
            env: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}
