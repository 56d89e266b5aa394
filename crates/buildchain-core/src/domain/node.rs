//! Node chain entries: projects, branch mappings and build commands.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket name used when no peer-specific mapping rules exist.
pub const DEFAULT_BUCKET: &str = "default";

/// One repository participating in the build chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// `group/name` project identifier.
    pub project: String,

    /// Projects this node depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Branch-mapping rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Mapping>,

    /// Extra folder names the checkout is replicated into.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clone: Vec<String>,

    /// Build commands per phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildCommand>,

    /// Never execute commands for this node.
    #[serde(default)]
    pub skip: bool,
}

impl Node {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            dependencies: Vec::new(),
            mapping: None,
            clone: Vec::new(),
            build: None,
            skip: false,
        }
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn with_build(mut self, build: BuildCommand) -> Self {
        self.build = Some(build);
        self
    }

    pub fn with_clone(mut self, folders: &[&str]) -> Self {
        self.clone = folders.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    /// Owner part of the project (everything before the last `/`).
    pub fn group(&self) -> &str {
        split_project(&self.project).0
    }

    /// Repository part of the project.
    pub fn name(&self) -> &str {
        split_project(&self.project).1
    }
}

/// Split `group/name`; nested groups keep their slashes in the group part.
pub fn split_project(project: &str) -> (&str, &str) {
    project.rsplit_once('/').unwrap_or(("", project))
}

/// One `source -> target` branch rule.
///
/// `source` is tried as an exact branch name first, then as a regular
/// expression matched against the whole branch; `target` may reference
/// capture groups (`$1`) when the rule matched as a regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub source: String,
    pub target: String,
}

impl MappingRule {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Rule buckets keyed by peer project, with a `default` fallback bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingSet(pub BTreeMap<String, Vec<MappingRule>>);

impl MappingSet {
    pub fn with_default(rules: Vec<MappingRule>) -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(DEFAULT_BUCKET.to_string(), rules);
        Self(buckets)
    }

    pub fn with_peer(mut self, peer: &str, rules: Vec<MappingRule>) -> Self {
        self.0.insert(peer.to_string(), rules);
        self
    }

    /// Rules for `peer`, else the `default` bucket.
    pub fn rules_for(&self, peer: &str) -> Option<&[MappingRule]> {
        self.0
            .get(peer)
            .or_else(|| self.0.get(DEFAULT_BUCKET))
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Branch-mapping configuration of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Applied to the nodes this node depends on, when this node triggered the job.
    #[serde(default, skip_serializing_if = "MappingSet::is_empty")]
    pub dependencies: MappingSet,

    /// Applied to this node when it is a dependant of the triggering node.
    #[serde(default, skip_serializing_if = "MappingSet::is_empty")]
    pub dependant: MappingSet,

    /// Peer projects for which no mapping applies at all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl Mapping {
    pub fn excludes(&self, peer: &str) -> bool {
        self.exclude.iter().any(|p| p == peer)
    }
}

/// Position of a node relative to the triggering node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLevel {
    Upstream,
    Current,
    Downstream,
}

impl ExecutionLevel {
    /// Level of the node at `index` when the triggering node sits at `triggering_index`.
    pub fn of(index: usize, triggering_index: usize) -> Self {
        match index.cmp(&triggering_index) {
            std::cmp::Ordering::Less => ExecutionLevel::Upstream,
            std::cmp::Ordering::Equal => ExecutionLevel::Current,
            std::cmp::Ordering::Greater => ExecutionLevel::Downstream,
        }
    }
}

impl std::fmt::Display for ExecutionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionLevel::Upstream => "upstream",
            ExecutionLevel::Current => "current",
            ExecutionLevel::Downstream => "downstream",
        };
        f.write_str(s)
    }
}

/// Commands keyed by execution level; missing levels fall back to `current`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Vec<String>>,
}

/// A command list, either shared by every level or keyed per level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelCommands {
    All(Vec<String>),
    ByLevel(LevelMap),
}

impl LevelCommands {
    pub fn all(commands: &[&str]) -> Self {
        LevelCommands::All(commands.iter().map(|c| c.to_string()).collect())
    }

    /// Commands to run for `level`.
    pub fn for_level(&self, level: ExecutionLevel) -> &[String] {
        match self {
            LevelCommands::All(commands) => commands,
            LevelCommands::ByLevel(map) => {
                let specific = match level {
                    ExecutionLevel::Upstream => map.upstream.as_ref(),
                    ExecutionLevel::Current => map.current.as_ref(),
                    ExecutionLevel::Downstream => map.downstream.as_ref(),
                };
                specific
                    .or(map.current.as_ref())
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
            }
        }
    }
}

/// Build commands of a node, per phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<LevelCommands>,
    pub current: LevelCommands,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<LevelCommands>,
}

impl BuildCommand {
    pub fn new(current: LevelCommands) -> Self {
        Self {
            before: None,
            current,
            after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_project_handles_nested_groups() {
        assert_eq!(split_project("org/core"), ("org", "core"));
        assert_eq!(split_project("org/sub/core"), ("org/sub", "core"));
        assert_eq!(split_project("core"), ("", "core"));
        let node = Node::new("kiegroup/drools");
        assert_eq!(node.group(), "kiegroup");
        assert_eq!(node.name(), "drools");
    }

    #[test]
    fn test_execution_level_relative_to_trigger() {
        assert_eq!(ExecutionLevel::of(0, 2), ExecutionLevel::Upstream);
        assert_eq!(ExecutionLevel::of(2, 2), ExecutionLevel::Current);
        assert_eq!(ExecutionLevel::of(3, 2), ExecutionLevel::Downstream);
    }

    #[test]
    fn test_level_commands_fall_back_to_current() {
        let cmds = LevelCommands::ByLevel(LevelMap {
            upstream: Some(vec!["mvn install -DskipTests".to_string()]),
            current: Some(vec!["mvn verify".to_string()]),
            downstream: None,
        });
        assert_eq!(cmds.for_level(ExecutionLevel::Upstream), ["mvn install -DskipTests"]);
        assert_eq!(cmds.for_level(ExecutionLevel::Current), ["mvn verify"]);
        assert_eq!(cmds.for_level(ExecutionLevel::Downstream), ["mvn verify"]);
    }

    #[test]
    fn test_level_commands_deserialize_both_shapes() {
        let flat: LevelCommands = serde_json::from_str(r#"["make", "make test"]"#).unwrap();
        assert_eq!(flat.for_level(ExecutionLevel::Downstream), ["make", "make test"]);

        let keyed: LevelCommands =
            serde_json::from_str(r#"{"upstream": ["make"], "current": ["make check"]}"#).unwrap();
        assert_eq!(keyed.for_level(ExecutionLevel::Upstream), ["make"]);
        assert_eq!(keyed.for_level(ExecutionLevel::Current), ["make check"]);
    }

    #[test]
    fn test_mapping_set_prefers_peer_bucket() {
        let set = MappingSet::with_default(vec![MappingRule::new("main", "release")])
            .with_peer("org/ui", vec![MappingRule::new("main", "ui-release")]);
        assert_eq!(set.rules_for("org/ui").unwrap()[0].target, "ui-release");
        assert_eq!(set.rules_for("org/api").unwrap()[0].target, "release");
        assert!(MappingSet::default().rules_for("org/ui").is_none());
    }

    #[test]
    fn test_node_deserializes_from_chain_json() {
        let json = r#"{
            "project": "org/ui",
            "mapping": {"dependant": {"default": [{"source": "main", "target": "release"}]}},
            "clone": ["ui-copy"],
            "build": {"current": ["npm ci", "npm test"]}
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.project, "org/ui");
        assert!(!node.skip);
        assert_eq!(node.clone, vec!["ui-copy"]);
        let mapping = node.mapping.unwrap();
        assert_eq!(mapping.dependant.rules_for("org/core").unwrap()[0].target, "release");
    }
}
