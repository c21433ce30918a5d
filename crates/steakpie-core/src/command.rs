//! The command tree.
//!
//! A [`CommandNode`] is one shell invocation plus the follow-up commands that
//! run only when it succeeds. In YAML a leaf is a plain string and a node with
//! children is a single-key mapping from the command to its child list:
//!
//! ```yaml
//! - docker compose pull:
//!     - docker compose up -d
//! - echo done
//! ```

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub text: String,
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    /// A command with no follow-ups.
    pub fn leaf(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(text: impl Into<String>, children: Vec<CommandNode>) -> Self {
        Self {
            text: text.into(),
            children,
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(CommandNode::node_count)
            .sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Build a node from an already-parsed YAML value.
    pub fn from_yaml(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self::leaf(checked_text(text)?)),
            Value::Mapping(map) => {
                if map.len() != 1 {
                    return Err(CoreError::InvalidCommand(format!(
                        "command mapping must have exactly one key, got {}",
                        map.len()
                    )));
                }
                let Some((key, children)) = map.iter().next() else {
                    return Err(CoreError::InvalidCommand("empty command mapping".into()));
                };
                let Value::String(text) = key else {
                    return Err(CoreError::InvalidCommand(
                        "command key must be a string".into(),
                    ));
                };
                let Value::Sequence(items) = children else {
                    return Err(CoreError::InvalidCommand(format!(
                        "children of '{text}' must be a list"
                    )));
                };
                let children = command_list(items)?;
                Ok(Self::with_children(checked_text(text)?, children))
            }
            other => Err(CoreError::InvalidCommand(format!(
                "expected a string or a single-key mapping, got {}",
                kind_name(other)
            ))),
        }
    }
}

fn checked_text(text: &str) -> Result<&str> {
    if text.trim().is_empty() {
        return Err(CoreError::InvalidCommand("command text is empty".into()));
    }
    Ok(text)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

impl<'de> Deserialize<'de> for CommandNode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        CommandNode::from_yaml(&value).map_err(D::Error::custom)
    }
}

impl Serialize for CommandNode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.children.is_empty() {
            return serializer.serialize_str(&self.text);
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.text, &self.children)?;
        map.end()
    }
}

// ---------------------------------------------------------------------------
// RunSpec
// ---------------------------------------------------------------------------

/// Everything to run for one package event: working directory → command trees.
///
/// The empty directory means "the server's own working directory".
pub type RunSpec = BTreeMap<String, Vec<CommandNode>>;

/// Per-package command configuration.
///
/// A plain list runs in the server's working directory; a mapping keys the
/// lists by the directory they run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PackageCommands {
    List(Vec<CommandNode>),
    ByDirectory(BTreeMap<String, Vec<CommandNode>>),
}

impl PackageCommands {
    pub fn from_yaml(value: &Value) -> Result<Self> {
        match value {
            Value::Sequence(items) => Ok(PackageCommands::List(command_list(items)?)),
            Value::Mapping(map) => {
                let mut dirs = BTreeMap::new();
                for (dir, commands) in map {
                    let Value::String(dir) = dir else {
                        return Err(CoreError::InvalidCommand(
                            "working directory must be a string".into(),
                        ));
                    };
                    let Value::Sequence(items) = commands else {
                        return Err(CoreError::InvalidCommand(format!(
                            "commands for directory '{dir}' must be a list"
                        )));
                    };
                    dirs.insert(dir.clone(), command_list(items)?);
                }
                Ok(PackageCommands::ByDirectory(dirs))
            }
            other => Err(CoreError::InvalidCommand(format!(
                "expected a list of commands or a directory mapping, got {}",
                kind_name(other)
            ))),
        }
    }

    pub fn run_spec(&self) -> RunSpec {
        match self {
            PackageCommands::List(commands) => {
                let mut spec = RunSpec::new();
                spec.insert(String::new(), commands.clone());
                spec
            }
            PackageCommands::ByDirectory(dirs) => dirs.clone(),
        }
    }

    /// Total number of configured commands across all directories and levels.
    pub fn command_count(&self) -> usize {
        let count =
            |nodes: &[CommandNode]| nodes.iter().map(CommandNode::node_count).sum::<usize>();
        match self {
            PackageCommands::List(commands) => count(commands),
            PackageCommands::ByDirectory(dirs) => dirs.values().map(|c| count(c)).sum(),
        }
    }
}

fn command_list(items: &[Value]) -> Result<Vec<CommandNode>> {
    items.iter().map(CommandNode::from_yaml).collect()
}

impl<'de> Deserialize<'de> for PackageCommands {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        PackageCommands::from_yaml(&value).map_err(D::Error::custom)
    }
}
