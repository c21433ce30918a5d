//! The execution engine.
//!
//! For each working directory in a [`RunSpec`] the engine walks the command
//! trees depth-first, in configuration order:
//!
//! - every sibling is attempted, whatever happened to the ones before it;
//! - a node's children run (in the same directory) only if the node succeeded;
//! - the children of a failed node never run and are reported as skipped.
//!
//! Commands run one at a time and the engine blocks on each. Directories are
//! walked one after another in map order.

use tracing::{debug, info, warn};

use crate::command::{CommandNode, RunSpec};
use crate::runner::{CommandRunner, RunError};

/// Lifecycle of a single command node.
///
/// ```text
/// Pending ──▶ Running ──▶ Succeeded
///    │                └─▶ Failed
///    └──────▶ Skipped        (parent failed)
/// ```
///
/// A report only ever holds terminal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Succeeded,
    Failed(String),
    Skipped,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeState::Succeeded | NodeState::Failed(_) | NodeState::Skipped
        )
    }

    fn finished(status: &Result<(), RunError>) -> Self {
        match status {
            Ok(()) => NodeState::Succeeded,
            Err(e) => NodeState::Failed(e.to_string()),
        }
    }
}

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub dir: String,
    pub command: String,
    /// 1-based position among its siblings.
    pub position: usize,
    pub total: usize,
    /// 0 for top-level commands.
    pub depth: usize,
    pub output: String,
    pub state: NodeState,
}

/// Every outcome of one run, in the order the engine reached them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub package: String,
    pub correlation_id: Option<String>,
    pub outcomes: Vec<ExecutionOutcome>,
}

impl ExecutionReport {
    /// Commands that were actually started, in order.
    pub fn attempted(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o.state, NodeState::Skipped))
            .map(|o| o.command.as_str())
            .collect()
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, NodeState::Skipped))
            .map(|o| o.command.as_str())
            .collect()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, NodeState::Failed(_)))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.state, NodeState::Succeeded))
    }
}

/// Run everything in `spec` for `package`.
///
/// `correlation_id` is the webhook delivery ID when there is one; it only
/// labels log lines.
pub fn execute(
    runner: &dyn CommandRunner,
    spec: &RunSpec,
    package: &str,
    correlation_id: Option<&str>,
) -> ExecutionReport {
    let id = correlation_id.unwrap_or("-");
    info!(package, delivery_id = id, "start webhook for {package} received with id: {id}");

    let mut report = ExecutionReport {
        package: package.to_string(),
        correlation_id: correlation_id.map(str::to_string),
        outcomes: Vec::new(),
    };

    for (dir, commands) in spec {
        info!(package, dir = %dir, "executing in directory: {}", display_dir(dir));
        execute_level(runner, dir, commands, 0, &mut report.outcomes);
    }

    info!(
        package,
        delivery_id = id,
        failed = report.failed(),
        "end webhook for {package} with id: {id}"
    );
    report
}

fn execute_level(
    runner: &dyn CommandRunner,
    dir: &str,
    commands: &[CommandNode],
    depth: usize,
    outcomes: &mut Vec<ExecutionOutcome>,
) {
    let total = commands.len();
    for (i, node) in commands.iter().enumerate() {
        let position = i + 1;
        info!(dir, position, total, "running command {position} of {total}: {}", node.text);

        let result = runner.run(&node.text, dir);
        if !result.output.is_empty() {
            info!(dir, position, total, "output: {}", result.output.trim_end());
        }

        let state = NodeState::finished(&result.status);

        let succeeded = matches!(state, NodeState::Succeeded);
        match &result.status {
            Ok(()) => info!(dir, position, total, "command {position} of {total} succeeded"),
            Err(e) => warn!(dir, position, total, "command {position} of {total} failed: {e}"),
        }

        outcomes.push(ExecutionOutcome {
            dir: dir.to_string(),
            command: node.text.clone(),
            position,
            total,
            depth,
            output: result.output,
            state,
        });

        if node.is_leaf() {
            continue;
        }
        if succeeded {
            execute_level(runner, dir, &node.children, depth + 1, outcomes);
        } else {
            skip_level(dir, &node.children, depth + 1, outcomes);
        }
    }
}

fn skip_level(
    dir: &str,
    commands: &[CommandNode],
    depth: usize,
    outcomes: &mut Vec<ExecutionOutcome>,
) {
    let total = commands.len();
    for (i, node) in commands.iter().enumerate() {
        debug!(dir, command = %node.text, "skipping: parent failed");
        outcomes.push(ExecutionOutcome {
            dir: dir.to_string(),
            command: node.text.clone(),
            position: i + 1,
            total,
            depth,
            output: String::new(),
            state: NodeState::Skipped,
        });
        skip_level(dir, &node.children, depth + 1, outcomes);
    }
}

fn display_dir(dir: &str) -> &str {
    if dir.is_empty() {
        "."
    } else {
        dir
    }
}
