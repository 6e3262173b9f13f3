//! Task specification: one prompt for one agent.
//!
//! # Invariants
//! - `id` is unique within a [`TaskGraph`](super::TaskGraph)
//! - A task never lists itself as a dependency

use serde::{Deserialize, Serialize};

use crate::agents::AgentRole;

/// Name of a task; also the placeholder downstream templates use to reference its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The placeholder text that references this task's output.
    pub fn placeholder(&self) -> String {
        format!("{{{{{}}}}}", self.0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A unit of work, fixed before a run starts.
///
/// Outputs are not stored here; each attempt writes them into its own output table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub role: AgentRole,
    /// Prompt with `{{name}}` placeholders
    pub template: String,
    /// Upstream tasks whose outputs feed the template, in declaration order
    pub dependencies: Vec<TaskId>,
    /// Documentation only; never enforced
    pub expected_output: String,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, role: AgentRole, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            template: template.into(),
            dependencies: Vec::new(),
            expected_output: String::new(),
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<TaskId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn expecting(mut self, expected_output: impl Into<String>) -> Self {
        self.expected_output = expected_output.into();
        self
    }
}
