//! Run state: phases, the per-attempt output table and the audit log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Where a run currently is.
///
/// ```text
/// NotStarted ─▶ RunningAttempt(1) ─▶ Validating(1) ─┬─▶ RunningAttempt(1) ─▶ Succeeded
///                      ▲                             │
///                      └──────── Retrying(n) ◀───────┘          any fatal error ─▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "attempt")]
pub enum RunPhase {
    NotStarted,
    RunningAttempt(u32),
    /// Checkpoint output of this attempt is being checked
    Validating(u32),
    /// This attempt was abandoned; the next one starts from the first task
    Retrying(u32),
    Succeeded,
    Failed,
}

impl RunPhase {
    /// Attempt number carried by the phase, if any.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            RunPhase::RunningAttempt(n) | RunPhase::Validating(n) | RunPhase::Retrying(n) => {
                Some(*n)
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Succeeded | RunPhase::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::NotStarted => write!(f, "not started"),
            RunPhase::RunningAttempt(n) => write!(f, "running attempt {}", n),
            RunPhase::Validating(n) => write!(f, "validating attempt {}", n),
            RunPhase::Retrying(n) => write!(f, "retrying after attempt {}", n),
            RunPhase::Succeeded => write!(f, "succeeded"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Task outputs produced during one attempt.
///
/// An output is written once, right after its task's call returns, and is read-only
/// afterwards. A new attempt starts with a new table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTable {
    outputs: BTreeMap<TaskId, String>,
    /// Task ids in the order their outputs were written
    written: Vec<TaskId>,
}

impl OutputTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a task's output. Returns `false` (and keeps the first value) if the task
    /// already has one.
    pub fn insert(&mut self, task: TaskId, output: String) -> bool {
        if self.outputs.contains_key(&task) {
            return false;
        }
        self.written.push(task.clone());
        self.outputs.insert(task, output);
        true
    }

    pub fn get(&self, task: &TaskId) -> Option<&str> {
        self.outputs.get(task).map(String::as_str)
    }

    /// Lookup by bare name, as used by template resolution.
    pub fn by_name(&self, name: &str) -> Option<&str> {
        self.get(&TaskId::new(name))
    }

    pub fn contains(&self, task: &TaskId) -> bool {
        self.outputs.contains_key(task)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Outputs in the order they were produced.
    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &str)> + '_ {
        self.written
            .iter()
            .filter_map(move |id| self.outputs.get(id).map(|o| (id, o.as_str())))
    }
}

/// Append-only, human-readable record of retries and failures across all attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<String>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::info!(entry = %entry, "Audit log entry");
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

/// What a finished run hands back to its caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Outputs of the last attempt
    pub outputs: OutputTable,
    /// Attempts used, 1-based
    pub attempts: u32,
    pub audit_log: AuditLog,
    pub phase: RunPhase,
    /// Every phase the run passed through, in order
    pub history: Vec<RunPhase>,
}

impl RunReport {
    pub fn output(&self, task: &str) -> Option<&str> {
        self.outputs.by_name(task)
    }
}
