use thiserror::Error;

use crate::agents::AgentError;
use crate::llm::ProviderError;
use super::AuditLog;
use crate::task::{GraphError, MissingContextError, TaskId};

/// Errors that end a run.
///
/// Validation failures and unparseable reviews never show up here; they are recorded
/// in the audit log and the run carries on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid task graph: {0}")]
    Graph(#[from] GraphError),

    #[error("checkpoint task '{0}' is not part of the task graph")]
    UnknownCheckpoint(TaskId),

    #[error(transparent)]
    MissingContext(#[from] MissingContextError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("stage '{stage}' failed after {attempts} attempt(s): {source}")]
    AttemptsExhausted {
        stage: TaskId,
        attempts: u32,
        #[source]
        source: ProviderError,
        /// Everything noted on the way to the failure, one entry per lost attempt
        audit_log: AuditLog,
    },
}

impl PipelineError {
    /// Attempts consumed before the error was raised. Wiring errors are raised before
    /// the first attempt.
    pub fn attempts(&self) -> u32 {
        match self {
            PipelineError::AttemptsExhausted { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Audit entries of the failed run. Errors raised before dispatch carry none.
    pub fn audit_log(&self) -> Option<&AuditLog> {
        match self {
            PipelineError::AttemptsExhausted { audit_log, .. } => Some(audit_log),
            _ => None,
        }
    }
}
