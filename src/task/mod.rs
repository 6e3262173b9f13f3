//! Task module - task specifications, the dependency graph, and context injection.
//!
//! - Types are plain data; execution state lives in the orchestrator
//! - Invariants are documented and enforced in constructors
//! - Context resolution is a pure function of the template and the available outputs

mod graph;
pub mod task;
mod template;

pub use graph::{GraphError, TaskGraph};
pub use task::{TaskId, TaskSpec};
pub use template::{placeholders, resolve, MissingContextError};
