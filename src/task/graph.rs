//! Task graph: a DAG of [`TaskSpec`]s with a stable execution order.
//!
//! # Invariants
//! - Task ids are unique
//! - Dependencies between tasks in the graph form no cycle
//! - `order` lists every task exactly once, each after all of its in-graph dependencies

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::template::{placeholders, MissingContextError};
use super::{TaskId, TaskSpec};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("task graph is empty")]
    Empty,

    #[error("duplicate task id '{0}'")]
    DuplicateTask(TaskId),

    #[error("task '{0}' depends on itself")]
    SelfDependency(TaskId),

    #[error("dependency cycle among tasks: {}", format_ids(.0))]
    Cycle(Vec<TaskId>),
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<TaskSpec>,
    /// Indices into `tasks` in execution order
    order: Vec<usize>,
}

impl TaskGraph {
    /// Validate the tasks and compute their execution order.
    ///
    /// Ordering follows declared dependencies; ties keep declaration order. Dependencies
    /// on tasks outside the graph do not affect ordering; [`TaskGraph::check_wiring`]
    /// reports them.
    pub fn new(tasks: Vec<TaskSpec>) -> Result<Self, GraphError> {
        if tasks.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index: HashMap<&TaskId, usize> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(&task.id, i).is_some() {
                return Err(GraphError::DuplicateTask(task.id.clone()));
            }
            if task.dependencies.contains(&task.id) {
                return Err(GraphError::SelfDependency(task.id.clone()));
            }
        }

        let mut pending: Vec<usize> = tasks
            .iter()
            .map(|t| {
                t.dependencies
                    .iter()
                    .filter(|d| index.contains_key(d))
                    .count()
            })
            .collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                if let Some(&d) = index.get(dep) {
                    dependents[d].push(i);
                }
            }
        }

        let mut order = Vec::with_capacity(tasks.len());
        let mut done = vec![false; tasks.len()];
        // Linear pipelines make the quadratic scan irrelevant; it keeps ties in declaration order.
        while order.len() < tasks.len() {
            let next = (0..tasks.len()).find(|&i| !done[i] && pending[i] == 0);
            let Some(next) = next else {
                let stuck = (0..tasks.len())
                    .filter(|&i| !done[i])
                    .map(|i| tasks[i].id.clone())
                    .collect();
                return Err(GraphError::Cycle(stuck));
            };
            done[next] = true;
            order.push(next);
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
            }
        }

        Ok(Self { tasks, order })
    }

    /// Tasks in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &TaskSpec> + '_ {
        self.order.iter().map(move |&i| &self.tasks[i])
    }

    pub fn get(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The task that runs last.
    pub fn terminal(&self) -> Option<&TaskSpec> {
        self.order.last().map(|&i| &self.tasks[i])
    }

    /// Check, before anything runs, that every task's context can be satisfied.
    ///
    /// Each declared dependency must be a task in this graph, and each placeholder must
    /// name either a declared dependency or one of `inputs`.
    pub fn check_wiring(&self, inputs: &[&str]) -> Result<(), MissingContextError> {
        for task in self.ordered() {
            for dep in &task.dependencies {
                if !self.contains(dep) {
                    return Err(MissingContextError::new(&task.id, dep.as_str()));
                }
            }

            let declared: HashSet<&str> = task.dependencies.iter().map(|d| d.as_str()).collect();
            for name in placeholders(&task.template) {
                if !declared.contains(name.as_str()) && !inputs.contains(&name.as_str()) {
                    return Err(MissingContextError::new(&task.id, &name));
                }
            }
        }
        Ok(())
    }
}
