//! Placeholder parsing and context injection.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::TaskId;

/// A template referenced context that is not available.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task '{task}' needs {placeholder}, but no such output is available")]
pub struct MissingContextError {
    pub task: TaskId,
    /// Placeholder as written in the template, e.g. `{{analyze}}`
    pub placeholder: String,
}

impl MissingContextError {
    pub fn new(task: &TaskId, name: &str) -> Self {
        Self {
            task: task.clone(),
            placeholder: format!("{{{{{}}}}}", name),
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Names referenced by `template`, in first-appearance order, without duplicates.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for cap in placeholder_pattern().captures_iter(template) {
        let name = &cap[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitute every placeholder with the text `lookup` returns for it.
///
/// Values are inserted verbatim; they are never re-scanned for placeholders.
///
/// # Errors
/// The first placeholder (in template order) that `lookup` cannot supply.
pub fn resolve<'a, F>(
    task: &TaskId,
    template: &str,
    lookup: F,
) -> Result<String, MissingContextError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut resolved = String::with_capacity(template.len());
    let mut last = 0;

    for cap in placeholder_pattern().captures_iter(template) {
        let (whole, name) = match (cap.get(0), cap.get(1)) {
            (Some(whole), Some(name)) => (whole, name.as_str()),
            _ => continue,
        };
        let value = lookup(name).ok_or_else(|| MissingContextError::new(task, name))?;
        resolved.push_str(&template[last..whole.start()]);
        resolved.push_str(value);
        last = whole.end();
    }

    resolved.push_str(&template[last..]);
    Ok(resolved)
}
