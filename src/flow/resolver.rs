//! Workflow validation and dependency resolution
//!
//! Validation rejects empty workflows, duplicate ids, dangling or
//! self-referential dependencies, and cycles (found by DFS). The
//! resolver peels in-degree-zero tasks into execution levels, sorting
//! each level by id so the schedule is deterministic.

use std::collections::{HashMap, HashSet};

use super::types::Workflow;
use crate::error::{Error, Result};

/// Validate a workflow before execution
pub fn validate(workflow: &Workflow) -> Result<()> {
    if workflow.tasks.is_empty() {
        return Err(Error::Workflow("workflow has no tasks".to_string()));
    }

    let mut ids = HashSet::new();
    for task in &workflow.tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(Error::Workflow(format!("duplicate task id '{}'", task.id)));
        }
    }

    for task in &workflow.tasks {
        for dep in &task.dependencies {
            if dep == &task.id {
                return Err(Error::Workflow(format!(
                    "task '{}' depends on itself",
                    task.id
                )));
            }
            if !ids.contains(dep.as_str()) {
                return Err(Error::Workflow(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.id, dep
                )));
            }
        }
    }

    detect_cycle(workflow)?;
    Ok(())
}

/// DFS cycle detection over the dependency edges
fn detect_cycle(workflow: &Workflow) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let deps: HashMap<&str, &[String]> = workflow
        .tasks
        .iter()
        .map(|t| (t.id.as_str(), t.dependencies.as_slice()))
        .collect();
    let mut marks: HashMap<&str, Mark> =
        workflow.tasks.iter().map(|t| (t.id.as_str(), Mark::Unvisited)).collect();

    fn visit<'a>(
        id: &'a str,
        deps: &HashMap<&'a str, &'a [String]>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks[id] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                return Err(Error::Workflow(format!(
                    "dependency cycle involving task '{}'",
                    id
                )))
            }
            Mark::Unvisited => {}
        }
        marks.insert(id, Mark::InProgress);
        for dep in deps[id] {
            visit(dep.as_str(), deps, marks)?;
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    for task in &workflow.tasks {
        visit(task.id.as_str(), &deps, &mut marks)?;
    }
    Ok(())
}

/// Resolve the workflow into execution levels.
///
/// Kahn's algorithm: repeatedly peel every task whose remaining
/// in-degree is zero into one level, in lexicographic id order. The
/// concatenation of levels is a valid topological order; members of a
/// level never depend on each other, even transitively.
pub fn resolve_levels(workflow: &Workflow) -> Result<Vec<Vec<String>>> {
    let mut in_degree: HashMap<&str, usize> = workflow
        .tasks
        .iter()
        .map(|t| (t.id.as_str(), t.dependencies.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in &workflow.tasks {
        for dep in &task.dependencies {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(task.id.as_str());
        }
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut resolved = 0usize;

    while resolved < workflow.tasks.len() {
        let mut level: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        if level.is_empty() {
            // Unreachable after validation; kept as a defensive check
            // against callers that skip validate().
            return Err(Error::Workflow(
                "dependency cycle prevents scheduling".to_string(),
            ));
        }
        level.sort_unstable();

        for &id in &level {
            in_degree.remove(id);
            for &dependent in dependents.get(id).map(|v| v.as_slice()).unwrap_or(&[]) {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                }
            }
        }

        resolved += level.len();
        levels.push(level.into_iter().map(String::from).collect());
    }

    Ok(levels)
}
