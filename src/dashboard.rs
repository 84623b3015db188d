//! Read-only summaries over the task list.
//!
//! All of these are pure functions of the current records; callers recompute
//! them on every change (see [`EntityStore::watch`](crate::store::EntityStore::watch)).

use crate::model::employee::Employee;
use crate::model::task::{Task, TaskStatus};
use std::collections::HashMap;

/// Task count per status, in the order each status first appears.
pub fn task_status_counts(tasks: &[Task]) -> Vec<(TaskStatus, usize)> {
    let mut counts: Vec<(TaskStatus, usize)> = Vec::new();
    for task in tasks {
        match counts.iter_mut().find(|(status, _)| *status == task.status) {
            Some((_, n)) => *n += 1,
            None => counts.push((task.status, 1)),
        }
    }
    counts
}

/// Per employee (roster order), the number of tasks whose assignee
/// resolves to them.
pub fn tasks_per_employee(employees: &[Employee], tasks: &[Task]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for task in tasks {
        if let Some(employee) = task.resolve_assignee(employees) {
            *counts.entry(employee.id.as_str()).or_default() += 1;
        }
    }
    employees
        .iter()
        .map(|e| (e.name.clone(), counts.get(e.id.as_str()).copied().unwrap_or(0)))
        .collect()
}

/// The first `limit` tasks in store order.
pub fn recent_tasks(tasks: &[Task], limit: usize) -> &[Task] {
    &tasks[..limit.min(tasks.len())]
}

/// A stored workload that no longer matches the task list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadChange {
    pub employee_id: String,
    pub previous: u32,
    pub workload: u32,
}

/// Open-task count per employee, reported only where it differs from the
/// stored `workload`.
///
/// Tasks are attributed through [`Task::resolve_assignee`]; tasks whose
/// assignee cannot be resolved count for nobody.
pub fn derive_workloads(employees: &[Employee], tasks: &[Task]) -> Vec<WorkloadChange> {
    let mut open: HashMap<&str, u32> = HashMap::new();
    for task in tasks.iter().filter(|t| t.status.is_open()) {
        match task.resolve_assignee(employees) {
            Some(employee) => *open.entry(employee.id.as_str()).or_default() += 1,
            None => debug!("Task {} has no resolvable assignee '{}'", task.id, task.assignee),
        }
    }

    employees
        .iter()
        .filter_map(|employee| {
            let workload = open.get(employee.id.as_str()).copied().unwrap_or(0);
            (workload != employee.workload).then(|| WorkloadChange {
                employee_id: employee.id.clone(),
                previous: employee.workload,
                workload,
            })
        })
        .collect()
}
