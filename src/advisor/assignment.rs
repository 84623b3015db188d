//! Smart task assignment.
//!
//! The request carries the task and a snapshot of the roster keyed by
//! employee name. The service answers with a name, which is looked up in
//! the same roster for display.

use super::{ReasoningClient, ASSIGNMENT_FLOW};
use crate::error::{Error, Result};
use crate::model::employee::Employee;
use crate::model::task::Priority;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Workload and availability per employee name.
///
/// Names are the keys the service sees and the keys
/// [`AssignmentSuggestion::resolve`] looks up. Two employees sharing a name
/// collapse into one entry; the first in roster order wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSnapshot {
    #[serde(rename = "staffWorkload")]
    pub workload: BTreeMap<String, u32>,
    #[serde(rename = "staffAvailability")]
    pub availability: BTreeMap<String, bool>,
}

impl StaffSnapshot {
    pub fn from_employees(employees: &[Employee]) -> Self {
        let mut snapshot = StaffSnapshot::default();
        for employee in employees {
            if snapshot.workload.contains_key(&employee.name) {
                warn!(
                    "Duplicate employee name '{}' ({}); keeping the first entry",
                    employee.name, employee.id
                );
                continue;
            }
            snapshot
                .workload
                .insert(employee.name.clone(), employee.workload);
            snapshot
                .availability
                .insert(employee.name.clone(), employee.availability);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.workload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workload.is_empty()
    }
}

/// Input of the assignment flow.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    pub task_description: String,
    pub priority: Priority,
    /// `YYYY-MM-DD`, or empty when the task has no due date.
    pub due_date: String,
    #[serde(flatten)]
    pub staff: StaffSnapshot,
}

impl AssignmentRequest {
    pub fn new(
        task_description: impl Into<String>,
        priority: Priority,
        due_date: Option<NaiveDate>,
        employees: &[Employee],
    ) -> Self {
        AssignmentRequest {
            task_description: task_description.into(),
            priority,
            due_date: due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            staff: StaffSnapshot::from_employees(employees),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.task_description.trim().is_empty() {
            return Err(Error::ValidationError(
                "task description is required".into(),
            ));
        }
        if self.staff.is_empty() {
            return Err(Error::ValidationError(
                "no staff to choose from".into(),
            ));
        }
        Ok(())
    }
}

/// Output of the assignment flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSuggestion {
    pub suggested_staff: String,
    pub reasoning: String,
}

impl AssignmentSuggestion {
    /// The suggested employee, matched by name. First match wins.
    pub fn resolve<'a>(&self, employees: &'a [Employee]) -> Option<&'a Employee> {
        employees.iter().find(|e| e.name == self.suggested_staff)
    }
}

/// Ask the reasoning service who should take a task.
///
/// # Errors
///
/// - `Error::ValidationError`: empty description or roster; nothing sent
/// - `Error::InvalidResponseShape`: the reply is not `{suggestedStaff, reasoning}`
/// - any transport error from `client`, unchanged
pub async fn suggest_assignee<C: ReasoningClient>(
    client: &C,
    request: &AssignmentRequest,
) -> Result<AssignmentSuggestion> {
    request.validate()?;
    let input = serde_json::to_value(request)?;

    debug!(
        "» {} for '{}' across {} staff",
        ASSIGNMENT_FLOW,
        request.task_description,
        request.staff.len()
    );
    let output = client.complete(ASSIGNMENT_FLOW, input).await?;

    let suggestion: AssignmentSuggestion = serde_json::from_value(output)
        .map_err(|e| Error::InvalidResponseShape(format!("{}: {}", ASSIGNMENT_FLOW, e)))?;
    if suggestion.suggested_staff.trim().is_empty() {
        return Err(Error::InvalidResponseShape(format!(
            "{}: suggestedStaff is empty",
            ASSIGNMENT_FLOW
        )));
    }
    Ok(suggestion)
}
