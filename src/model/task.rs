//! Work items assigned to staff.

use crate::dates;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::model::customer::Customer;
use crate::model::employee::Employee;
use crate::path::Collection;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Todo,
    #[serde(rename = "In Progress")]
    InProgress,
    Done,
    Canceled,
}

impl TaskStatus {
    /// Todo and In Progress count toward an employee's workload.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::InProgress)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "Todo",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
            TaskStatus::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A task.
///
/// `customer` and `assignee` hold display names. The optional `customer_id`
/// and `assignee_id` are the identifier references used by
/// [`Task::resolve_assignee`] and [`Task::resolve_customer`]; older records
/// only have the names and resolve by name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub customer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub assignee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "dates::optional_date")]
    pub due_date: Option<NaiveDate>,
}

impl Task {
    /// Employee this task is assigned to.
    ///
    /// With an `assignee_id` only that id is looked up; a deleted employee
    /// resolves to `None` rather than to someone sharing the old name.
    /// Without one, the first employee with a matching name wins.
    pub fn resolve_assignee<'a>(&self, employees: &'a [Employee]) -> Option<&'a Employee> {
        resolve(
            self.assignee_id.as_deref(),
            &self.assignee,
            employees,
            |e| &e.id,
            |e| &e.name,
        )
    }

    /// Customer this task is for, with the same rules as `resolve_assignee`.
    pub fn resolve_customer<'a>(&self, customers: &'a [Customer]) -> Option<&'a Customer> {
        resolve(
            self.customer_id.as_deref(),
            &self.customer,
            customers,
            |c| &c.id,
            |c| &c.name,
        )
    }
}

fn resolve<'a, T>(
    id: Option<&str>,
    name: &str,
    candidates: &'a [T],
    id_of: impl Fn(&T) -> &String,
    name_of: impl Fn(&T) -> &String,
) -> Option<&'a T> {
    match id {
        Some(id) => candidates.iter().find(|c| id_of(c) == id),
        // first match wins on duplicate names
        None => candidates.iter().find(|c| name_of(c) == name),
    }
}

impl Entity for Task {
    fn collection() -> Collection {
        Collection::Tasks
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::ValidationError("task title is required".into()));
        }
        Ok(())
    }
}

/// Form input for a new task.
#[derive(Clone, Debug, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub customer_id: String,
    pub assignee_id: String,
    pub invoice_id: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::ValidationError("task title is required".into()));
        }
        if self.customer_id.trim().is_empty() {
            return Err(Error::ValidationError("task customer is required".into()));
        }
        if self.assignee_id.trim().is_empty() {
            return Err(Error::ValidationError("task assignee is required".into()));
        }
        Ok(())
    }

    /// Build the stored task. Names are copied from the resolved records.
    pub fn into_task(
        self,
        customer: &Customer,
        assignee: &Employee,
        created_at: DateTime<Utc>,
    ) -> Task {
        Task {
            id: String::new(),
            title: self.title,
            description: self.description,
            customer: customer.name.clone(),
            customer_id: Some(customer.id.clone()),
            invoice_id: self.invoice_id,
            assignee: assignee.name.clone(),
            assignee_id: Some(assignee.id.clone()),
            priority: self.priority,
            status: TaskStatus::Todo,
            created_at,
            due_date: self.due_date,
        }
    }
}
