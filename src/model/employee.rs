//! Employee roster.

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::path::Collection;
use serde::{Deserialize, Serialize};

/// A staff member.
///
/// `workload` is a derived count of open tasks, rewritten by
/// [`OpsService::refresh_workloads`](crate::service::OpsService::refresh_workloads).
/// It is not maintained atomically with task writes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub avatar: String,
    /// Kept for stored records; not sent to the assignment advisor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default)]
    pub workload: u32,
    #[serde(default = "default_available")]
    pub availability: bool,
}

fn default_available() -> bool {
    true
}

impl Entity for Employee {
    fn collection() -> Collection {
        Collection::Employees
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("employee name is required".into()));
        }
        Ok(())
    }
}

/// Form input for a new employee.
#[derive(Clone, Debug, Default)]
pub struct NewEmployee {
    pub name: String,
    pub mobile: String,
}

impl NewEmployee {
    pub fn new(name: impl Into<String>, mobile: impl Into<String>) -> Self {
        NewEmployee {
            name: name.into(),
            mobile: mobile.into(),
        }
    }

    /// New hires start idle and available.
    pub fn into_employee(self, avatar: String) -> Employee {
        Employee {
            id: String::new(),
            name: self.name,
            mobile: self.mobile,
            email: String::new(),
            role: String::new(),
            avatar,
            skills: Vec::new(),
            workload: 0,
            availability: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_employee_defaults() {
        let employee = NewEmployee::new("Ravi", "99000").into_employee("avatar-2".into());
        assert_eq!(employee.workload, 0);
        assert!(employee.availability);
        assert!(employee.validate().is_ok());
    }

    #[test]
    fn test_availability_defaults_to_true_when_absent() {
        let employee: Employee =
            serde_json::from_value(json!({ "id": "e1", "name": "Meera", "workload": 2 }))
                .expect("parse");
        assert!(employee.availability);
        assert_eq!(employee.workload, 2);
    }
}
