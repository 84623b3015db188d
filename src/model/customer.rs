//! Customer records.

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::path::Collection;
use serde::{Deserialize, Serialize};

/// Number of placeholder avatars handed out in rotation.
pub const AVATAR_ROTATION: usize = 6;

/// Avatar reference for the `n`-th record of a collection.
pub fn rotating_avatar(existing: usize) -> String {
    format!("avatar-{}", (existing % AVATAR_ROTATION) + 1)
}

/// A customer. Deleting one never touches invoices that reference it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub aadhaar: String,
    #[serde(default)]
    pub pan: String,
    #[serde(default)]
    pub avatar: String,
}

impl Entity for Customer {
    fn collection() -> Collection {
        Collection::Customers
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError("customer name is required".into()));
        }
        Ok(())
    }
}

/// Form input for a new customer.
#[derive(Clone, Debug, Default)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub aadhaar: String,
    pub pan: String,
}

impl NewCustomer {
    pub fn named(name: impl Into<String>) -> Self {
        NewCustomer {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build the stored customer; the id is assigned by the store.
    pub fn into_customer(self, avatar: String) -> Customer {
        Customer {
            id: String::new(),
            name: self.name,
            email: self.email,
            mobile: self.mobile,
            aadhaar: self.aadhaar,
            pan: self.pan,
            avatar,
        }
    }
}

/// Partial edit of a customer. `None` fields are left untouched.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aadhaar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<String>,
}

impl CustomerUpdate {
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(Error::ValidationError("customer name cannot be blank".into()));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.mobile.is_none()
            && self.aadhaar.is_none()
            && self.pan.is_none()
    }
}

/// Field the customer table can be searched by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CustomerField {
    #[default]
    Name,
    Email,
    Mobile,
}

impl CustomerField {
    /// Record key for this field.
    pub fn key(&self) -> &'static str {
        match self {
            CustomerField::Name => "name",
            CustomerField::Email => "email",
            CustomerField::Mobile => "mobile",
        }
    }
}
