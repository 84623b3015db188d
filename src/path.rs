//! Collection names and document path utilities.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The four logical collections of the document store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Customers,
    Employees,
    Invoices,
    Tasks,
}

impl Collection {
    /// All collections, in a stable order.
    pub const ALL: [Collection; 4] = [
        Collection::Customers,
        Collection::Employees,
        Collection::Invoices,
        Collection::Tasks,
    ];

    /// Collection name as used by the hosted store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Customers => "customers",
            Collection::Employees => "employees",
            Collection::Invoices => "invoices",
            Collection::Tasks => "tasks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customers" => Ok(Collection::Customers),
            "employees" => Ok(Collection::Employees),
            "invoices" => Ok(Collection::Invoices),
            "tasks" => Ok(Collection::Tasks),
            other => Err(Error::ValidationError(format!(
                "unknown collection '{}'",
                other
            ))),
        }
    }
}

/// Fully qualified document address: `{collection}/{id}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub collection: Collection,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        DocumentPath {
            collection,
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Generate a fresh document identifier.
///
/// Hosted stores hand out opaque random ids; a simple v4 UUID without
/// hyphens matches that shape closely enough for every caller here.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display() {
        let path = DocumentPath::new(Collection::Invoices, "INV-1");
        assert_eq!(path.to_string(), "invoices/INV-1");
    }

    #[test]
    fn test_unknown_collection_rejected() {
        assert!("widgets".parse::<Collection>().is_err());
    }

    #[test]
    fn test_collection_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(collection.as_str().parse::<Collection>().ok(), Some(collection));
        }
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}
