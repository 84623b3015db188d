//! Core entity trait that all stored documents implement.

use crate::error::Result;
use crate::path::Collection;
use crate::record::{self, Record};
use serde::{Deserialize, Serialize};

/// Trait that all entities kept in the document store must implement.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use bizops_kit::{Entity, path::Collection};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Note {
///     pub id: String,
///     pub body: String,
/// }
///
/// impl Entity for Note {
///     fn collection() -> Collection {
///         Collection::Tasks
///     }
///
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn set_id(&mut self, id: String) {
///         self.id = id;
///     }
/// }
/// ```
pub trait Entity: Send + Sync + Serialize + for<'de> Deserialize<'de> + Clone {
    /// Collection this entity lives in.
    fn collection() -> Collection;

    /// The document identifier. Empty until the store assigns one.
    fn id(&self) -> &str;

    /// Called by the store on creation with the generated identifier.
    fn set_id(&mut self, id: String);

    /// Convert to the store's record shape.
    ///
    /// The record always contains the `id` field, mirroring the hosted store
    /// where every document embeds its own identifier.
    fn to_record(&self) -> Result<Record> {
        record::to_record(self)
    }

    /// Rebuild the entity from a stored record.
    ///
    /// # Errors
    ///
    /// - `Error::DeserializationError`: record does not match the entity shape
    fn from_record(record: Record) -> Result<Self> {
        record::from_record(record)
    }

    /// Optional: Validate entity before it is written.
    ///
    /// Called by the store ahead of `create`. Return `Error::ValidationError`
    /// for missing required form fields.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
