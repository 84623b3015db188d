//! Document store backends.

use crate::error::Result;
use crate::path::{Collection, DocumentPath};
use crate::query::Filter;
use crate::record::Record;
use tokio::sync::broadcast;

pub mod inmemory;

pub use inmemory::InMemoryStore;

/// A stored document together with its version.
///
/// `version` starts at 1 on creation and increases by one on every write.
/// It is the token for [`DocumentStore::set_if_version`].
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub data: Record,
}

/// How a write combines with the stored document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the whole document.
    #[default]
    Replace,
    /// Merge the given fields into the stored document (see [`crate::record::merge_into`]).
    Merge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Notification published to subscribers of a collection after every write.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub path: DocumentPath,
    pub kind: ChangeKind,
    /// Version after the change (the last version for deletions).
    pub version: u64,
}

/// Trait for document store implementations.
///
/// Abstracts the hosted schemaless store: four collections, each a map from
/// generated string id to a JSON object.
///
/// **IMPORTANT:** All methods take `&self`; implementations use interior
/// mutability or an external service. Separate calls are not ordered with
/// respect to each other and no read/write isolation is implied: a value
/// read by `get` may be stale by the time a following `set` lands. Use
/// `set_if_version` when that matters.
///
/// **ASYNC:** All methods are async and must be awaited.
#[allow(async_fn_in_trait)]
pub trait DocumentStore: Send + Sync + Clone {
    /// Insert a new document under a generated id.
    ///
    /// The id is also written into the record's `id` field.
    ///
    /// # Errors
    /// `Error::StoreUnavailable` on network/permission failure.
    async fn create(&self, collection: Collection, data: Record) -> Result<String>;

    /// Fetch a document.
    ///
    /// # Returns
    /// - `Ok(Some(doc))` - Document exists
    /// - `Ok(None)` - No document with this id
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

    /// Write a document, creating it when absent. Returns the new version.
    async fn set(
        &self,
        collection: Collection,
        id: &str,
        data: Record,
        mode: WriteMode,
    ) -> Result<u64>;

    /// Write only if the stored version equals `expected` (0 = must not exist).
    ///
    /// # Errors
    /// `Error::VersionConflict` when another writer got there first.
    async fn set_if_version(
        &self,
        collection: Collection,
        id: &str,
        data: Record,
        mode: WriteMode,
        expected: u64,
    ) -> Result<u64>;

    /// Remove a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// All documents of a collection, in creation order.
    async fn list(&self, collection: Collection) -> Result<Vec<Document>>;

    /// Documents matching `filter`.
    ///
    /// Default implementation filters the result of `list()`.
    /// Override when the backend can evaluate predicates itself.
    async fn query(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>> {
        Ok(self
            .list(collection)
            .await?
            .into_iter()
            .filter(|doc| filter.matches(&doc.data))
            .collect())
    }

    /// Subscribe to changes of one collection.
    ///
    /// Delivery is asynchronous. A receiver that falls behind sees
    /// `RecvError::Lagged` and should re-read the collection.
    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent>;

    /// Health check - verify the store is reachable.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
