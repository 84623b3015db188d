//! In-memory document store (default, thread-safe, async).
//!
//! Uses DashMap for concurrent access with per-key sharding, and one
//! broadcast channel per collection for change notifications.

use super::{ChangeEvent, ChangeKind, Document, DocumentStore, WriteMode};
use crate::config::OpsConfig;
use crate::error::{Error, Result};
use crate::path::{generate_id, Collection, DocumentPath};
use crate::record::{merge_into, Record};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default buffer size of each collection's change channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Stored document with version and creation sequence.
struct StoredDocument {
    data: Record,
    version: u64,
    seq: u64,
}

/// Thread-safe async in-memory document store.
///
/// Clones share the same data. The store can be switched offline to
/// exercise `StoreUnavailable` handling in callers.
///
/// # Example
///
/// ```no_run
/// use bizops_kit::backend::{DocumentStore, InMemoryStore, WriteMode};
/// use bizops_kit::path::Collection;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let serde_json::Value::Object(record) = json!({ "name": "Asha" }) else { unreachable!() };
///     let id = store.create(Collection::Customers, record).await?;
///
///     let doc = store.get(Collection::Customers, &id).await?;
///     assert_eq!(doc.map(|d| d.version), Some(1));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    docs: Arc<DashMap<DocumentPath, StoredDocument>>,
    channels: Arc<HashMap<Collection, broadcast::Sender<ChangeEvent>>>,
    next_seq: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a store whose change channels buffer `capacity` events.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        let channels: HashMap<Collection, broadcast::Sender<ChangeEvent>> = Collection::ALL
            .iter()
            .map(|c| (*c, broadcast::channel(capacity.max(1)).0))
            .collect();

        InMemoryStore {
            docs: Arc::new(DashMap::new()),
            channels: Arc::new(channels),
            next_seq: Arc::new(AtomicU64::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a store sized by `config.live_query_capacity`.
    pub fn from_config(config: &OpsConfig) -> Self {
        Self::with_channel_capacity(config.live_query_capacity)
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if offline {
            warn!("⚠ InMemory store switched OFFLINE");
        } else {
            info!("✓ InMemory store back ONLINE");
        }
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.docs
            .iter()
            .filter(|entry| entry.key().collection == collection)
            .count()
    }

    /// True when the collection holds no documents.
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    fn ensure_online(&self, op: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            debug!("✗ InMemory {} rejected: store offline", op);
            return Err(Error::StoreUnavailable(format!(
                "{} failed: store is offline",
                op
            )));
        }
        Ok(())
    }

    fn publish(&self, path: DocumentPath, kind: ChangeKind, version: u64) {
        if let Some(sender) = self.channels.get(&path.collection) {
            // no receivers is fine
            let _ = sender.send(ChangeEvent {
                path,
                kind,
                version,
            });
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Apply `data` to an existing document, returning the new version.
    fn write_existing(stored: &mut StoredDocument, id: &str, data: Record, mode: WriteMode) -> u64 {
        match mode {
            WriteMode::Replace => stored.data = data,
            WriteMode::Merge => merge_into(&mut stored.data, data),
        }
        // the id field always reflects the document key
        stored
            .data
            .insert("id".to_string(), Value::String(id.to_string()));
        stored.version += 1;
        stored.version
    }

    fn new_document(&self, id: &str, mut data: Record) -> StoredDocument {
        data.insert("id".to_string(), Value::String(id.to_string()));
        StoredDocument {
            data,
            version: 1,
            seq: self.next_seq(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryStore {
    async fn create(&self, collection: Collection, data: Record) -> Result<String> {
        self.ensure_online("CREATE")?;

        let id = generate_id();
        let path = DocumentPath::new(collection, id.clone());
        let doc = self.new_document(&id, data);
        self.docs.insert(path.clone(), doc);

        debug!("✓ InMemory CREATE {}", path);
        self.publish(path, ChangeKind::Created, 1);
        Ok(id)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        self.ensure_online("GET")?;

        let path = DocumentPath::new(collection, id);
        match self.docs.get(&path) {
            Some(stored) => {
                debug!("✓ InMemory GET {} -> v{}", path, stored.version);
                Ok(Some(Document {
                    id: id.to_string(),
                    version: stored.version,
                    data: stored.data.clone(),
                }))
            }
            None => {
                debug!("✓ InMemory GET {} -> MISSING", path);
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        collection: Collection,
        id: &str,
        data: Record,
        mode: WriteMode,
    ) -> Result<u64> {
        self.ensure_online("SET")?;

        let path = DocumentPath::new(collection, id);
        let (version, kind) = match self.docs.entry(path.clone()) {
            Entry::Occupied(mut entry) => (
                Self::write_existing(entry.get_mut(), id, data, mode),
                ChangeKind::Updated,
            ),
            Entry::Vacant(entry) => {
                entry.insert(self.new_document(id, data));
                (1, ChangeKind::Created)
            }
        };

        debug!("✓ InMemory SET {} ({:?}) -> v{}", path, mode, version);
        self.publish(path, kind, version);
        Ok(version)
    }

    async fn set_if_version(
        &self,
        collection: Collection,
        id: &str,
        data: Record,
        mode: WriteMode,
        expected: u64,
    ) -> Result<u64> {
        self.ensure_online("SET_IF_VERSION")?;

        let path = DocumentPath::new(collection, id);
        let (version, kind) = match self.docs.entry(path.clone()) {
            Entry::Occupied(mut entry) => {
                let found = entry.get().version;
                if found != expected {
                    debug!(
                        "✗ InMemory SET_IF_VERSION {} expected v{}, found v{}",
                        path, expected, found
                    );
                    return Err(Error::VersionConflict {
                        path: path.to_string(),
                        expected,
                        found,
                    });
                }
                (
                    Self::write_existing(entry.get_mut(), id, data, mode),
                    ChangeKind::Updated,
                )
            }
            Entry::Vacant(entry) => {
                if expected != 0 {
                    return Err(Error::VersionConflict {
                        path: path.to_string(),
                        expected,
                        found: 0,
                    });
                }
                entry.insert(self.new_document(id, data));
                (1, ChangeKind::Created)
            }
        };

        debug!("✓ InMemory SET_IF_VERSION {} -> v{}", path, version);
        self.publish(path, kind, version);
        Ok(version)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.ensure_online("DELETE")?;

        let path = DocumentPath::new(collection, id);
        if let Some((_, stored)) = self.docs.remove(&path) {
            debug!("✓ InMemory DELETE {}", path);
            self.publish(path, ChangeKind::Deleted, stored.version);
        }
        Ok(())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>> {
        self.ensure_online("LIST")?;

        let mut docs: Vec<(u64, Document)> = self
            .docs
            .iter()
            .filter(|entry| entry.key().collection == collection)
            .map(|entry| {
                (
                    entry.seq,
                    Document {
                        id: entry.key().id.clone(),
                        version: entry.version,
                        data: entry.data.clone(),
                    },
                )
            })
            .collect();
        docs.sort_by_key(|(seq, _)| *seq);

        debug!("✓ InMemory LIST {} -> {} docs", collection, docs.len());
        Ok(docs.into_iter().map(|(_, doc)| doc).collect())
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        match self.channels.get(&collection) {
            Some(sender) => sender.subscribe(),
            // every collection gets a channel at construction
            None => broadcast::channel(1).1,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.offline.load(Ordering::SeqCst))
    }
}
