//! Typed entity store over a [`DocumentStore`].
//!
//! `EntityStore` is the create/read/update/delete surface the rest of the
//! crate uses. It converts between entities and records, maps missing
//! documents to `Error::NotFound`, and hands out [`LiveQuery`] handles that
//! re-run a query every time the underlying collection changes.
//!
//! # Example
//!
//! ```ignore
//! use bizops_kit::{EntityStore, backend::InMemoryStore, model::{Customer, NewCustomer}};
//!
//! let store = EntityStore::new(InMemoryStore::new());
//! let customer = store
//!     .create(NewCustomer::named("Asha").into_customer("avatar-1".into()))
//!     .await?;
//!
//! let loaded: Customer = store.get(&customer.id).await?;
//! assert_eq!(loaded.name, "Asha");
//! ```
//!
//! # Consistency
//!
//! Nothing here is transactional. Two calls are two independent store
//! round-trips; a `get` followed by an `update` can race with other writers.
//! [`EntityStore::get_versioned`] plus [`EntityStore::update_if_version`]
//! is the compare-and-swap escape hatch.

use crate::backend::{ChangeEvent, Document, DocumentStore, WriteMode};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::query::Filter;
use crate::record::{self, Record};
use futures::stream::{self, Stream};
use serde::Serialize;
use std::marker::PhantomData;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// An entity together with the document version it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// Typed CRUD over a document store.
#[derive(Clone)]
pub struct EntityStore<S: DocumentStore> {
    backend: S,
}

impl<S: DocumentStore> EntityStore<S> {
    pub fn new(backend: S) -> Self {
        EntityStore { backend }
    }

    /// The underlying document store.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Validate and insert a new entity; returns it with its generated id.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: `Entity::validate` rejected the entity;
    ///   nothing was written
    /// - `Error::StoreUnavailable`: store unreachable
    pub async fn create<T: Entity>(&self, mut entity: T) -> Result<T> {
        entity.validate()?;

        let mut data = entity.to_record()?;
        data.remove("id");
        let id = self.backend.create(T::collection(), data).await?;
        entity.set_id(id);

        debug!("» Created {}/{}", T::collection(), entity.id());
        Ok(entity)
    }

    /// Fetch an entity, or `Error::NotFound`.
    pub async fn get<T: Entity>(&self, id: &str) -> Result<T> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::not_found(T::collection().as_str(), id))
    }

    /// Fetch an entity if it exists.
    pub async fn find<T: Entity>(&self, id: &str) -> Result<Option<T>> {
        Ok(self.get_versioned(id).await?.map(|v| v.value))
    }

    /// Fetch an entity together with its document version.
    pub async fn get_versioned<T: Entity>(&self, id: &str) -> Result<Option<Versioned<T>>> {
        match self.get_document::<T>(id).await? {
            Some(doc) => Ok(Some(Versioned {
                version: doc.version,
                value: decode(doc)?,
            })),
            None => Ok(None),
        }
    }

    /// Fetch the raw stored document of an entity type, undecoded.
    pub async fn get_document<T: Entity>(&self, id: &str) -> Result<Option<Document>> {
        self.backend.get(T::collection(), id).await
    }

    /// Replace the stored entity with `entity`.
    pub async fn put<T: Entity>(&self, entity: &T) -> Result<u64> {
        entity.validate()?;
        self.backend
            .set(
                T::collection(),
                entity.id(),
                entity.to_record()?,
                WriteMode::Replace,
            )
            .await
    }

    /// Write a partial record (`{merge: true}`) or a full one (`Replace`).
    ///
    /// Like the hosted store, writing to a missing id creates the document.
    pub async fn update<T: Entity, P: Serialize>(
        &self,
        id: &str,
        patch: &P,
        mode: WriteMode,
    ) -> Result<u64> {
        let data = record::to_record(patch)?;
        self.backend.set(T::collection(), id, data, mode).await
    }

    /// Like [`EntityStore::update`], but only if the document is still at `expected`.
    pub async fn update_if_version<T: Entity>(
        &self,
        id: &str,
        data: Record,
        mode: WriteMode,
        expected: u64,
    ) -> Result<u64> {
        self.backend
            .set_if_version(T::collection(), id, data, mode, expected)
            .await
    }

    pub async fn delete<T: Entity>(&self, id: &str) -> Result<()> {
        self.backend.delete(T::collection(), id).await
    }

    /// All entities of a type, in store order.
    pub async fn list<T: Entity>(&self) -> Result<Vec<T>> {
        self.query(&Filter::All).await
    }

    /// Entities matching `filter`, in store order.
    ///
    /// Records that no longer match the entity's shape are skipped with a
    /// warning; one malformed document must not hide the rest.
    pub async fn query<T: Entity>(&self, filter: &Filter) -> Result<Vec<T>> {
        Ok(decode_all(self.query_documents::<T>(filter).await?))
    }

    /// Raw documents matching `filter`, for callers that decode field by field.
    pub async fn query_documents<T: Entity>(&self, filter: &Filter) -> Result<Vec<Document>> {
        self.backend.query(T::collection(), filter).await
    }

    /// Live-updating query over one entity type.
    pub fn watch<T: Entity>(&self, filter: Filter) -> LiveQuery<S, T> {
        LiveQuery {
            rx: self.backend.subscribe(T::collection()),
            store: self.clone(),
            filter,
            primed: false,
            _marker: PhantomData,
        }
    }
}

fn decode<T: Entity>(doc: Document) -> Result<T> {
    let mut data = doc.data;
    data.insert("id".to_string(), serde_json::Value::String(doc.id));
    T::from_record(data)
}

fn decode_all<T: Entity>(docs: Vec<Document>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match decode::<T>(doc) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!("Skipping malformed {}/{}: {}", T::collection(), id, e);
                    None
                }
            }
        })
        .collect()
}

/// A query that yields a fresh result set whenever its collection changes.
///
/// The first call to [`LiveQuery::next`] returns the current snapshot
/// immediately; later calls wait for at least one change notification,
/// coalesce any burst of pending notifications, and re-run the query.
pub struct LiveQuery<S: DocumentStore, T: Entity> {
    store: EntityStore<S>,
    filter: Filter,
    rx: broadcast::Receiver<ChangeEvent>,
    primed: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<S: DocumentStore, T: Entity> LiveQuery<S, T> {
    /// Current result set, without waiting.
    pub async fn current(&self) -> Result<Vec<T>> {
        Ok(decode_all(self.current_documents().await?))
    }

    /// Current result set as raw documents.
    pub async fn current_documents(&self) -> Result<Vec<Document>> {
        self.store.query_documents::<T>(&self.filter).await
    }

    /// Next result set.
    ///
    /// # Errors
    ///
    /// - `Error::StoreUnavailable`: the change feed closed or a re-query failed
    pub async fn next(&mut self) -> Result<Vec<T>> {
        Ok(decode_all(self.next_documents().await?))
    }

    /// Like [`LiveQuery::next`], returning raw documents.
    pub async fn next_documents(&mut self) -> Result<Vec<Document>> {
        if self.primed {
            self.wait_for_change().await?;
        }
        self.primed = true;
        self.current_documents().await
    }

    /// Consume into a `Stream` of result sets.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>>> {
        stream::unfold(self, |mut live| async move {
            let item = live.next().await;
            Some((item, live))
        })
    }

    async fn wait_for_change(&mut self) -> Result<()> {
        match self.rx.recv().await {
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!("Live query on {} lagged by {} events", T::collection(), skipped);
            }
            Err(RecvError::Closed) => {
                return Err(Error::StoreUnavailable(format!(
                    "change feed for {} closed",
                    T::collection()
                )))
            }
        }

        loop {
            match self.rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Closed) => {
                    return Err(Error::StoreUnavailable(format!(
                        "change feed for {} closed",
                        T::collection()
                    )))
                }
            }
        }
    }
}
