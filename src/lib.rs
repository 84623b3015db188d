//! # bizops-kit
//!
//! Domain core for a small business-operations app: customers, an employee
//! roster, tasks, and invoices whose line items carry a per-item status log.
//!
//! ## Features
//!
//! - **Backend Agnostic:** Entity store over any [`DocumentStore`]; an in-memory store ships in the box
//! - **Typed Records:** Customers, employees, invoices, tasks as plain serde structs
//! - **Live Queries:** Result sets that refresh on every store change
//! - **Safe Item Edits:** Status appends keep log and mirror in one write, with compare-and-swap by default
//! - **Advisor Contracts:** Request/response shapes for task assignment and invoice extraction
//!
//! ## Quick Start
//!
//! ```ignore
//! use bizops_kit::{
//!     OpsService, backend::InMemoryStore, advisor::ScriptedClient,
//!     model::{NewCustomer, Invoice, InvoiceItem, ItemStatus},
//!     reconcile::StatusUpdate,
//! };
//!
//! let ops = OpsService::new(InMemoryStore::new(), ScriptedClient::new());
//!
//! // 1. A customer and an invoice for them
//! let customer = ops.add_customer(NewCustomer::named("Asha Traders")).await?;
//! let invoice = ops
//!     .store()
//!     .create(Invoice::new(&customer.id, Some("INV-1".into()), "2024-01-01",
//!         vec![InvoiceItem::new("Cleaning", 1.0, 100.0)]))
//!     .await?;
//!
//! // 2. Record a status change on item 0
//! ops.record_service_status(&invoice.id, 0,
//!     StatusUpdate::new(ItemStatus::Completed, today)).await?;
//!
//! // 3. The customer's flattened service list
//! let services = ops.customer_services(&customer.id).await?;
//! ```
//!
//! ## Layers
//!
//! ```text
//! OpsService ──► Reconciler ──► EntityStore<S> ──► S: DocumentStore
//!     │                              │
//!     ├─► aggregate / dashboard      └─► LiveQuery (change feed)
//!     └─► advisor::{assignment, extraction} ──► C: ReasoningClient
//! ```

#[macro_use]
extern crate log;

pub mod advisor;
pub mod aggregate;
pub mod backend;
pub mod config;
pub mod dashboard;
pub mod dates;
pub mod entity;
pub mod error;
pub mod model;
pub mod notify;
pub mod observability;
pub mod path;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use aggregate::{
    services_for_customer, services_from_documents, CustomerServicesView, ServiceLine,
};
pub use backend::DocumentStore;
pub use config::OpsConfig;
pub use entity::Entity;
pub use error::{Error, Result};
pub use notify::Notification;
pub use reconcile::{ReconcileConfig, ReconcileOutcome, Reconciler, StatusUpdate, WriteStrategy};
pub use service::OpsService;
pub use store::{EntityStore, LiveQuery};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
