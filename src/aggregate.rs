//! Per-customer service view.
//!
//! A customer's "services" are every line item of every invoice that
//! references them, flattened into one list. Each line keeps the address
//! (`invoice_id`, `slot`) the reconciler needs to edit it later.
//!
//! The view is derived, never stored. [`services_for_customer`] is the pure
//! projection over decoded invoices. [`services_from_documents`] is the same
//! projection over stored records, decoding item by item so one malformed
//! item hides only itself. [`CustomerServicesView`] re-runs the latter
//! whenever the invoices collection changes or the selected customer changes.

use crate::backend::{Document, DocumentStore};
use crate::error::Result;
use crate::model::invoice::{stored_items, Invoice, InvoiceItem};
use crate::query::Filter;
use crate::store::{EntityStore, LiveQuery};
use serde_json::Value;

/// One service line item, tagged with where it lives.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceLine {
    pub item: InvoiceItem,
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    /// Index of `item` inside its invoice's item list.
    pub slot: usize,
}

/// Flatten the items of every invoice belonging to `customer_id`.
///
/// Invoice order is preserved, then item order within each invoice. Nothing
/// is de-duplicated.
pub fn services_for_customer(customer_id: &str, invoices: &[Invoice]) -> Vec<ServiceLine> {
    invoices
        .iter()
        .filter(|invoice| invoice.customer_id == customer_id)
        .flat_map(|invoice| {
            invoice
                .items
                .iter()
                .enumerate()
                .map(move |(slot, item)| ServiceLine {
                    item: item.clone(),
                    invoice_id: invoice.id.clone(),
                    invoice_number: invoice.invoice_number.clone(),
                    slot,
                })
        })
        .collect()
}

/// [`services_for_customer`] over raw invoice documents.
///
/// Items that fail to decode are skipped with a warning. Their siblings keep
/// their original slots, so later edits still address the right element.
pub fn services_from_documents(customer_id: &str, docs: &[Document]) -> Vec<ServiceLine> {
    docs.iter()
        .filter(|doc| doc.data.get("customerId").and_then(Value::as_str) == Some(customer_id))
        .flat_map(document_lines)
        .collect()
}

fn document_lines(doc: &Document) -> Vec<ServiceLine> {
    let items = match stored_items(&doc.data) {
        Ok(items) => items,
        Err(e) => {
            warn!("Skipping invoices/{}: {}", doc.id, e);
            return Vec::new();
        }
    };
    let invoice_number = doc
        .data
        .get("invoiceNumber")
        .and_then(Value::as_str)
        .map(str::to_string);

    items
        .iter()
        .enumerate()
        .filter_map(|(slot, raw)| match InvoiceItem::from_stored(raw) {
            Ok(item) => Some(ServiceLine {
                item,
                invoice_id: doc.id.clone(),
                invoice_number: invoice_number.clone(),
                slot,
            }),
            Err(e) => {
                warn!("Skipping invoices/{}[{}]: {}", doc.id, slot, e);
                None
            }
        })
        .collect()
}

fn customer_filter(customer_id: &str) -> Filter {
    Filter::eq("customerId", customer_id)
}

/// Live service list for one customer.
///
/// ```ignore
/// let mut view = CustomerServicesView::new(store.clone(), "c1");
/// let lines = view.next().await?;      // immediate snapshot
/// let lines = view.next().await?;      // after the next invoice change
/// ```
pub struct CustomerServicesView<S: DocumentStore> {
    store: EntityStore<S>,
    customer_id: String,
    live: LiveQuery<S, Invoice>,
}

impl<S: DocumentStore> CustomerServicesView<S> {
    pub fn new(store: EntityStore<S>, customer_id: impl Into<String>) -> Self {
        let customer_id = customer_id.into();
        let live = store.watch(customer_filter(&customer_id));
        CustomerServicesView {
            store,
            customer_id,
            live,
        }
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Switch to another customer. The next call to `next` returns the new
    /// customer's snapshot without waiting for a change.
    pub fn select_customer(&mut self, customer_id: impl Into<String>) {
        self.customer_id = customer_id.into();
        self.live = self.store.watch(customer_filter(&self.customer_id));
        debug!("Services view now tracking customer {}", self.customer_id);
    }

    /// Current service list, without waiting.
    pub async fn current(&self) -> Result<Vec<ServiceLine>> {
        let docs = self.live.current_documents().await?;
        Ok(services_from_documents(&self.customer_id, &docs))
    }

    /// Next service list; see [`LiveQuery::next`].
    pub async fn next(&mut self) -> Result<Vec<ServiceLine>> {
        let docs = self.live.next_documents().await?;
        Ok(services_from_documents(&self.customer_id, &docs))
    }
}
