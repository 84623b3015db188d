//! Invoices, their line items, and per-item status history.
//!
//! An [`Invoice`] owns its ordered item list. The position of an item in that
//! list is its *slot*, the address every partial update uses. Each
//! [`InvoiceItem`] owns an append-only [`StatusHistory`] log; its top-level
//! `status` / `processed_date` are a denormalized copy of the last log entry.
//!
//! The mirrored fields have no public setters. The only way to change them is
//! [`Reconciler::append_status`](crate::reconcile::Reconciler::append_status),
//! which appends to the log and rewrites the mirror in one document write.

use crate::dates;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::path::Collection;
use crate::record::Record;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Processing status of a single service line item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    #[serde(rename = "Under Process")]
    UnderProcess,
    Completed,
    #[serde(rename = "Cancelled by Customer")]
    CancelledByCustomer,
}

impl ItemStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::UnderProcess => "Under Process",
            ItemStatus::Completed => "Completed",
            ItemStatus::CancelledByCustomer => "Cancelled by Customer",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of an item's status log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistory {
    pub status: ItemStatus,
    /// Effective date of the change, chosen by the user.
    #[serde(with = "dates::date")]
    pub date: NaiveDate,
    /// Wall-clock time the entry was appended.
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A billed line item, editable in place inside its invoice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub name: String,
    pub quantity: f64,
    pub price: f64,
    /// Expected to equal `quantity * price`; not enforced.
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledgment_number: Option<String>,
    #[serde(
        default,
        with = "dates::optional_date",
        skip_serializing_if = "Option::is_none"
    )]
    processed_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    status_history: Vec<StatusHistory>,
}

impl InvoiceItem {
    /// New item with `total = quantity * price`.
    pub fn new(name: impl Into<String>, quantity: f64, price: f64) -> Self {
        Self::with_total(name, quantity, price, quantity * price)
    }

    /// New item with a total taken as given (e.g. read off a scanned invoice).
    pub fn with_total(name: impl Into<String>, quantity: f64, price: f64, total: f64) -> Self {
        InvoiceItem {
            name: name.into(),
            quantity,
            price,
            total,
            acknowledgment_number: None,
            processed_date: None,
            status: None,
            status_history: Vec::new(),
        }
    }

    pub fn status(&self) -> Option<ItemStatus> {
        self.status
    }

    pub fn processed_date(&self) -> Option<NaiveDate> {
        self.processed_date
    }

    pub fn status_history(&self) -> &[StatusHistory] {
        &self.status_history
    }

    pub fn last_status_entry(&self) -> Option<&StatusHistory> {
        self.status_history.last()
    }

    /// Status for display: the mirror, falling back to the last log entry
    /// for records written before the mirror existed.
    pub fn current_status(&self) -> Option<ItemStatus> {
        self.status
            .or_else(|| self.last_status_entry().map(|h| h.status))
    }

    /// Processed date for display, with the same fallback as `current_status`.
    pub fn current_processed_date(&self) -> Option<NaiveDate> {
        self.processed_date
            .or_else(|| self.last_status_entry().map(|h| h.date))
    }

    /// True when the mirrored fields equal the last history entry.
    ///
    /// Items without history are consistent by definition.
    pub fn is_mirror_consistent(&self) -> bool {
        match self.last_status_entry() {
            Some(last) => {
                self.status == Some(last.status) && self.processed_date == Some(last.date)
            }
            None => true,
        }
    }

    /// Decode one element of a stored `items` array.
    pub fn from_stored(raw: &Value) -> Result<Self> {
        InvoiceItem::deserialize(raw).map_err(|e| Error::DeserializationError(e.to_string()))
    }

    /// Append a log entry and rewrite the mirror from it.
    pub(crate) fn push_status(&mut self, entry: StatusHistory) {
        self.status = Some(entry.status);
        self.processed_date = Some(entry.date);
        self.status_history.push(entry);
    }
}

/// Non-history fields of an item that may be edited in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemFields {
    pub acknowledgment_number: Option<String>,
    pub name: Option<String>,
}

impl ItemFields {
    pub fn acknowledgment(number: impl Into<String>) -> Self {
        ItemFields {
            acknowledgment_number: Some(number.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.acknowledgment_number.is_none() && self.name.is_none()
    }

    /// Overwrite the set fields on `item`. Applying twice equals applying once.
    pub fn apply(&self, item: &mut InvoiceItem) {
        if let Some(ack) = &self.acknowledgment_number {
            item.acknowledgment_number = Some(ack.clone());
        }
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
    }
}

/// An invoice document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    /// Weak reference; the customer may have been deleted.
    pub customer_id: String,
    /// Invoice date as printed on the document.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    /// Sum of item totals at creation time. Later item edits do not touch it.
    #[serde(default)]
    pub total: f64,
}

impl Invoice {
    /// New invoice with its total computed from `items`.
    pub fn new(
        customer_id: impl Into<String>,
        invoice_number: Option<String>,
        date: impl Into<String>,
        items: Vec<InvoiceItem>,
    ) -> Self {
        let total = items_total(&items);
        Invoice {
            id: String::new(),
            invoice_number,
            customer_id: customer_id.into(),
            date: date.into(),
            items,
            total,
        }
    }
}

/// The `items` array of a stored invoice record, exactly as stored.
///
/// A missing or null `items` field reads as no items.
///
/// # Errors
///
/// `Error::DeserializationError` when `items` is not an array.
pub fn stored_items(invoice: &Record) -> Result<&[Value]> {
    match invoice.get("items") {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(Error::DeserializationError(
            "invoice items is not an array".to_string(),
        )),
    }
}

/// Sum of line totals.
pub fn items_total(items: &[InvoiceItem]) -> f64 {
    items.iter().map(|item| item.total).sum()
}

impl Entity for Invoice {
    fn collection() -> Collection {
        Collection::Invoices
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<()> {
        if self.customer_id.trim().is_empty() {
            return Err(Error::ValidationError(
                "invoice must reference a customer".into(),
            ));
        }
        Ok(())
    }
}
