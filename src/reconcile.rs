//! Service status reconciliation.
//!
//! Appending a status to one line item of an invoice is a read-modify-write
//! of the whole invoice document:
//!
//! ```text
//! read invoice (version v)
//!   └─ items[slot].statusHistory += entry
//!      items[slot].status        = entry.status   ┐ mirror of the
//!      items[slot].processedDate = entry.date     ┘ last entry
//! merge-write { items: [...] }            (other invoice fields untouched)
//! ```
//!
//! Log and mirror always travel in the same write, so a successful write
//! never leaves them disagreeing.
//!
//! Only `items[slot]` is decoded and edited. Every other element of the
//! array is written back exactly as it was read, including fields this
//! crate does not model and dates in older formats. Keys of the target item
//! that the edit does not own are kept as stored too.
//!
//! # Write strategies
//!
//! | Strategy | Write | Concurrent edit of another slot |
//! |---|---|---|
//! | `CompareAndSwap` (default) | only if still at version `v` | re-read, re-apply, retry; both edits survive |
//! | `LastWriterWins` | unconditional | silently lost (full-array overwrite) |
//!
//! # Missing targets
//!
//! If the invoice is gone, or the slot no longer exists, nothing is written
//! and the call returns [`ReconcileOutcome::Skipped`].

use crate::backend::{DocumentStore, WriteMode};
use crate::config::{DEFAULT_RETRY_BACKOFF, DEFAULT_RETRY_COUNT};
use crate::dates;
use crate::error::{Error, Result};
use crate::model::invoice::{
    stored_items, Invoice, InvoiceItem, ItemFields, ItemStatus, StatusHistory,
};
use crate::observability::{NoOpMetrics, OpsMetrics};
use crate::path::{Collection, DocumentPath};
use crate::record::{self, Record};
use crate::store::EntityStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// How the reconciler writes the rebuilt item array back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// **CompareAndSwap**: write only if the invoice is unchanged since it was
    /// read; on conflict re-read and re-apply.
    #[default]
    CompareAndSwap,

    /// **LastWriterWins**: unconditional merge-write of the item array.
    ///
    /// A concurrent change to a different slot of the same invoice is
    /// overwritten by whichever write lands last.
    LastWriterWins,
}

impl fmt::Display for WriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStrategy::CompareAndSwap => write!(f, "cas"),
            WriteStrategy::LastWriterWins => write!(f, "last-writer-wins"),
        }
    }
}

impl FromStr for WriteStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cas" | "compare-and-swap" => Ok(WriteStrategy::CompareAndSwap),
            "lww" | "last-writer-wins" => Ok(WriteStrategy::LastWriterWins),
            other => Err(Error::ConfigError(format!(
                "unknown write strategy '{}' (expected 'cas' or 'last-writer-wins')",
                other
            ))),
        }
    }
}

/// Per-reconciler settings.
///
/// ```ignore
/// let config = ReconcileConfig::default()
///     .with_strategy(WriteStrategy::CompareAndSwap)
///     .with_retry(5);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileConfig {
    pub strategy: WriteStrategy,
    /// Extra attempts after a lost compare-and-swap (0 = fail on first conflict).
    pub retry_count: u32,
    /// Backoff before the first retry; doubled for each further one.
    pub retry_backoff: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            strategy: WriteStrategy::default(),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl ReconcileConfig {
    pub fn with_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// A status change to record against one item.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    pub status: ItemStatus,
    pub effective_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl StatusUpdate {
    /// Status change effective on `effective_date`, stamped now.
    pub fn new(status: ItemStatus, effective_date: NaiveDate) -> Self {
        StatusUpdate {
            status,
            effective_date,
            updated_at: Utc::now(),
            notes: None,
        }
    }

    pub fn at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Attach notes. Blank notes are dropped.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        let notes = notes.into();
        self.notes = if notes.trim().is_empty() {
            None
        } else {
            Some(notes)
        };
        self
    }

    pub fn to_entry(&self) -> StatusHistory {
        StatusHistory {
            status: self.status,
            date: self.effective_date,
            updated_at: self.updated_at,
            notes: self.notes.clone(),
        }
    }
}

/// Why a reconciliation wrote nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    InvoiceMissing,
    SlotMissing { len: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvoiceMissing => write!(f, "invoice missing"),
            SkipReason::SlotMissing { len } => write!(f, "slot missing ({} items)", len),
        }
    }
}

/// Result of a reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// The write landed; `item` is the slot's new content.
    Applied { item: InvoiceItem, version: u64 },
    /// Target vanished before the write; nothing was written.
    Skipped(SkipReason),
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }

    pub fn item(&self) -> Option<&InvoiceItem> {
        match self {
            ReconcileOutcome::Applied { item, .. } => Some(item),
            ReconcileOutcome::Skipped(_) => None,
        }
    }
}

/// Rebuild `items` with `entry` appended to the item at `slot`.
///
/// Returns `None` when `slot` is out of range. No other slot is touched.
pub fn apply_status(
    items: &[InvoiceItem],
    slot: usize,
    entry: StatusHistory,
) -> Option<Vec<InvoiceItem>> {
    rebuild(items, slot, &ItemEdit::AppendStatus(entry))
}

/// Rebuild `items` with `fields` applied to the item at `slot`.
pub fn apply_fields(
    items: &[InvoiceItem],
    slot: usize,
    fields: &ItemFields,
) -> Option<Vec<InvoiceItem>> {
    rebuild(items, slot, &ItemEdit::Fields(fields))
}

fn rebuild(items: &[InvoiceItem], slot: usize, edit: &ItemEdit<'_>) -> Option<Vec<InvoiceItem>> {
    let mut items = items.to_vec();
    edit.apply_to(items.get_mut(slot)?);
    Some(items)
}

/// Check an effective date the way the status form's calendar does.
///
/// The date may not lie after `today` and must be strictly after the date of
/// the last history entry. The reconciler itself never calls this; callers
/// that accept user input must.
///
/// # Errors
///
/// `Error::ValidationError` describing the violated bound.
pub fn check_effective_date(
    history: &[StatusHistory],
    date: NaiveDate,
    today: NaiveDate,
) -> Result<()> {
    if date > today {
        return Err(Error::ValidationError(format!(
            "effective date {} is in the future",
            date
        )));
    }
    if let Some(last) = history.last() {
        if date <= last.date {
            return Err(Error::ValidationError(format!(
                "effective date {} must be after the last update on {}",
                date, last.date
            )));
        }
    }
    Ok(())
}

/// Upper bound for a single retry delay.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_BACKOFF)
}

/// One edit to a single stored item.
enum ItemEdit<'a> {
    AppendStatus(StatusHistory),
    Fields(&'a ItemFields),
}

impl ItemEdit<'_> {
    fn apply_to(&self, item: &mut InvoiceItem) {
        match self {
            ItemEdit::AppendStatus(entry) => item.push_status(entry.clone()),
            ItemEdit::Fields(fields) => fields.apply(item),
        }
    }

    /// Write the edit into the item's stored JSON. Must agree with `apply_to`.
    fn write_to(&self, item: &mut Record) -> Result<()> {
        match self {
            ItemEdit::AppendStatus(entry) => {
                let encoded = serde_json::to_value(entry)?;
                match item.get_mut("statusHistory") {
                    Some(Value::Array(log)) => log.push(encoded),
                    _ => {
                        item.insert("statusHistory".to_string(), Value::Array(vec![encoded]));
                    }
                }
                item.insert("status".to_string(), serde_json::to_value(entry.status)?);
                item.insert(
                    "processedDate".to_string(),
                    Value::String(dates::format_date(entry.date)),
                );
            }
            ItemEdit::Fields(fields) => {
                if let Some(ack) = &fields.acknowledgment_number {
                    item.insert("acknowledgmentNumber".to_string(), Value::String(ack.clone()));
                }
                if let Some(name) = &fields.name {
                    item.insert("name".to_string(), Value::String(name.clone()));
                }
            }
        }
        Ok(())
    }
}

enum SlotEdit {
    Edited { items: Vec<Value>, item: InvoiceItem },
    Missing { len: usize },
}

/// Apply `edit` to `items[slot]` of a stored invoice record.
///
/// Only the target is decoded; a target that does not decode is an error and
/// nothing is written. Other elements are copied through untouched.
fn edit_stored_slot(invoice: &Record, slot: usize, edit: &ItemEdit<'_>) -> Result<SlotEdit> {
    let mut items = stored_items(invoice)?.to_vec();
    let len = items.len();

    let target = match items.get_mut(slot) {
        None => return Ok(SlotEdit::Missing { len }),
        Some(Value::Object(target)) => target,
        Some(_) => {
            return Err(Error::DeserializationError(format!(
                "item {} is not an object",
                slot
            )))
        }
    };
    let mut item: InvoiceItem = record::from_record(target.clone())?;
    edit.apply_to(&mut item);
    edit.write_to(target)?;

    Ok(SlotEdit::Edited { items, item })
}

/// Applies item-level edits to invoices stored in an [`EntityStore`].
pub struct Reconciler<S: DocumentStore> {
    store: EntityStore<S>,
    metrics: Box<dyn OpsMetrics>,
    config: ReconcileConfig,
}

impl<S: DocumentStore> Reconciler<S> {
    pub fn new(store: EntityStore<S>) -> Self {
        Reconciler {
            store,
            metrics: Box::new(NoOpMetrics),
            config: ReconcileConfig::default(),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn OpsMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Append a status entry to `items[slot]` of `invoice_id` and refresh the
    /// item's mirrored `status` / `processedDate`.
    ///
    /// Ordering against earlier entries is not re-checked here; see
    /// [`check_effective_date`].
    ///
    /// # Errors
    ///
    /// - `Error::StoreUnavailable`: read or write failed
    /// - `Error::VersionConflict`: compare-and-swap still losing after all retries
    pub async fn append_status(
        &self,
        invoice_id: &str,
        slot: usize,
        update: StatusUpdate,
    ) -> Result<ReconcileOutcome> {
        let entry = update.to_entry();
        debug!(
            "» Append status '{}' to invoices/{}[{}]",
            entry.status, invoice_id, slot
        );
        self.reconcile(invoice_id, slot, &ItemEdit::AppendStatus(entry))
            .await
    }

    /// Overwrite non-history fields of `items[slot]`. Never touches the log.
    pub async fn update_item_fields(
        &self,
        invoice_id: &str,
        slot: usize,
        fields: &ItemFields,
    ) -> Result<ReconcileOutcome> {
        debug!("» Update fields of invoices/{}[{}]", invoice_id, slot);
        self.reconcile(invoice_id, slot, &ItemEdit::Fields(fields))
            .await
    }

    async fn reconcile(
        &self,
        invoice_id: &str,
        slot: usize,
        edit: &ItemEdit<'_>,
    ) -> Result<ReconcileOutcome> {
        let path = DocumentPath::new(Collection::Invoices, invoice_id).to_string();
        let timer = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            let current = match self.store.get_document::<Invoice>(invoice_id).await {
                Ok(Some(current)) => current,
                Ok(None) => {
                    self.metrics
                        .record_skipped(&path, &SkipReason::InvoiceMissing.to_string());
                    return Ok(ReconcileOutcome::Skipped(SkipReason::InvoiceMissing));
                }
                Err(e) => {
                    self.metrics.record_error(&path, &e.to_string());
                    return Err(e);
                }
            };

            let (items, updated) = match edit_stored_slot(&current.data, slot, edit) {
                Ok(SlotEdit::Edited { items, item }) => (items, item),
                Ok(SlotEdit::Missing { len }) => {
                    let reason = SkipReason::SlotMissing { len };
                    self.metrics.record_skipped(&path, &reason.to_string());
                    return Ok(ReconcileOutcome::Skipped(reason));
                }
                Err(e) => {
                    self.metrics.record_error(&path, &e.to_string());
                    return Err(e);
                }
            };
            let mut patch = Record::new();
            patch.insert("items".to_string(), Value::Array(items));

            let written = match self.config.strategy {
                WriteStrategy::LastWriterWins => {
                    self.store
                        .update::<Invoice, _>(invoice_id, &patch, WriteMode::Merge)
                        .await
                }
                WriteStrategy::CompareAndSwap => {
                    self.store
                        .update_if_version::<Invoice>(
                            invoice_id,
                            patch,
                            WriteMode::Merge,
                            current.version,
                        )
                        .await
                }
            };

            match written {
                Ok(version) => {
                    self.metrics.record_applied(&path, timer.elapsed());
                    info!(
                        "✓ Reconciled {}[{}] -> v{} in {:?}",
                        path,
                        slot,
                        version,
                        timer.elapsed()
                    );
                    return Ok(ReconcileOutcome::Applied {
                        item: updated,
                        version,
                    });
                }
                Err(Error::VersionConflict { .. }) if attempts <= self.config.retry_count => {
                    self.metrics.record_conflict(&path, attempts);
                    let delay = backoff_delay(self.config.retry_backoff, attempts);
                    debug!(
                        "Conflict on {} (attempt {}/{}), retrying in {:?}",
                        path,
                        attempts,
                        self.config.retry_count + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.metrics.record_error(&path, &e.to_string());
                    return Err(e);
                }
            }
        }
    }
}
