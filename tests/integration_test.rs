//! Integration tests for bizops-kit
//!
//! These tests drive the public API end to end: store, reconciler,
//! aggregation, advisors and the service flows.

use bizops_kit::advisor::ScriptedClient;
use bizops_kit::backend::{ChangeEvent, Document, DocumentStore, InMemoryStore, WriteMode};
use bizops_kit::model::{Invoice, InvoiceItem, ItemFields, ItemStatus, NewCustomer, NewEmployee, Priority};
use bizops_kit::notify::{Notification, NotificationKind};
use bizops_kit::observability::OpsMetrics;
use bizops_kit::path::Collection;
use bizops_kit::query::Filter;
use bizops_kit::record::Record;
use bizops_kit::{
    services_for_customer, EntityStore, Error, OpsConfig, OpsService, ReconcileConfig,
    ReconcileOutcome, Reconciler, Result, StatusUpdate, WriteStrategy,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

async fn single_item_invoice(store: &EntityStore<InMemoryStore>) -> Invoice {
    store
        .create(Invoice::new(
            "CUS-1",
            Some("INV-1".into()),
            "2024-01-01",
            vec![InvoiceItem::new("Cleaning", 1.0, 100.0)],
        ))
        .await
        .expect("Failed to create invoice")
}

/// Scenario A: first status on a fresh item.
#[tokio::test]
async fn test_first_status_sets_mirror() {
    let store = EntityStore::new(InMemoryStore::new());
    let invoice = single_item_invoice(&store).await;
    let reconciler = Reconciler::new(store.clone());

    reconciler
        .append_status(
            &invoice.id,
            0,
            StatusUpdate::new(ItemStatus::Completed, ymd(2024, 1, 10))
                .at(at("2024-01-10T12:00:00Z")),
        )
        .await
        .expect("Failed to append status");

    let stored: Invoice = store.get(&invoice.id).await.expect("Failed to get");
    let item = &stored.items[0];
    assert_eq!(item.status(), Some(ItemStatus::Completed));
    assert_eq!(item.processed_date(), Some(ymd(2024, 1, 10)));
    assert_eq!(item.status_history().len(), 1);

    let last = item.last_status_entry().expect("history entry");
    assert_eq!(last.updated_at, at("2024-01-10T12:00:00Z"));
    assert_eq!(last.notes, None);
}

/// Scenario B: a second status appends and moves the mirror.
#[tokio::test]
async fn test_second_status_appends() {
    let store = EntityStore::new(InMemoryStore::new());
    let invoice = single_item_invoice(&store).await;
    let reconciler = Reconciler::new(store.clone());

    reconciler
        .append_status(
            &invoice.id,
            0,
            StatusUpdate::new(ItemStatus::Completed, ymd(2024, 1, 10))
                .at(at("2024-01-10T12:00:00Z")),
        )
        .await
        .expect("Failed to append status");
    reconciler
        .append_status(
            &invoice.id,
            0,
            StatusUpdate::new(ItemStatus::CancelledByCustomer, ymd(2024, 1, 15))
                .at(at("2024-01-15T09:30:00Z"))
                .with_notes("customer withdrew"),
        )
        .await
        .expect("Failed to append status");

    let stored: Invoice = store.get(&invoice.id).await.expect("Failed to get");
    let item = &stored.items[0];
    assert_eq!(item.status_history().len(), 2);
    assert_eq!(item.status_history()[0].status, ItemStatus::Completed);
    assert_eq!(
        item.last_status_entry().map(|h| h.status),
        Some(ItemStatus::CancelledByCustomer)
    );
    assert_eq!(item.status(), Some(ItemStatus::CancelledByCustomer));
    assert_eq!(item.processed_date(), Some(ymd(2024, 1, 15)));
    assert!(item.is_mirror_consistent());
}

/// Scenario C: services are flattened per customer only.
#[tokio::test]
async fn test_services_for_customer_across_invoices() {
    let store = EntityStore::new(InMemoryStore::new());
    for (customer, items) in [
        ("CUS-1", vec!["Cleaning", "Painting"]),
        ("CUS-2", vec!["Plumbing"]),
        ("CUS-1", vec!["Audit"]),
    ] {
        store
            .create(Invoice::new(
                customer,
                None,
                "2024-01-01",
                items
                    .into_iter()
                    .map(|name| InvoiceItem::new(name, 1.0, 10.0))
                    .collect(),
            ))
            .await
            .expect("Failed to create invoice");
    }

    let invoices: Vec<Invoice> = store.list().await.expect("Failed to list");
    let lines = services_for_customer("CUS-1", &invoices);

    assert_eq!(lines.len(), 3);
    let names: Vec<&str> = lines.iter().map(|l| l.item.name.as_str()).collect();
    assert_eq!(names, vec!["Cleaning", "Painting", "Audit"]);
    assert!(lines.iter().all(|l| l.item.name != "Plumbing"));
    assert_eq!(lines[1].slot, 1);
    assert_eq!(lines[2].slot, 0);
}

/// Editing a service line through its (invoice, slot) address lands on the
/// right item.
#[tokio::test]
async fn test_service_line_address_round_trips() {
    let store = EntityStore::new(InMemoryStore::new());
    store
        .create(Invoice::new(
            "CUS-1",
            None,
            "2024-01-01",
            vec![
                InvoiceItem::new("Cleaning", 1.0, 100.0),
                InvoiceItem::new("Painting", 1.0, 300.0),
            ],
        ))
        .await
        .expect("Failed to create invoice");
    let reconciler = Reconciler::new(store.clone());

    let invoices: Vec<Invoice> = store.list().await.expect("Failed to list");
    let line = services_for_customer("CUS-1", &invoices)
        .into_iter()
        .find(|l| l.item.name == "Painting")
        .expect("line present");

    reconciler
        .update_item_fields(&line.invoice_id, line.slot, &ItemFields::acknowledgment("ACK-3"))
        .await
        .expect("Failed to update");

    let stored: Invoice = store.get(&line.invoice_id).await.expect("Failed to get");
    assert_eq!(stored.items[1].acknowledgment_number.as_deref(), Some("ACK-3"));
    assert_eq!(stored.items[0].acknowledgment_number, None);
}

// ============================================================================
// Concurrent edits of one invoice
// ============================================================================

/// Store that lets another writer sneak in right after the first invoice read.
///
/// The interleaved write sets `acknowledgmentNumber = "RACE"` on slot 1
/// directly in the underlying store.
#[derive(Clone)]
struct RacingStore {
    inner: InMemoryStore,
    armed: Arc<AtomicBool>,
}

impl RacingStore {
    fn new(inner: InMemoryStore) -> Self {
        RacingStore {
            inner,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    async fn interleave(&self, doc: &Document) -> Result<()> {
        let mut items = doc.data.get("items").cloned().unwrap_or(Value::Null);
        items[1]["acknowledgmentNumber"] = json!("RACE");
        let mut patch = Record::new();
        patch.insert("items".into(), items);
        self.inner
            .set(Collection::Invoices, &doc.id, patch, WriteMode::Merge)
            .await?;
        Ok(())
    }
}

impl DocumentStore for RacingStore {
    async fn create(&self, collection: Collection, data: Record) -> Result<String> {
        self.inner.create(collection, data).await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>> {
        let doc = self.inner.get(collection, id).await?;
        if collection == Collection::Invoices && self.armed.swap(false, Ordering::SeqCst) {
            if let Some(doc) = &doc {
                self.interleave(doc).await?;
            }
        }
        Ok(doc)
    }

    async fn set(
        &self,
        collection: Collection,
        id: &str,
        data: Record,
        mode: WriteMode,
    ) -> Result<u64> {
        self.inner.set(collection, id, data, mode).await
    }

    async fn set_if_version(
        &self,
        collection: Collection,
        id: &str,
        data: Record,
        mode: WriteMode,
        expected: u64,
    ) -> Result<u64> {
        self.inner
            .set_if_version(collection, id, data, mode, expected)
            .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.inner.delete(collection, id).await
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>> {
        self.inner.list(collection).await
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        self.inner.subscribe(collection)
    }
}

#[derive(Default)]
struct ConflictCounter {
    conflicts: AtomicU32,
}

impl OpsMetrics for ConflictCounter {
    fn record_conflict(&self, _path: &str, _attempt: u32) {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
    }
}

async fn racing_setup() -> (InMemoryStore, RacingStore, String) {
    let inner = InMemoryStore::new();
    let invoice = EntityStore::new(inner.clone())
        .create(Invoice::new(
            "CUS-1",
            None,
            "2024-01-01",
            vec![
                InvoiceItem::new("Cleaning", 1.0, 100.0),
                InvoiceItem::new("Painting", 1.0, 300.0),
            ],
        ))
        .await
        .expect("Failed to create invoice");
    let racing = RacingStore::new(inner.clone());
    (inner, racing, invoice.id)
}

/// Last-writer-wins rewrites the whole array from a stale read and drops the
/// concurrent edit of the other slot.
#[tokio::test]
async fn test_last_writer_wins_loses_concurrent_slot_edit() {
    let (inner, racing, invoice_id) = racing_setup().await;
    let reconciler = Reconciler::new(EntityStore::new(racing))
        .with_config(ReconcileConfig::default().with_strategy(WriteStrategy::LastWriterWins));

    let outcome = reconciler
        .append_status(
            &invoice_id,
            0,
            StatusUpdate::new(ItemStatus::Completed, ymd(2024, 1, 10)),
        )
        .await
        .expect("Failed to append");
    assert!(outcome.is_applied());

    let stored: Invoice = EntityStore::new(inner)
        .get(&invoice_id)
        .await
        .expect("Failed to get");
    assert_eq!(stored.items[0].status(), Some(ItemStatus::Completed));
    assert_eq!(stored.items[1].acknowledgment_number, None);
}

/// Compare-and-swap detects the interleaved write, re-reads, and keeps both
/// edits.
#[tokio::test]
async fn test_compare_and_swap_keeps_concurrent_slot_edit() {
    let (inner, racing, invoice_id) = racing_setup().await;
    let counter = Arc::new(ConflictCounter::default());
    let reconciler = Reconciler::new(EntityStore::new(racing))
        .with_config(ReconcileConfig::default().with_backoff(Duration::from_millis(1)))
        .with_metrics(Box::new(counter.clone()));

    let outcome = reconciler
        .append_status(
            &invoice_id,
            0,
            StatusUpdate::new(ItemStatus::Completed, ymd(2024, 1, 10)),
        )
        .await
        .expect("Failed to append");

    match outcome {
        ReconcileOutcome::Applied { version, .. } => assert_eq!(version, 3),
        other => panic!("expected applied, got {:?}", other),
    }
    assert_eq!(counter.conflicts.load(Ordering::SeqCst), 1);

    let stored: Invoice = EntityStore::new(inner)
        .get(&invoice_id)
        .await
        .expect("Failed to get");
    assert_eq!(stored.items[0].status(), Some(ItemStatus::Completed));
    assert_eq!(stored.items[1].acknowledgment_number.as_deref(), Some("RACE"));
}

/// With no retries left the conflict surfaces to the caller.
#[tokio::test]
async fn test_compare_and_swap_without_retries_reports_conflict() {
    let (_inner, racing, invoice_id) = racing_setup().await;
    let reconciler = Reconciler::new(EntityStore::new(racing))
        .with_config(ReconcileConfig::default().with_retry(0));

    let err = reconciler
        .update_item_fields(&invoice_id, 0, &ItemFields::acknowledgment("ACK-1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::VersionConflict {
            expected: 1,
            found: 2,
            ..
        }
    ));
}

/// Many writers on different slots of one invoice; every entry survives.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_appends_to_different_slots() {
    let store = EntityStore::new(InMemoryStore::new());
    let invoice = store
        .create(Invoice::new(
            "CUS-1",
            None,
            "2024-01-01",
            (0..4)
                .map(|i| InvoiceItem::new(format!("Service {}", i), 1.0, 10.0))
                .collect(),
        ))
        .await
        .expect("Failed to create invoice");

    let reconciler = Arc::new(Reconciler::new(store.clone()).with_config(
        ReconcileConfig::default()
            .with_retry(20)
            .with_backoff(Duration::from_millis(1)),
    ));

    let mut handles = vec![];
    for slot in 0..4usize {
        let reconciler = Arc::clone(&reconciler);
        let invoice_id = invoice.id.clone();
        handles.push(tokio::spawn(async move {
            for day in 1..=5u32 {
                reconciler
                    .append_status(
                        &invoice_id,
                        slot,
                        StatusUpdate::new(ItemStatus::UnderProcess, ymd(2024, 1, day)),
                    )
                    .await
                    .expect("append should succeed");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("Task failed");
    }

    let stored: Invoice = store.get(&invoice.id).await.expect("Failed to get");
    for item in &stored.items {
        assert_eq!(item.status_history().len(), 5);
        assert_eq!(item.processed_date(), Some(ymd(2024, 1, 5)));
        assert!(item.is_mirror_consistent());
    }
}

// ============================================================================
// Service flows
// ============================================================================

#[tokio::test]
async fn test_upload_extract_save_and_view_services() {
    let client = ScriptedClient::new();
    client
        .push_ok(json!({
            "invoiceNumber": "INV-42",
            "customerName": "Meera Textiles",
            "date": "2024-03-01",
            "aadhaarNumber": "1111 2222 3333",
            "customerPhone": "98450 12345",
            "items": [
                { "name": "GST registration", "quantity": 1, "price": 1500, "total": 1500 },
                { "name": "Bookkeeping", "quantity": 3, "price": 1000, "total": 3000 }
            ]
        }))
        .await;
    let ops = OpsService::new(InMemoryStore::new(), client.clone());

    let extracted = ops
        .extract_invoice("data:image/png;base64,iVBORw0KGgo=")
        .await
        .expect("Failed to extract");
    let saved = ops
        .save_extracted_invoice(&extracted)
        .await
        .expect("Failed to save");
    assert!(saved.created_customer);

    let customers = ops.list_customers().await.expect("Failed to list");
    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].aadhaar, "1111 2222 3333");
    assert_eq!(customers[0].mobile, "98450 12345");

    let invoice: Invoice = ops.store().get(&saved.invoice_id).await.expect("Failed to get");
    assert_eq!(invoice.total, 4500.0);

    let services = ops
        .customer_services(&saved.customer_id)
        .await
        .expect("Failed to list services");
    assert_eq!(services.len(), 2);
    assert_eq!(services[1].invoice_number.as_deref(), Some("INV-42"));

    let requests = client.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].1["invoiceDataUri"],
        json!("data:image/png;base64,iVBORw0KGgo=")
    );
}

#[tokio::test]
async fn test_extraction_failure_becomes_retry_notification() {
    let client = ScriptedClient::new();
    client.push_ok(json!({ "items": "not a list" })).await;
    let ops = OpsService::new(InMemoryStore::new(), client);

    let result = ops.extract_invoice("data:application/pdf;base64,JVBERg==").await;
    let toast = Notification::from_result(&result, ("Extraction Successful", ""), "Extraction Failed");

    assert_eq!(toast.kind, NotificationKind::Error);
    assert_eq!(toast.title, "Extraction Failed");
    assert!(toast.description.contains("Please try again."));
    assert!(ops.list_invoices().await.expect("list").is_empty());
}

#[tokio::test]
async fn test_malformed_upload_never_reaches_advisor() {
    let client = ScriptedClient::new();
    let ops = OpsService::new(InMemoryStore::new(), client.clone());

    let err = ops.extract_invoice("not-a-data-uri").await.unwrap_err();
    assert!(matches!(err, Error::ValidationError(_)));
    assert!(client.requests().await.is_empty());
}

#[tokio::test]
async fn test_smart_assignment_uses_roster_snapshot() {
    let client = ScriptedClient::new();
    client
        .push_ok(json!({ "suggestedStaff": "Meena", "reasoning": "Available and idle." }))
        .await;
    let ops = OpsService::new(InMemoryStore::new(), client.clone());

    let ravi = ops
        .add_employee(NewEmployee::new("Ravi", "900"))
        .await
        .expect("Failed to add");
    ops.add_employee(NewEmployee::new("Meena", "901"))
        .await
        .expect("Failed to add");
    ops.set_availability(&ravi.id, false)
        .await
        .expect("Failed to set availability");

    let suggestion = ops
        .suggest_assignee("Quarterly audit", Priority::High, Some(ymd(2024, 4, 1)))
        .await
        .expect("Failed to suggest");
    assert_eq!(suggestion.suggested_staff, "Meena");

    let employees = ops.list_employees().await.expect("Failed to list");
    assert_eq!(
        suggestion.resolve(&employees).map(|e| e.name.as_str()),
        Some("Meena")
    );

    let (flow, input) = &client.requests().await[0];
    assert_eq!(flow, "smartTaskAssignment");
    assert_eq!(input["staffAvailability"], json!({ "Ravi": false, "Meena": true }));
    assert_eq!(input["staffWorkload"], json!({ "Ravi": 0, "Meena": 0 }));
    assert_eq!(input["priority"], json!("High"));
}

#[tokio::test]
async fn test_store_outage_becomes_notification() {
    let backend = InMemoryStore::new();
    let ops = OpsService::new(backend.clone(), ScriptedClient::new());
    let customer = ops
        .add_customer(NewCustomer::named("Asha"))
        .await
        .expect("Failed to add");

    backend.set_offline(true);
    let result = ops.delete_customer(&customer.id).await;
    let toast = Notification::from_result(&result, ("Customer Deleted", ""), "Delete Failed");
    assert!(toast.is_error());
    assert!(matches!(result, Err(Error::StoreUnavailable(_))));

    backend.set_offline(false);
    assert_eq!(ops.list_customers().await.expect("list").len(), 1);
}

#[tokio::test]
async fn test_deleting_customer_keeps_invoices() {
    let ops = OpsService::new(InMemoryStore::new(), ScriptedClient::new());
    let customer = ops
        .add_customer(NewCustomer::named("Asha"))
        .await
        .expect("Failed to add");
    ops.store()
        .create(Invoice::new(
            customer.id.clone(),
            None,
            "2024-01-01",
            vec![InvoiceItem::new("Cleaning", 1.0, 100.0)],
        ))
        .await
        .expect("Failed to create invoice");

    ops.delete_customer(&customer.id).await.expect("Failed to delete");

    let orphans: Vec<Invoice> = ops
        .store()
        .query(&Filter::eq("customerId", customer.id.as_str()))
        .await
        .expect("Failed to query");
    assert_eq!(orphans.len(), 1);
    assert_eq!(
        ops.customer_services(&customer.id)
            .await
            .expect("Failed to list")
            .len(),
        1
    );
}

#[tokio::test]
async fn test_live_services_view_follows_reconciliation() {
    let ops = OpsService::new(InMemoryStore::new(), ScriptedClient::new());
    let invoice = ops
        .store()
        .create(Invoice::new(
            "CUS-1",
            None,
            "2024-01-01",
            vec![InvoiceItem::new("Cleaning", 1.0, 100.0)],
        ))
        .await
        .expect("Failed to create invoice");

    let mut view = ops.watch_customer_services("CUS-1");
    let initial = view.next().await.expect("snapshot");
    assert_eq!(initial[0].item.current_status(), None);

    ops.record_service_status(
        &invoice.id,
        0,
        StatusUpdate::new(ItemStatus::Completed, ymd(2024, 1, 10))
            .at(at("2024-01-10T12:00:00Z")),
    )
    .await
    .expect("Failed to record");

    let updated = tokio::time::timeout(Duration::from_secs(1), view.next())
        .await
        .expect("view timed out")
        .expect("view failed");
    assert_eq!(updated[0].item.current_status(), Some(ItemStatus::Completed));
}

/// Invoices written by older clients keep every item the flows never touch.
#[tokio::test]
async fn test_legacy_invoice_siblings_survive_service_edits() {
    let ops = OpsService::in_memory(ScriptedClient::new(), OpsConfig::default());
    let legacy = json!({
        "name": "Filing",
        "hsnCode": "9983",
        "quantity": 1,
        "price": 50,
        "total": 50,
        "processedDate": "2024-01-09T18:30:00.000Z"
    });
    let broken = json!({
        "name": "Audit",
        "quantity": 1,
        "price": 900,
        "total": 900,
        "processedDate": "Wed Jan 10 2024"
    });
    let Value::Object(data) = json!({
        "customerId": "CUS-1",
        "invoiceNumber": "INV-OLD",
        "date": "2024-01-01",
        "items": [
            { "name": "Cleaning", "quantity": 1, "price": 100, "total": 100 },
            legacy.clone(),
            broken.clone()
        ],
        "total": 1050
    }) else {
        unreachable!()
    };
    let invoice_id = ops
        .store()
        .backend()
        .create(Collection::Invoices, data)
        .await
        .expect("Failed to create invoice");

    let lines = ops.customer_services("CUS-1").await.expect("Failed to list");
    let slots: Vec<usize> = lines.iter().map(|l| l.slot).collect();
    assert_eq!(slots, vec![0, 1]);
    assert_eq!(lines[1].item.current_processed_date(), Some(ymd(2024, 1, 9)));

    let outcome = ops
        .record_service_status(
            &invoice_id,
            0,
            StatusUpdate::new(ItemStatus::Completed, ymd(2024, 1, 10)),
        )
        .await
        .expect("Failed to record");
    assert!(outcome.is_applied());
    ops.set_acknowledgment(&invoice_id, 0, "ACK-11")
        .await
        .expect("Failed to set acknowledgment");

    let doc = ops
        .store()
        .get_document::<Invoice>(&invoice_id)
        .await
        .expect("Failed to get")
        .expect("missing");
    assert_eq!(doc.version, 3);
    assert_eq!(doc.data["items"][1], legacy);
    assert_eq!(doc.data["items"][2], broken);
    assert_eq!(doc.data["items"][0]["acknowledgmentNumber"], "ACK-11");
    assert_eq!(doc.data["total"], json!(1050));

    let err = ops
        .record_service_status(
            &invoice_id,
            2,
            StatusUpdate::new(ItemStatus::Completed, ymd(2024, 1, 11)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeserializationError(_)));
}
