//! Application flows over the entity store and the reasoning service.
//!
//! [`OpsService`] is what the screens call. Each method is one user action
//! (add a customer, record a service status, ask for an assignee suggestion)
//! and returns a `Result`; the UI converts it into a
//! [`Notification`](crate::notify::Notification).
//!
//! ```ignore
//! use bizops_kit::{OpsService, backend::InMemoryStore, advisor::ScriptedClient};
//!
//! let ops = OpsService::new(InMemoryStore::new(), ScriptedClient::new());
//! let customer = ops.add_customer(NewCustomer::named("Asha")).await?;
//! let services = ops.customer_services(&customer.id).await?;
//! ```
//!
//! `OpsService` is `Clone`; clones share the store, the advisor client and
//! the reconciler.

use crate::aggregate::{services_from_documents, CustomerServicesView, ServiceLine};
use crate::advisor::{
    self, AssignmentRequest, AssignmentSuggestion, DocumentBlob, ExtractedInvoice,
    ReasoningClient, ASSIGNMENT_FLOW, EXTRACTION_FLOW,
};
use crate::backend::{DocumentStore, InMemoryStore, WriteMode};
use crate::config::OpsConfig;
use crate::dashboard::{self, WorkloadChange};
use crate::error::Result;
use crate::model::customer::{rotating_avatar, Customer, CustomerField, CustomerUpdate, NewCustomer};
use crate::model::employee::{Employee, NewEmployee};
use crate::model::invoice::{stored_items, Invoice, InvoiceItem, ItemFields};
use crate::model::task::{NewTask, Priority, Task, TaskStatus};
use crate::observability::{NoOpMetrics, OpsMetrics};
use crate::query::Filter;
use crate::reconcile::{
    check_effective_date, ReconcileOutcome, Reconciler, SkipReason, StatusUpdate,
};
use crate::store::EntityStore;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Ids written by [`OpsService::save_extracted_invoice`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedInvoice {
    pub customer_id: String,
    pub invoice_id: String,
    /// True when no existing customer matched and one was created.
    pub created_customer: bool,
}

/// Dashboard numbers.
#[derive(Clone, Debug, PartialEq)]
pub struct DashboardSummary {
    pub status_counts: Vec<(TaskStatus, usize)>,
    pub tasks_per_employee: Vec<(String, usize)>,
    pub recent_tasks: Vec<Task>,
}

/// The business-operations flows.
pub struct OpsService<S: DocumentStore, C: ReasoningClient> {
    store: EntityStore<S>,
    advisor: Arc<C>,
    reconciler: Arc<Reconciler<S>>,
    metrics: Arc<dyn OpsMetrics>,
    config: OpsConfig,
}

impl<S: DocumentStore, C: ReasoningClient> Clone for OpsService<S, C> {
    fn clone(&self) -> Self {
        OpsService {
            store: self.store.clone(),
            advisor: Arc::clone(&self.advisor),
            reconciler: Arc::clone(&self.reconciler),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}

impl<C: ReasoningClient> OpsService<InMemoryStore, C> {
    /// Service over a fresh in-memory store sized from `config`.
    pub fn in_memory(advisor: C, config: OpsConfig) -> Self {
        Self::with_config(InMemoryStore::from_config(&config), advisor, config)
    }
}

impl<S: DocumentStore, C: ReasoningClient> OpsService<S, C> {
    /// Service with default configuration.
    pub fn new(backend: S, advisor: C) -> Self {
        Self::with_config(backend, advisor, OpsConfig::default())
    }

    /// Service over an existing backend. `config.live_query_capacity` only
    /// applies to stores built from the config, see [`OpsService::in_memory`].
    pub fn with_config(backend: S, advisor: C, config: OpsConfig) -> Self {
        let store = EntityStore::new(backend);
        let metrics: Arc<dyn OpsMetrics> = Arc::new(NoOpMetrics);
        OpsService {
            reconciler: Arc::new(Self::build_reconciler(&store, &config, metrics.clone())),
            store,
            advisor: Arc::new(advisor),
            metrics,
            config,
        }
    }

    /// Set custom metrics handler, shared by the service and its reconciler.
    pub fn with_metrics(mut self, metrics: Arc<dyn OpsMetrics>) -> Self {
        self.reconciler = Arc::new(Self::build_reconciler(
            &self.store,
            &self.config,
            metrics.clone(),
        ));
        self.metrics = metrics;
        self
    }

    fn build_reconciler(
        store: &EntityStore<S>,
        config: &OpsConfig,
        metrics: Arc<dyn OpsMetrics>,
    ) -> Reconciler<S> {
        Reconciler::new(store.clone())
            .with_config(config.reconcile_config())
            .with_metrics(Box::new(metrics))
    }

    pub fn store(&self) -> &EntityStore<S> {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    // ---- customers ----

    /// Add a customer with the next avatar in rotation.
    pub async fn add_customer(&self, new: NewCustomer) -> Result<Customer> {
        let existing = self.store.list::<Customer>().await?.len();
        let customer = self
            .store
            .create(new.into_customer(rotating_avatar(existing)))
            .await?;
        info!("✓ Added customer {} ({})", customer.name, customer.id);
        Ok(customer)
    }

    /// Merge the edited fields into an existing customer.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: blank name
    /// - `Error::NotFound`: no such customer
    pub async fn update_customer(&self, id: &str, update: CustomerUpdate) -> Result<Customer> {
        update.validate()?;
        let current: Customer = self.store.get(id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        self.store
            .update::<Customer, _>(id, &update, WriteMode::Merge)
            .await?;
        info!("✓ Updated customer {}", id);
        self.store.get(id).await
    }

    /// Remove a customer. Invoices referencing it are left in place.
    pub async fn delete_customer(&self, id: &str) -> Result<()> {
        self.store.delete::<Customer>(id).await?;
        info!("✓ Deleted customer {}", id);
        Ok(())
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.store.list().await
    }

    /// Case-insensitive substring search on one field. A blank needle lists everyone.
    pub async fn search_customers(&self, field: CustomerField, needle: &str) -> Result<Vec<Customer>> {
        if needle.trim().is_empty() {
            return self.store.list().await;
        }
        self.store
            .query(&Filter::contains_ignore_case(field.key(), needle.trim()))
            .await
    }

    // ---- employees ----

    pub async fn add_employee(&self, new: NewEmployee) -> Result<Employee> {
        let existing = self.store.list::<Employee>().await?.len();
        let employee = self
            .store
            .create(new.into_employee(rotating_avatar(existing)))
            .await?;
        info!("✓ Added employee {} ({})", employee.name, employee.id);
        Ok(employee)
    }

    pub async fn set_availability(&self, id: &str, available: bool) -> Result<()> {
        self.store.get::<Employee>(id).await?;
        self.store
            .update::<Employee, _>(id, &json!({ "availability": available }), WriteMode::Merge)
            .await?;
        debug!("Employee {} availability = {}", id, available);
        Ok(())
    }

    pub async fn delete_employee(&self, id: &str) -> Result<()> {
        self.store.delete::<Employee>(id).await?;
        info!("✓ Deleted employee {}", id);
        Ok(())
    }

    pub async fn list_employees(&self) -> Result<Vec<Employee>> {
        self.store.list().await
    }

    /// Recount open tasks per employee and write back the workloads that changed.
    ///
    /// Not atomic with task writes; a task created while this runs may be
    /// missed until the next refresh.
    pub async fn refresh_workloads(&self) -> Result<Vec<WorkloadChange>> {
        let employees: Vec<Employee> = self.store.list().await?;
        let tasks: Vec<Task> = self.store.list().await?;

        let changes = dashboard::derive_workloads(&employees, &tasks);
        for change in &changes {
            self.store
                .update::<Employee, _>(
                    &change.employee_id,
                    &json!({ "workload": change.workload }),
                    WriteMode::Merge,
                )
                .await?;
            debug!(
                "Employee {} workload {} -> {}",
                change.employee_id, change.previous, change.workload
            );
        }
        Ok(changes)
    }

    // ---- tasks ----

    /// Create a task for an existing customer and employee.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: title, customer or assignee missing
    /// - `Error::NotFound`: customer or employee id does not resolve
    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        new.validate()?;
        let customer: Customer = self.store.get(&new.customer_id).await?;
        let assignee: Employee = self.store.get(&new.assignee_id).await?;

        let task = self
            .store
            .create(new.into_task(&customer, &assignee, Utc::now()))
            .await?;
        info!("✓ Created task '{}' for {}", task.title, task.assignee);
        Ok(task)
    }

    pub async fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        self.store.get::<Task>(id).await?;
        self.store
            .update::<Task, _>(id, &json!({ "status": status }), WriteMode::Merge)
            .await?;
        debug!("Task {} -> {}", id, status);
        Ok(())
    }

    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.store.delete::<Task>(id).await?;
        info!("✓ Deleted task {}", id);
        Ok(())
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.store.list().await
    }

    pub async fn filter_tasks_by_title(&self, needle: &str) -> Result<Vec<Task>> {
        if needle.trim().is_empty() {
            return self.store.list().await;
        }
        self.store
            .query(&Filter::contains_ignore_case("title", needle.trim()))
            .await
    }

    pub async fn dashboard(&self, recent: usize) -> Result<DashboardSummary> {
        let employees: Vec<Employee> = self.store.list().await?;
        let tasks: Vec<Task> = self.store.list().await?;
        Ok(DashboardSummary {
            status_counts: dashboard::task_status_counts(&tasks),
            tasks_per_employee: dashboard::tasks_per_employee(&employees, &tasks),
            recent_tasks: dashboard::recent_tasks(&tasks, recent).to_vec(),
        })
    }

    // ---- invoices and services ----

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        self.store.list().await
    }

    /// Snapshot of a customer's service lines.
    pub async fn customer_services(&self, customer_id: &str) -> Result<Vec<ServiceLine>> {
        let docs = self
            .store
            .query_documents::<Invoice>(&Filter::eq("customerId", customer_id))
            .await?;
        Ok(services_from_documents(customer_id, &docs))
    }

    /// Live view of a customer's service lines.
    pub fn watch_customer_services(&self, customer_id: &str) -> CustomerServicesView<S> {
        CustomerServicesView::new(self.store.clone(), customer_id)
    }

    /// Record a status change entered through the status form.
    ///
    /// The effective date is checked against the item's history and against
    /// today's date (UTC) from the system clock, never against
    /// `update.updated_at`. Then the change goes through the reconciler.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: date in the future or not after the last entry
    /// - anything [`Reconciler::append_status`] returns
    pub async fn record_service_status(
        &self,
        invoice_id: &str,
        slot: usize,
        update: StatusUpdate,
    ) -> Result<ReconcileOutcome> {
        let Some(invoice) = self.store.get_document::<Invoice>(invoice_id).await? else {
            return Ok(ReconcileOutcome::Skipped(SkipReason::InvoiceMissing));
        };
        let items = stored_items(&invoice.data)?;
        let Some(raw) = items.get(slot) else {
            return Ok(ReconcileOutcome::Skipped(SkipReason::SlotMissing {
                len: items.len(),
            }));
        };
        let item = InvoiceItem::from_stored(raw)?;
        let today: NaiveDate = Utc::now().date_naive();
        check_effective_date(item.status_history(), update.effective_date, today)?;

        self.reconciler.append_status(invoice_id, slot, update).await
    }

    /// Set the acknowledgment number of one service line.
    pub async fn set_acknowledgment(
        &self,
        invoice_id: &str,
        slot: usize,
        acknowledgment_number: &str,
    ) -> Result<ReconcileOutcome> {
        self.reconciler
            .update_item_fields(
                invoice_id,
                slot,
                &ItemFields::acknowledgment(acknowledgment_number),
            )
            .await
    }

    // ---- advisors ----

    /// Parse an uploaded data URI and run it through the extraction flow.
    pub async fn extract_invoice(&self, data_uri: &str) -> Result<ExtractedInvoice> {
        let document = DocumentBlob::from_data_uri(data_uri)?;
        let timer = Instant::now();
        let result = advisor::extract_invoice(self.advisor.as_ref(), &document).await;
        self.metrics
            .record_advisor_call(EXTRACTION_FLOW, timer.elapsed(), result.is_ok());
        result
    }

    /// Store an extracted invoice, creating its customer if needed.
    ///
    /// The customer is matched by name, ignoring case. A new customer
    /// carries the extracted Aadhaar number and phone.
    pub async fn save_extracted_invoice(&self, extracted: &ExtractedInvoice) -> Result<SavedInvoice> {
        let wanted = extracted.customer_name.trim().to_lowercase();
        let customers: Vec<Customer> = self.store.list().await?;
        let existing = customers
            .iter()
            .find(|c| c.name.trim().to_lowercase() == wanted);

        let (customer_id, created_customer) = match existing {
            Some(customer) => (customer.id.clone(), false),
            None => {
                let new = NewCustomer {
                    name: extracted.customer_name.trim().to_string(),
                    mobile: extracted.customer_phone.clone().unwrap_or_default(),
                    aadhaar: extracted.aadhaar_number.clone().unwrap_or_default(),
                    ..Default::default()
                };
                let customer = self
                    .store
                    .create(new.into_customer(rotating_avatar(customers.len())))
                    .await?;
                (customer.id, true)
            }
        };

        let invoice = self
            .store
            .create(Invoice::new(
                customer_id.clone(),
                extracted.invoice_number.clone(),
                extracted.date.clone(),
                extracted.items(),
            ))
            .await?;
        info!(
            "✓ Saved extracted invoice {} for customer {} (total {})",
            invoice.id, customer_id, invoice.total
        );

        Ok(SavedInvoice {
            customer_id,
            invoice_id: invoice.id,
            created_customer,
        })
    }

    /// Ask the reasoning service who should take a task, given the current roster.
    pub async fn suggest_assignee(
        &self,
        task_description: &str,
        priority: Priority,
        due_date: Option<NaiveDate>,
    ) -> Result<AssignmentSuggestion> {
        let employees: Vec<Employee> = self.store.list().await?;
        let request = AssignmentRequest::new(task_description, priority, due_date, &employees);

        let timer = Instant::now();
        let result = advisor::suggest_assignee(self.advisor.as_ref(), &request).await;
        self.metrics
            .record_advisor_call(ASSIGNMENT_FLOW, timer.elapsed(), result.is_ok());
        result
    }
}
