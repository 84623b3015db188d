//! Contracts with the external reasoning service.
//!
//! Both advisors follow the same pattern: build a request, hand it to a
//! [`ReasoningClient`] under a named flow, and validate the JSON that comes
//! back against a fixed shape. No selection or parsing logic lives here.
//!
//! | Flow | Request | Response | Shape failure |
//! |---|---|---|---|
//! | [`ASSIGNMENT_FLOW`] | task + staff snapshot | `{suggestedStaff, reasoning}` | `InvalidResponseShape` |
//! | [`EXTRACTION_FLOW`] | document data URI | extracted invoice fields | `ExtractionFailed` |

pub mod assignment;
pub mod extraction;

pub use assignment::{suggest_assignee, AssignmentRequest, AssignmentSuggestion, StaffSnapshot};
pub use extraction::{extract_invoice, DocumentBlob, ExtractedInvoice, ExtractedItem};

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Flow name of the smart task assignment prompt.
pub const ASSIGNMENT_FLOW: &str = "smartTaskAssignment";

/// Flow name of the invoice data extraction prompt.
pub const EXTRACTION_FLOW: &str = "invoiceDataExtraction";

/// Transport to the reasoning service.
///
/// Implementations send `input` to the named flow and return its raw JSON
/// output. Transport failures are reported as errors; the advisor functions
/// decide how to classify them.
#[allow(async_fn_in_trait)]
pub trait ReasoningClient: Send + Sync {
    async fn complete(&self, flow: &str, input: Value) -> Result<Value>;
}

/// Client that replays queued responses and records every request.
///
/// Cloning shares the queue and the request log.
///
/// ```ignore
/// let client = ScriptedClient::new();
/// client.push_ok(json!({ "suggestedStaff": "Ravi", "reasoning": "lowest load" })).await;
/// let suggestion = suggest_assignee(&client, &request).await?;
/// ```
#[derive(Clone, Default)]
pub struct ScriptedClient {
    responses: Arc<Mutex<VecDeque<Result<Value>>>>,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_ok(&self, response: Value) {
        self.responses.lock().await.push_back(Ok(response));
    }

    pub async fn push_err(&self, error: Error) {
        self.responses.lock().await.push_back(Err(error));
    }

    /// Every `(flow, input)` pair received so far.
    pub async fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().await.clone()
    }
}

impl ReasoningClient for ScriptedClient {
    async fn complete(&self, flow: &str, input: Value) -> Result<Value> {
        self.requests.lock().await.push((flow.to_string(), input));
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(Error::Other(format!("no scripted response for {}", flow))))
    }
}
