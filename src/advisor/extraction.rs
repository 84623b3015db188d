//! Invoice field extraction from an uploaded document.

use super::{ReasoningClient, EXTRACTION_FLOW};
use crate::error::{Error, Result};
use crate::model::invoice::{items_total, InvoiceItem};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Upload types the capture form offers.
pub const SUPPORTED_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "application/pdf"];

/// An uploaded document: MIME type plus raw bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentBlob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl DocumentBlob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        DocumentBlob {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Parse `data:<mime>;base64,<payload>`.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` when the URI is not a base64 data URI or the
    /// payload does not decode.
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| Error::ValidationError("upload is not a data URI".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::ValidationError("data URI has no payload".into()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| Error::ValidationError("data URI is not base64-encoded".into()))?;
        if mime_type.is_empty() {
            return Err(Error::ValidationError("data URI has no MIME type".into()));
        }

        let data = STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::ValidationError(format!("invalid base64 payload: {}", e)))?;
        if data.is_empty() {
            return Err(Error::ValidationError("uploaded document is empty".into()));
        }

        Ok(DocumentBlob::new(mime_type, data))
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionRequest {
    invoice_data_uri: String,
}

/// One line read off the document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub name: String,
    pub quantity: f64,
    pub price: f64,
    pub total: f64,
}

impl ExtractedItem {
    /// Stored item; the printed total is kept as is.
    pub fn to_item(&self) -> InvoiceItem {
        InvoiceItem::with_total(self.name.clone(), self.quantity, self.price, self.total)
    }
}

/// Fields read off an invoice document.
///
/// Optional fields the document does not show come back absent; blank
/// strings are treated the same way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedInvoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    pub customer_name: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aadhaar_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
}

impl ExtractedInvoice {
    pub fn items(&self) -> Vec<InvoiceItem> {
        self.items.iter().map(ExtractedItem::to_item).collect()
    }

    pub fn total(&self) -> f64 {
        items_total(&self.items())
    }

    fn normalized(mut self) -> Self {
        for field in [
            &mut self.invoice_number,
            &mut self.aadhaar_number,
            &mut self.customer_phone,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }
}

/// Send a document to the extraction flow.
///
/// Unsupported MIME types are logged and sent anyway.
///
/// # Errors
///
/// `Error::ExtractionFailed` when the service fails or its reply does not
/// match [`ExtractedInvoice`]. Nothing is cached; retry with a new upload.
pub async fn extract_invoice<C: ReasoningClient>(
    client: &C,
    document: &DocumentBlob,
) -> Result<ExtractedInvoice> {
    if !document.is_supported() {
        warn!(
            "Extracting from unsupported document type '{}'",
            document.mime_type
        );
    }
    let input = serde_json::to_value(ExtractionRequest {
        invoice_data_uri: document.to_data_uri(),
    })?;

    debug!(
        "» {} ({}, {} bytes)",
        EXTRACTION_FLOW,
        document.mime_type,
        document.data.len()
    );
    let output = client
        .complete(EXTRACTION_FLOW, input)
        .await
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;

    let extracted: ExtractedInvoice = serde_json::from_value(output)
        .map_err(|e| Error::ExtractionFailed(format!("{}: {}", EXTRACTION_FLOW, e)))?;
    Ok(extracted.normalized())
}
