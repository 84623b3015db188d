//! Error types for the business-operations core.

use std::fmt;

/// Result type for store, reconciliation and advisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for bizops-kit.
///
/// Every fallible operation returns `Result<T>`. None of these are fatal to
/// the process: callers at the operation boundary turn them into a
/// [`Notification`](crate::notify::Notification) and leave UI state unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The document store could not be reached or refused the operation.
    ///
    /// Common causes:
    /// - Network failure between client and hosted store
    /// - Permission denied for the signed-in principal
    /// - Store switched offline (in-memory store, tests)
    ///
    /// **Recovery:** None automatic. The operation is abandoned.
    StoreUnavailable(String),

    /// Referenced document does not exist.
    NotFound {
        /// Collection that was searched
        collection: String,
        /// Identifier that failed to resolve
        id: String,
    },

    /// Compare-and-swap write lost against a concurrent writer.
    ///
    /// Raised by [`DocumentStore::set_if_version`](crate::backend::DocumentStore::set_if_version)
    /// when the stored document version moved on since it was read.
    ///
    /// **Recovery:** Re-read, re-apply, retry. The reconciler does this itself.
    VersionConflict {
        /// Document path (`invoices/abc`)
        path: String,
        /// Version the writer based its change on
        expected: u64,
        /// Version actually stored
        found: u64,
    },

    /// External reasoning service answered, but not in the agreed shape.
    InvalidResponseShape(String),

    /// Invoice extraction could not produce a conforming record.
    ///
    /// **Recovery:** Ask the user for a new upload. Nothing is cached.
    ExtractionFailed(String),

    /// Input rejected before any store call was issued.
    ValidationError(String),

    /// Entity could not be converted to the store's record shape.
    SerializationError(String),

    /// Stored record does not match the entity's shape.
    DeserializationError(String),

    /// Invalid configuration value.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// True for failures the user can fix by retrying with new input.
    pub fn is_retryable_by_user(&self) -> bool {
        matches!(
            self,
            Error::InvalidResponseShape(_) | Error::ExtractionFailed(_) | Error::ValidationError(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Error::NotFound { collection, id } => write!(f, "Not found: {}/{}", collection, id),
            Error::VersionConflict {
                path,
                expected,
                found,
            } => write!(
                f,
                "Version conflict on {}: expected {}, found {}",
                path, expected, found
            ),
            Error::InvalidResponseShape(msg) => write!(f, "Invalid response shape: {}", msg),
            Error::ExtractionFailed(msg) => write!(f, "Extraction failed: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::StoreUnavailable(e.to_string())
        } else if e.is_syntax() || e.is_data() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
