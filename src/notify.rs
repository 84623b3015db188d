//! User-facing notifications.
//!
//! Every flow in [`OpsService`](crate::service::OpsService) returns a
//! `Result`. The UI boundary turns that into one [`Notification`] and never
//! lets the error escape further:
//!
//! ```ignore
//! let result = service.update_customer(&id, update).await;
//! let toast = Notification::from_result(
//!     &result,
//!     ("Customer Updated", "The customer details were saved."),
//!     "Update Failed",
//! );
//! ```

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notification {
            kind: NotificationKind::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Failure notification carrying the error's message.
    ///
    /// Shape and extraction failures get a "try again" hint.
    pub fn failure(title: impl Into<String>, error: &Error) -> Self {
        let description = match error {
            Error::InvalidResponseShape(_) | Error::ExtractionFailed(_) => {
                format!("{} Please try again.", error)
            }
            _ => error.to_string(),
        };
        Notification {
            kind: NotificationKind::Error,
            title: title.into(),
            description,
        }
    }

    /// Convert an operation result at the UI boundary.
    pub fn from_result<T>(result: &Result<T>, success: (&str, &str), failure: &str) -> Self {
        match result {
            Ok(_) => Notification::success(success.0, success.1),
            Err(e) => {
                debug!("{}: {}", failure, e);
                Notification::failure(failure, e)
            }
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == NotificationKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success() {
        let result: Result<()> = Ok(());
        let n = Notification::from_result(&result, ("Saved", "All good."), "Save Failed");
        assert_eq!(n, Notification::success("Saved", "All good."));
        assert!(!n.is_error());
    }

    #[test]
    fn test_failure_carries_message() {
        let result: Result<()> = Err(Error::StoreUnavailable("permission denied".into()));
        let n = Notification::from_result(&result, ("Saved", ""), "Update Failed");
        assert!(n.is_error());
        assert_eq!(n.title, "Update Failed");
        assert!(n.description.contains("permission denied"));
    }

    #[test]
    fn test_shape_failure_suggests_retry() {
        let n = Notification::failure("AI Suggestion Failed", &Error::InvalidResponseShape("x".into()));
        assert!(n.description.ends_with("Please try again."));
    }
}
