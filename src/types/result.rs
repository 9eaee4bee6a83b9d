//! The tagged outcome of every gateway and channel operation.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Shared, cloneable error cause attached to `OperationResult::Error`.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Outcome of a gated health operation.
///
/// Permission and availability gating travel through this type rather than
/// through `Err`, so callers match all four cases at each consumption site.
#[derive(Clone)]
pub enum OperationResult<T> {
    Success(T),
    /// Required read permissions are not granted.
    PermissionDenied,
    /// The environment lacks the capability entirely.
    NotAvailable,
    Error {
        message: String,
        cause: Option<Cause>,
    },
}

impl<T> OperationResult<T> {
    pub fn error(message: impl Into<String>) -> Self {
        OperationResult::Error {
            message: message.into(),
            cause: None,
        }
    }

    pub fn error_with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        OperationResult::Error {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    /// Consume the result, keeping only a successful value.
    pub fn success(self) -> Option<T> {
        match self {
            OperationResult::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The error message, if this is an `Error`.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            OperationResult::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> OperationResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            OperationResult::Success(value) => OperationResult::Success(f(value)),
            OperationResult::PermissionDenied => OperationResult::PermissionDenied,
            OperationResult::NotAvailable => OperationResult::NotAvailable,
            OperationResult::Error { message, cause } => OperationResult::Error { message, cause },
        }
    }

    /// Chain a fallible step; non-success variants pass through unchanged.
    pub fn and_then<U, F>(self, f: F) -> OperationResult<U>
    where
        F: FnOnce(T) -> OperationResult<U>,
    {
        match self {
            OperationResult::Success(value) => f(value),
            OperationResult::PermissionDenied => OperationResult::PermissionDenied,
            OperationResult::NotAvailable => OperationResult::NotAvailable,
            OperationResult::Error { message, cause } => OperationResult::Error { message, cause },
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OperationResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationResult::Success(value) => f.debug_tuple("Success").field(value).finish(),
            OperationResult::PermissionDenied => write!(f, "PermissionDenied"),
            OperationResult::NotAvailable => write!(f, "NotAvailable"),
            OperationResult::Error { message, cause } => f
                .debug_struct("Error")
                .field("message", message)
                .field("cause", &cause.as_ref().map(|c| c.to_string()))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HealthStoreError;

    #[test]
    fn test_map_passes_gating_through() {
        let denied: OperationResult<u32> = OperationResult::PermissionDenied;
        assert!(matches!(denied.map(|v| v + 1), OperationResult::PermissionDenied));

        let missing: OperationResult<u32> = OperationResult::NotAvailable;
        assert!(matches!(missing.map(|v| v + 1), OperationResult::NotAvailable));

        let ok = OperationResult::Success(1u32).map(|v| v + 1);
        assert_eq!(ok.success(), Some(2));
    }

    #[test]
    fn test_error_keeps_cause() {
        let result: OperationResult<()> =
            OperationResult::error_with_cause("read failed", HealthStoreError::Io("disk".into()));
        match result {
            OperationResult::Error { message, cause } => {
                assert_eq!(message, "read failed");
                assert_eq!(cause.unwrap().to_string(), "I/O error: disk");
            }
            other => panic!("expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_and_then_short_circuits_errors() {
        let failed: OperationResult<u32> = OperationResult::error("boom");
        let chained = failed.and_then(|v| OperationResult::Success(v * 2));
        assert_eq!(chained.error_message(), Some("boom"));
    }
}
