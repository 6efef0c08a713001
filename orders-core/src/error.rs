//! Error types for order handling

use thiserror::Error;

/// Validation errors raised against a decoded order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },
}

/// Errors reported by a persistence gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Query {operation} failed: {reason}")]
    QueryFailed { operation: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage operation {operation} timed out")]
    Timeout { operation: String },
}

impl StorageError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn query_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueryFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn transaction_failed(reason: impl Into<String>) -> Self {
        Self::TransactionFailed {
            reason: reason.into(),
        }
    }

    /// Whether the same call may succeed later without any change to its input.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } | Self::TransactionFailed { .. } => true,
            Self::QueryFailed { .. } => false,
        }
    }
}

/// Top-level error for decoding, validating and storing orders.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Decode error: {reason}")]
    Decode { reason: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for OrderError {
    fn from(err: serde_json::Error) -> Self {
        OrderError::Decode {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for order operations.
pub type OrderResult<T> = Result<T, OrderError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_missing_field() {
        let err = ValidationError::RequiredFieldMissing {
            field: "order_uid".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Required field missing"));
        assert!(msg.contains("order_uid"));
    }

    #[test]
    fn test_storage_error_display_query_failed() {
        let err = StorageError::query_failed("load_by_key", "connection reset");
        let msg = format!("{}", err);
        assert!(msg.contains("load_by_key"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_storage_error_transience() {
        assert!(StorageError::unavailable("pool closed").is_transient());
        assert!(StorageError::transaction_failed("serialization failure").is_transient());
        assert!(StorageError::Timeout {
            operation: "save_order".to_string()
        }
        .is_transient());
        assert!(!StorageError::query_failed("save_order", "syntax error").is_transient());
    }

    #[test]
    fn test_order_error_from_storage() {
        let err: OrderError = StorageError::unavailable("down").into();
        assert!(matches!(err, OrderError::Storage(StorageError::Unavailable { .. })));
        assert!(format!("{}", err).starts_with("Storage error"));
    }

    #[test]
    fn test_order_error_from_json() {
        let json_err = serde_json::from_slice::<serde_json::Value>(b"{not json")
            .err()
            .map(OrderError::from);
        assert!(matches!(json_err, Some(OrderError::Decode { .. })));
    }
}
