//! Error types for the resource access API.

use std::fmt;

use fhirbase_core::CoreError;
use fhirbase_postgres::{PostgresError, RemoteCallError};

/// Errors that can occur during resource access operations.
///
/// None of these are retried by the client; every one is returned to the
/// caller as-is.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The remote function call failed (connection, execution or cast).
    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),

    /// The store answered with JSON that is not the expected resource shape.
    #[error("Cannot parse FHIRbase's json into a {target}: {source}")]
    Decode {
        /// What the payload was decoded into.
        target: &'static str,
        /// The underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A typed operation received a resource of another type.
    #[error("Resource type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The requested resource type.
        expected: String,
        /// The resource type the store returned.
        actual: String,
    },

    /// The requested resource was not found.
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: String,
        /// The ID of the resource that was not found.
        id: String,
    },

    /// The resource key cannot address the requested operation.
    #[error("Invalid resource key: {message}")]
    InvalidKey {
        /// Why the key was rejected.
        message: String,
    },

    /// The resource could not be serialized for the store.
    #[error("Invalid resource: {message}")]
    InvalidResource {
        /// Description of why the resource is invalid.
        message: String,
    },

    /// The store rejected the operation with an OperationOutcome.
    #[error("FHIRbase returned OperationOutcome ({code}): {diagnostics}")]
    OperationOutcome {
        /// Issue code of the first issue.
        code: String,
        /// Diagnostics of all issues.
        diagnostics: String,
    },

    /// The connection source could not be set up.
    #[error(transparent)]
    Connection(#[from] PostgresError),
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a new `TypeMismatch` error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `OperationOutcome` error.
    #[must_use]
    pub fn operation_outcome(code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::OperationOutcome {
            code: code.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a remote call error.
    #[must_use]
    pub fn is_remote_call(&self) -> bool {
        matches!(self, Self::RemoteCall(_))
    }

    /// Returns `true` if this is a decode error.
    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Returns `true` if this is a type mismatch error.
    #[must_use]
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidKey { .. } | Self::InvalidResource { .. } => ErrorCategory::Validation,
            Self::Decode { .. } | Self::TypeMismatch { .. } => ErrorCategory::Translation,
            Self::OperationOutcome { .. } => ErrorCategory::Rejected,
            Self::RemoteCall(e) if e.is_connection() => ErrorCategory::Infrastructure,
            Self::RemoteCall(_) => ErrorCategory::Remote,
            Self::Connection(_) => ErrorCategory::Infrastructure,
        }
    }
}

impl From<CoreError> for StorageError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Decode { target, source } => Self::Decode { target, source },
            CoreError::Encode { target, source } => Self::InvalidResource {
                message: format!("cannot serialize {target}: {source}"),
            },
            CoreError::TypeMismatch { expected, actual } => Self::TypeMismatch { expected, actual },
            CoreError::InvalidKey { message } => Self::InvalidKey { message },
            CoreError::InvalidDateTime(message) => Self::InvalidResource { message },
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Resource not found.
    NotFound,
    /// Caller supplied an unusable key or resource.
    Validation,
    /// Response could not be translated into the resource model.
    Translation,
    /// Store answered with an OperationOutcome.
    Rejected,
    /// The stored function failed.
    Remote,
    /// Infrastructure/connection error.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::Translation => write!(f, "translation"),
            Self::Rejected => write!(f, "rejected"),
            Self::Remote => write!(f, "remote"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}
