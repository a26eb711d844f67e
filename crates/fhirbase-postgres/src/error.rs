//! Error types for stored-function invocation.

use sqlx_core::error::Error as SqlxError;
use std::fmt;

/// PostgreSQL error code for undefined function/operator (42883).
pub const PG_UNDEFINED_FUNCTION: &str = "42883";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a sqlx error is "undefined function" (42883).
pub fn is_undefined_function(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNDEFINED_FUNCTION)
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which step of an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallErrorKind {
    /// A connection could not be acquired from the pool.
    Connection,
    /// The store rejected or failed to run the function.
    Execution,
    /// The returned scalar could not be cast to the requested type.
    Cast,
}

impl fmt::Display for CallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Execution => write!(f, "execution"),
            Self::Cast => write!(f, "cast"),
        }
    }
}

/// A stored-function invocation failed.
///
/// Carries the qualified function name and the underlying cause; the original
/// error, when there is one, is available through `source()`.
#[derive(Debug, thiserror::Error)]
#[error("Call {function} FHIRbase function failed. Reason: {reason}")]
pub struct RemoteCallError {
    function: String,
    kind: CallErrorKind,
    reason: String,
    #[source]
    source: Option<BoxError>,
}

impl RemoteCallError {
    fn new(
        function: impl Into<String>,
        kind: CallErrorKind,
        reason: impl Into<String>,
        source: Option<BoxError>,
    ) -> Self {
        Self {
            function: function.into(),
            kind,
            reason: reason.into(),
            source,
        }
    }

    /// Creates a new connection error.
    #[must_use]
    pub fn connection(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(function, CallErrorKind::Connection, reason, None)
    }

    /// Creates a new execution error.
    #[must_use]
    pub fn execution(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(function, CallErrorKind::Execution, reason, None)
    }

    /// Creates a new cast error.
    #[must_use]
    pub fn cast(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(function, CallErrorKind::Cast, reason, None)
    }

    /// Wraps a sqlx failure, classifying pool problems as connection errors.
    #[must_use]
    pub fn from_sqlx(function: impl Into<String>, err: SqlxError) -> Self {
        let kind = match &err {
            SqlxError::PoolTimedOut
            | SqlxError::PoolClosed
            | SqlxError::Io(_)
            | SqlxError::Tls(_) => CallErrorKind::Connection,
            SqlxError::ColumnDecode { .. } | SqlxError::Decode(_) | SqlxError::TypeNotFound { .. } => {
                CallErrorKind::Cast
            }
            _ => CallErrorKind::Execution,
        };
        let reason = err.to_string();
        Self::new(function, kind, reason, Some(Box::new(err)))
    }

    /// The qualified name of the function that failed.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    #[must_use]
    pub fn kind(&self) -> CallErrorKind {
        self.kind
    }

    /// The underlying cause message.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn is_connection(&self) -> bool {
        self.kind == CallErrorKind::Connection
    }

    #[must_use]
    pub fn is_cast(&self) -> bool {
        self.kind == CallErrorKind::Cast
    }
}

/// Errors raised while setting up the PostgreSQL connection source.
///
/// Setup never touches the network; failures to reach the server surface
/// later, per call, as [`RemoteCallError`].
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// The connection URL could not be parsed into connect options.
    #[error("Invalid connection options: {0}")]
    ConnectOptions(#[from] SqlxError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for connection setup.
pub type Result<T> = std::result::Result<T, PostgresError>;
