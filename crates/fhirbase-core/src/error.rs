use thiserror::Error;

/// Errors raised while translating between FHIR JSON and the resource model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Cannot parse FHIRbase's json into a {target}: {source}")]
    Decode {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot serialize {target} to json: {source}")]
    Encode {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Resource type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid resource key: {message}")]
    InvalidKey { message: String },

    #[error("Invalid FHIR DateTime: {0}")]
    InvalidDateTime(String),
}

impl CoreError {
    /// Create a new Decode error
    pub fn decode(target: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { target, source }
    }

    /// Create a new Encode error
    pub fn encode(target: &'static str, source: serde_json::Error) -> Self {
        Self::Encode { target, source }
    }

    /// Create a new TypeMismatch error
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new InvalidKey error
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Create a new InvalidDateTime error
    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
