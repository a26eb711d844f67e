//! Parameter marshalling and scalar result casting.
//!
//! Every stored function takes positional parameters of four wire types and
//! returns a single scalar. [`SqlParam`] is the outgoing side, [`ScalarValue`]
//! the incoming one, and [`FromScalar`] casts the latter to the Rust type the
//! caller asked for.

use serde_json::Value;
use std::fmt;

/// A positional stored-function parameter tagged with its wire type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// UTF-8 text.
    Text(String),
    /// JSON document text, sent as `jsonb`.
    Json(String),
    /// Ordered text array, sent as `text[]`.
    TextArray(Vec<String>),
    /// 32-bit integer.
    Int(i32),
}

impl SqlParam {
    /// The SQL type the placeholder is cast to so the store can resolve
    /// overloaded functions by signature.
    #[must_use]
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Json(_) => "jsonb",
            Self::TextArray(_) => "text[]",
            Self::Int(_) => "integer",
        }
    }
}

/// The single value returned by a stored function.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Text(String),
    Json(Value),
    TextArray(Vec<String>),
    Bool(bool),
    Int(i64),
}

impl ScalarValue {
    /// Name of the carried type, used in cast failures.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Json(_) => "jsonb",
            Self::TextArray(_) => "text[]",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "bigint",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Json(v) => write!(f, "{v}"),
            Self::TextArray(items) => write!(f, "{{{}}}", items.join(",")),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Why a [`ScalarValue`] could not be cast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot cast {found} to {expected}")]
pub struct CastError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl CastError {
    fn new(expected: &'static str, found: &ScalarValue) -> Self {
        Self {
            expected,
            found: found.type_name(),
        }
    }
}

/// Conversion from a returned scalar to a requested Rust type.
///
/// `NULL` only casts to `Option<T>`.
pub trait FromScalar: Sized {
    const EXPECTED: &'static str;

    fn from_scalar(value: ScalarValue) -> Result<Self, CastError>;
}

impl FromScalar for String {
    const EXPECTED: &'static str = "text";

    fn from_scalar(value: ScalarValue) -> Result<Self, CastError> {
        match value {
            ScalarValue::Text(s) => Ok(s),
            ScalarValue::Json(v) => Ok(v.to_string()),
            other => Err(CastError::new(Self::EXPECTED, &other)),
        }
    }
}

impl FromScalar for Value {
    const EXPECTED: &'static str = "jsonb";

    fn from_scalar(value: ScalarValue) -> Result<Self, CastError> {
        match value {
            ScalarValue::Json(v) => Ok(v),
            ScalarValue::Text(s) => {
                serde_json::from_str(&s).map_err(|_| CastError::new(Self::EXPECTED, &ScalarValue::Text(s)))
            }
            other => Err(CastError::new(Self::EXPECTED, &other)),
        }
    }
}

impl FromScalar for Vec<String> {
    const EXPECTED: &'static str = "text[]";

    fn from_scalar(value: ScalarValue) -> Result<Self, CastError> {
        match value {
            ScalarValue::TextArray(items) => Ok(items),
            other => Err(CastError::new(Self::EXPECTED, &other)),
        }
    }
}

impl FromScalar for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_scalar(value: ScalarValue) -> Result<Self, CastError> {
        match value {
            ScalarValue::Bool(b) => Ok(b),
            other => Err(CastError::new(Self::EXPECTED, &other)),
        }
    }
}

impl FromScalar for i64 {
    const EXPECTED: &'static str = "bigint";

    fn from_scalar(value: ScalarValue) -> Result<Self, CastError> {
        match value {
            ScalarValue::Int(i) => Ok(i),
            other => Err(CastError::new(Self::EXPECTED, &other)),
        }
    }
}

impl<T: FromScalar> FromScalar for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_scalar(value: ScalarValue) -> Result<Self, CastError> {
        match value {
            ScalarValue::Null => Ok(None),
            other => T::from_scalar(other).map(Some),
        }
    }
}
