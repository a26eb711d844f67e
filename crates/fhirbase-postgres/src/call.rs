//! Remote function invocation.
//!
//! A [`FunctionCall`] names a stored function, accumulates its positional
//! parameters in order and is consumed by [`FunctionCall::execute`], which
//! runs it through a [`FunctionExecutor`] and casts the scalar result.
//!
//! ```ignore
//! let created: String = FunctionCall::qualified("fhir", "create")
//!     .with_json(resource_json)
//!     .execute(&executor)
//!     .await?;
//! ```

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::RemoteCallError;
use crate::param::{FromScalar, ScalarValue, SqlParam};

/// Separator between schema and function name.
pub const SCHEMA_SEPARATOR: &str = ".";

/// Runs stored-function calls against a backing store.
///
/// Each `invoke` performs exactly one remote call on its own scoped
/// connection and releases it before returning, whatever the outcome.
/// Implementations must be thread-safe; concurrent invocations must not
/// share connection state.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    /// Invokes `call` and returns the single scalar it produced.
    ///
    /// # Errors
    ///
    /// Returns `RemoteCallError` if no connection can be acquired or the
    /// store fails to execute the function.
    async fn invoke(&self, call: &FunctionCall) -> Result<ScalarValue, RemoteCallError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A single stored-function invocation under construction.
///
/// Parameters are positional: they are sent in the order they were added and
/// must match the function's declared signature.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a FunctionCall does nothing until executed"]
pub struct FunctionCall {
    name: String,
    params: Vec<SqlParam>,
}

impl FunctionCall {
    /// Starts a call to `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Starts a call to `schema.name`.
    pub fn qualified(schema: &str, name: &str) -> Self {
        if schema.is_empty() {
            Self::new(name)
        } else {
            Self::new(format!("{schema}{SCHEMA_SEPARATOR}{name}"))
        }
    }

    pub fn with_text(self, value: impl Into<String>) -> Self {
        self.with_param(SqlParam::Text(value.into()))
    }

    /// Appends a JSON document, passed to the store as `jsonb`.
    pub fn with_json(self, json: impl Into<String>) -> Self {
        self.with_param(SqlParam::Json(json.into()))
    }

    pub fn with_text_array<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_param(SqlParam::TextArray(
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn with_int(self, value: i32) -> Self {
        self.with_param(SqlParam::Int(value))
    }

    pub fn with_param(mut self, param: SqlParam) -> Self {
        self.params.push(param);
        self
    }

    /// Fully qualified function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// The `SELECT` statement invoking this function, with one typed
    /// placeholder per parameter.
    pub fn to_sql(&self) -> String {
        let function = self
            .name
            .split(SCHEMA_SEPARATOR)
            .map(quote_identifier)
            .collect::<Vec<_>>()
            .join(SCHEMA_SEPARATOR);
        let placeholders = self
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| format!("${}::{}", i + 1, param.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {function}({placeholders})")
    }

    /// Executes the call once and casts its result to `T`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteCallError` carrying the function name if the invocation
    /// fails or the result cannot be cast to `T`.
    #[instrument(
        name = "fhirbase.call",
        skip_all,
        fields(function = %self.name, params = self.params.len(), backend = executor.backend_name())
    )]
    pub async fn execute<T, E>(self, executor: &E) -> Result<T, RemoteCallError>
    where
        T: FromScalar,
        E: FunctionExecutor + ?Sized,
    {
        let value = executor.invoke(&self).await.inspect_err(|e| {
            warn!(kind = %e.kind(), reason = e.reason(), "FHIRbase function call failed");
        })?;

        let result = T::from_scalar(value).map_err(|e| {
            warn!(error = %e, "FHIRbase function returned an unexpected type");
            RemoteCallError::cast(&self.name, e.to_string())
        })?;

        debug!(expected = T::EXPECTED, "FHIRbase function call completed");
        Ok(result)
    }
}

fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
