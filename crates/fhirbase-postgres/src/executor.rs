//! PostgreSQL implementation of [`FunctionExecutor`].

use async_trait::async_trait;
use serde_json::Value;
use sqlx_core::column::Column;
use sqlx_core::error::Error as SqlxError;
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_core::type_info::TypeInfo;
use sqlx_postgres::{PgPool, PgRow, Postgres};
use tracing::{debug, trace};

use crate::call::{FunctionCall, FunctionExecutor};
use crate::config::PostgresConfig;
use crate::error::{RemoteCallError, Result, is_undefined_function};
use crate::param::{ScalarValue, SqlParam};
use crate::pool;

/// Executes stored-function calls on pooled PostgreSQL connections.
///
/// Each invocation checks a connection out of the pool, runs a single
/// `SELECT schema.function(...)` and returns the connection to the pool when
/// the checkout guard drops.
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    /// Creates an executor with its own lazily connected pool.
    ///
    /// The server is first contacted by [`invoke`](FunctionExecutor::invoke),
    /// where an unreachable store is reported as a connection-kind
    /// [`RemoteCallError`]. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot produce a pool.
    pub fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(config)?;
        Ok(Self { pool })
    }

    /// Creates an executor from an existing connection pool.
    ///
    /// This allows sharing a connection pool between multiple components.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FunctionExecutor for PostgresExecutor {
    async fn invoke(&self, call: &FunctionCall) -> std::result::Result<ScalarValue, RemoteCallError> {
        let sql = call.to_sql();
        trace!(%sql, "invoking stored function");

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RemoteCallError::from_sqlx(call.name(), e))?;

        let mut statement = query::<Postgres>(&sql);
        for param in call.params() {
            statement = match param {
                SqlParam::Text(value) | SqlParam::Json(value) => statement.bind(value.as_str()),
                SqlParam::TextArray(values) => statement.bind(values.as_slice()),
                SqlParam::Int(value) => statement.bind(*value),
            };
        }

        let row = statement.fetch_one(&mut *conn).await.map_err(|e| {
            if is_undefined_function(&e) {
                debug!(function = call.name(), "stored function is not installed");
            }
            RemoteCallError::from_sqlx(call.name(), e)
        })?;

        decode_scalar(&row).map_err(|e| RemoteCallError::from_sqlx(call.name(), e))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Reads the first column of `row` according to its declared type.
fn decode_scalar(row: &PgRow) -> std::result::Result<ScalarValue, SqlxError> {
    let column = row
        .columns()
        .first()
        .ok_or(SqlxError::ColumnIndexOutOfBounds { index: 0, len: 0 })?;

    let value = match column.type_info().name() {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            row.try_get::<Option<String>, _>(0)?.map(ScalarValue::Text)
        }
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(0)?.map(ScalarValue::Json),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => row
            .try_get::<Option<Vec<String>>, _>(0)?
            .map(ScalarValue::TextArray),
        "BOOL" => row.try_get::<Option<bool>, _>(0)?.map(ScalarValue::Bool),
        "INT8" => row.try_get::<Option<i64>, _>(0)?.map(ScalarValue::Int),
        "INT4" => row
            .try_get::<Option<i32>, _>(0)?
            .map(|v| ScalarValue::Int(i64::from(v))),
        "INT2" => row
            .try_get::<Option<i16>, _>(0)?
            .map(|v| ScalarValue::Int(i64::from(v))),
        "VOID" => None,
        other => {
            return Err(SqlxError::TypeNotFound {
                type_name: other.to_string(),
            });
        }
    };

    Ok(value.unwrap_or(ScalarValue::Null))
}
