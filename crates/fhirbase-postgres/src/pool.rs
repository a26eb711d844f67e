//! Lazily connected pool for stored-function calls.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgConnectOptions, PgPool, Postgres};
use tracing::{info, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};

/// Type alias for PostgreSQL pool options.
pub type PgPoolOptions = PoolOptions<Postgres>;

const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// Builds a connection pool that opens connections on first use.
///
/// No connection is attempted here, so an unreachable server is reported by
/// the first stored-function call as a connection-kind
/// [`RemoteCallError`](crate::RemoteCallError). Must be called from within a
/// Tokio runtime because the pool spawns its reaper task on creation.
///
/// # Errors
///
/// Returns [`PostgresError::Config`] for invalid pool sizing and
/// [`PostgresError::ConnectOptions`] when the URL cannot be parsed.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    if config.pool_size == 0 {
        return Err(PostgresError::config("pool_size must be at least 1"));
    }
    let min_connections = config.min_connections.unwrap_or(0);
    if min_connections > config.pool_size {
        return Err(PostgresError::config(format!(
            "min_connections ({min_connections}) exceeds pool_size ({})",
            config.pool_size
        )));
    }

    let connect_options: PgConnectOptions = config.url.parse()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .idle_timeout(config.idle_timeout_ms.map(Duration::from_millis))
        .max_lifetime(Duration::from_secs(
            config.max_lifetime_secs.unwrap_or(DEFAULT_MAX_LIFETIME_SECS),
        ))
        .test_before_acquire(false)
        .connect_lazy_with(connect_options);

    info!(
        pool_size = config.pool_size,
        min_connections,
        connect_timeout_ms = config.connect_timeout_ms,
        "PostgreSQL pool ready, connecting on first call"
    );

    Ok(pool)
}

/// Masks the password in a database URL for logging.
pub(crate) fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
