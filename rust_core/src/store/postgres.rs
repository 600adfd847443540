//! Direct Postgres backend over a sqlx pool.
//!
//! Table and column names cannot be bound as parameters, so every
//! identifier is validated before it is spliced into SQL.

use super::{validate_identifier, Result, StoreError, TableStore};
use crate::config::env_parse;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct DbPoolConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Timeout for acquiring a connection
    pub acquire_timeout: Duration,
    /// How long idle connections are kept alive
    pub idle_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        // one sequential job per run
        Self {
            max_connections: 2,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DbPoolConfig {
    /// Defaults overridden by `DB_*` variables. A malformed value fails
    /// instead of falling back.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| env_parse(key, default.as_secs()).map(Duration::from_secs);

        let config = Self {
            max_connections: env_parse("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: env_parse("DB_MIN_CONNECTIONS", defaults.min_connections)?,
            acquire_timeout: secs("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout)?,
            idle_timeout: secs("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            max_lifetime: secs("DB_MAX_LIFETIME_SECS", defaults.max_lifetime)?,
        };
        if config.max_connections == 0 || config.min_connections > config.max_connections {
            anyhow::bail!(
                "DB_MIN_CONNECTIONS ({}) must not exceed a non-zero DB_MAX_CONNECTIONS ({})",
                config.min_connections,
                config.max_connections
            );
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, config: &DbPoolConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await?;

        info!(
            "Database pool created: max={}, min={}, acquire_timeout={}s",
            config.max_connections,
            config.min_connections,
            config.acquire_timeout.as_secs()
        );
        Ok(Self::new(pool))
    }
}

/// `INSERT ... SELECT` over `jsonb_populate_recordset`, restricted to the
/// columns present in the first row.
pub fn build_insert_sql(table: &str, rows: &[Value]) -> Result<String> {
    let table = validate_identifier(table)?;
    let first = rows
        .first()
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::Decode("insert rows must be JSON objects".to_string()))?;

    let mut columns = Vec::with_capacity(first.len());
    for column in first.keys() {
        if column.contains('.') {
            return Err(StoreError::InvalidIdentifier(column.clone()));
        }
        columns.push(validate_identifier(column)?);
    }
    if columns.is_empty() {
        return Err(StoreError::Decode("insert rows have no columns".to_string()));
    }

    let column_list = columns.join(", ");
    Ok(format!(
        "INSERT INTO {table} ({column_list}) SELECT {column_list} FROM jsonb_populate_recordset(NULL::{table}, $1)"
    ))
}

#[async_trait]
impl TableStore for PostgresStore {
    async fn select_all(&self, table: &str) -> Result<Vec<Value>> {
        let table = validate_identifier(table)?;
        let sql = format!("SELECT to_jsonb(t) AS row FROM {table} t");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| row.try_get::<Value, _>("row").map_err(StoreError::from))
            .collect()
    }

    async fn delete_all(&self, table: &str) -> Result<()> {
        let table = validate_identifier(table)?;
        let sql = format!("DELETE FROM {table} WHERE id <> -1");
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        debug!(table, deleted = result.rows_affected(), "Cleared table");
        Ok(())
    }

    async fn insert_batch(&self, table: &str, rows: &[Value]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = build_insert_sql(table, rows)?;
        let result = sqlx::query(&sql)
            .bind(Json(rows))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
