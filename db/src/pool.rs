//! MySQL connection pool construction.
//!
//! Uses sqlx `MySqlPool` with explicit connection limits and a per-connection
//! prepared statement cache.

use std::io;

use sqlx::mysql::{MySqlConnection, MySqlPoolOptions};
use sqlx::{Connection, Executor, MySqlPool};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::settings::Settings;

/// Prepared statement cache policy, fixed when the pool is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementCache {
    /// Statements kept per connection.
    pub capacity: usize,
    /// Longest SQL text, in bytes, that is cached.
    pub sql_limit: usize,
}

impl Default for StatementCache {
    fn default() -> Self {
        Self {
            capacity: 250,
            sql_limit: 2048,
        }
    }
}

impl StatementCache {
    /// Whether `sql` should be kept as a cached prepared statement.
    pub fn admits(&self, sql: &str) -> bool {
        self.capacity > 0 && sql.len() <= self.sql_limit
    }
}

/// Create the MySQL pool described by `settings`.
///
/// Creates the database first when the URL asks for it. Connections returned
/// to the pool are rolled back and put back into autocommit mode.
///
/// # Errors
///
/// Returns [`DbError::Connect`] if the server cannot be reached or rejects the
/// credentials.
pub async fn create_pool(settings: &Settings) -> DbResult<MySqlPool> {
    info!(
        pool = %settings.pool_name,
        max_connections = settings.maximum_pool_size,
        user = %settings.effective_user(),
        url = %settings.url,
        "Initializing MySQL pool"
    );

    if settings.url.create_if_missing() {
        create_database_if_missing(settings).await?;
    }

    let options = settings
        .connect_options()?
        .statement_cache_capacity(settings.statement_cache.capacity);

    MySqlPoolOptions::new()
        .max_connections(settings.maximum_pool_size)
        .acquire_timeout(settings.connect_timeout)
        .after_release(|conn, _meta| {
            Box::pin(async move {
                execute(conn, "ROLLBACK").await?;
                execute(conn, "SET autocommit = 1").await?;
                Ok(true)
            })
        })
        .connect_with(options)
        .await
        .map_err(DbError::Connect)
}

async fn create_database_if_missing(settings: &Settings) -> DbResult<()> {
    let Some(database) = settings.url.database() else {
        return Ok(());
    };

    let options = settings.server_options()?;

    let mut conn = tokio::time::timeout(
        settings.connect_timeout,
        MySqlConnection::connect_with(&options),
    )
    .await
    .map_err(|_| {
        DbError::Connect(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            "timed out connecting to MySQL server",
        )))
    })?
    .map_err(DbError::Connect)?;

    let statement = format!(
        "CREATE DATABASE IF NOT EXISTS `{}`",
        database.replace('`', "``")
    );
    execute(&mut conn, &statement)
        .await
        .map_err(DbError::Connect)?;
    conn.close().await.map_err(DbError::Connect)?;

    info!(database, "Database ensured");
    Ok(())
}

/// Run `sql` over the text protocol, bypassing the statement cache.
pub(crate) async fn execute(conn: &mut MySqlConnection, sql: &str) -> Result<(), sqlx::Error> {
    conn.execute(sql).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn statement_cache_defaults() {
        let cache = StatementCache::default();
        assert_eq!(cache.capacity, 250);
        assert_eq!(cache.sql_limit, 2048);
    }

    #[test]
    fn statement_cache_skips_long_sql() {
        let cache = StatementCache::default();
        assert!(cache.admits("SELECT 1"));
        assert!(cache.admits(&"x".repeat(2048)));
        assert!(!cache.admits(&"x".repeat(2049)));

        let disabled = StatementCache {
            capacity: 0,
            ..StatementCache::default()
        };
        assert!(!disabled.admits("SELECT 1"));
    }

    #[tokio::test]
    async fn unreachable_server_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("DB_URL", "mysql://127.0.0.1:1/library"),
            ("DB_CONNECT_TIMEOUT", "1"),
        ]);
        let settings = Settings::load_with(&dir.path().join("db.properties"), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        let err = create_pool(&settings).await.unwrap_err();
        assert!(matches!(err, DbError::Connect(_)), "got {err:?}");
    }

    // Integration tests require a real database
    // Run with: DB_URL=mysql://... cargo test -p library-db -- --ignored

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pool_acquires_connection() {
        let settings = Settings::load().expect("settings");
        let pool = create_pool(&settings).await.expect("pool creation failed");

        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");

        assert_eq!(result.0, 1);
        pool.close().await;
    }
}
