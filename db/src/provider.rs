//! The connection provider.
//!
//! Owns the settings and a lazily built pool. Every connection handed out by
//! [`ConnectionProvider::acquire`] has autocommit disabled and sits on top of
//! a verified `books` schema.

use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::once::OnceResource;
use crate::pool::{create_pool, execute};
use crate::schema::{self, SchemaReport};
use crate::settings::Settings;

#[derive(Debug)]
struct Inner {
    settings: Settings,
    pool: OnceResource<MySqlPool>,
}

/// Hands out ready connections. Cheap to clone; clones share one pool.
#[derive(Debug, Clone)]
pub struct ConnectionProvider {
    inner: Arc<Inner>,
}

impl ConnectionProvider {
    /// Create a provider. No connection is opened until the first acquire.
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                pool: OnceResource::new(),
            }),
        }
    }

    /// Create a provider from the process environment and `db.properties`.
    ///
    /// Configuration errors such as a malformed `DB_POOL` are returned here,
    /// before any network activity.
    pub fn from_env() -> DbResult<Self> {
        Ok(Self::new(Settings::load()?))
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// The pool, built on first use.
    pub async fn pool(&self) -> DbResult<&MySqlPool> {
        self.inner
            .pool
            .get_or_try_init(|| create_pool(&self.inner.settings))
            .await
    }

    /// Number of pools this provider has built. Never more than one.
    pub fn pool_constructions(&self) -> usize {
        self.inner.pool.constructions()
    }

    /// Get a connection with autocommit disabled and the schema ensured.
    ///
    /// The schema check runs in the connection's own transaction and is
    /// committed before the connection is returned; the caller commits or rolls
    /// back its own work. If the schema check fails the transaction is rolled
    /// back and the connection released before the error is returned.
    pub async fn acquire(&self) -> DbResult<PoolConnection<MySql>> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await.map_err(DbError::Connect)?;

        execute(&mut conn, "SET autocommit = 0")
            .await
            .map_err(DbError::Connect)?;

        if let Err(err) = schema::ensure_schema(&mut conn, &self.inner.settings.statement_cache).await
        {
            if let Err(rollback) = execute(&mut conn, "ROLLBACK").await {
                warn!(error = %rollback, "Rollback after schema failure failed");
            }
            drop(conn);
            return Err(DbError::Schema(err));
        }

        execute(&mut conn, "COMMIT").await.map_err(DbError::Schema)?;
        debug!(pool = %self.inner.settings.pool_name, "Connection ready");
        Ok(conn)
    }

    /// Report on the `books` schema using a pooled connection.
    pub async fn inspect_schema(&self) -> DbResult<SchemaReport> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await.map_err(DbError::Connect)?;
        schema::inspect(&mut conn).await.map_err(DbError::Schema)
    }

    /// Close the pool if it was built. Waits for checked-out connections to return.
    pub async fn close(&self) {
        if let Some(pool) = self.inner.pool.get() {
            pool.close().await;
        }
    }
}
