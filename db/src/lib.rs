//! # library-db: MySQL connection provider
//!
//! Hands out ready-to-use connections to the library database. The first
//! [`ConnectionProvider::acquire`] builds the pool; every acquire makes sure
//! the `books` table and its indexes exist before the connection is returned.
//!
//! ## Modules
//!
//! - [`settings`] – URL, credentials and pool size from env, `db.properties` or defaults
//! - [`url`] – `mysql://` / `jdbc:mysql://` URL handling
//! - [`pool`] – pool construction and the prepared statement cache policy
//! - [`once`] – once-guarded lazy resource
//! - [`schema`] – idempotent `books` schema creation and inspection
//! - [`provider`] – [`ConnectionProvider`]
//! - [`error`] – [`DbError`]
//!
//! ```ignore
//! let provider = ConnectionProvider::from_env()?;
//! let mut conn = provider.acquire().await?;
//! sqlx::query("INSERT INTO books (title, author, year) VALUES (?, ?, ?)")
//!     .bind("Dune")
//!     .bind("Frank Herbert")
//!     .bind(1965)
//!     .execute(&mut *conn)
//!     .await?;
//! sqlx::query("COMMIT").execute(&mut *conn).await?;
//! ```

pub mod error;
pub mod once;
pub mod pool;
pub mod provider;
pub mod schema;
pub mod settings;
pub mod url;

pub use error::{DbError, DbResult};
pub use pool::StatementCache;
pub use provider::ConnectionProvider;
pub use schema::SchemaReport;
pub use settings::Settings;
