//! Error types for the connection provider.

use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("DB_POOL/maximumPoolSize is not a valid pool size ({value:?}): {reason}")]
    InvalidPoolSize { value: String, reason: String },

    #[error("DB_CONNECT_TIMEOUT/connectTimeout is not a valid number of seconds ({value:?}): {reason}")]
    InvalidTimeout { value: String, reason: String },

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load database settings: {0}")]
    Settings(#[from] config::ConfigError),

    /// The pool could not be built or could not hand out a connection.
    #[error(
        "Could not open a MySQL connection; check url/user/password in db.properties and that MySQL is running"
    )]
    Connect(#[source] sqlx::Error),

    #[error(transparent)]
    Schema(sqlx::Error),
}

impl DbError {
    /// True for errors raised while reading configuration, before any network activity.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DbError::InvalidPoolSize { .. }
                | DbError::InvalidTimeout { .. }
                | DbError::InvalidUrl(_)
                | DbError::Settings(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn connect_error_keeps_driver_error_as_source() {
        let err = DbError::Connect(sqlx::Error::PoolTimedOut);
        assert!(err.to_string().contains("Could not open a MySQL connection"));
        assert!(err.source().is_some());
        assert!(!err.is_configuration());
    }

    #[test]
    fn schema_error_is_transparent() {
        let err = DbError::Schema(sqlx::Error::RowNotFound);
        assert_eq!(err.to_string(), sqlx::Error::RowNotFound.to_string());
    }

    #[test]
    fn pool_size_error_is_configuration() {
        let err = DbError::InvalidPoolSize {
            value: "notanumber".into(),
            reason: "invalid digit found in string".into(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("notanumber"));
    }
}
