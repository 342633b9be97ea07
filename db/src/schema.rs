//! The `books` schema.
//!
//! MySQL has no `CREATE INDEX IF NOT EXISTS`, so each index is looked up in
//! `INFORMATION_SCHEMA.STATISTICS` and only added when it is missing. Running
//! [`ensure_schema`] any number of times leaves the same table and indexes.
//! Two sessions can both see an index as missing; the loser's `ADD INDEX`
//! fails with a duplicate key name, which counts as success.

use sqlx::mysql::{MySqlConnection, MySqlDatabaseError};
use tracing::debug;

use crate::pool::{execute, StatementCache};

pub const BOOKS_TABLE: &str = "books";

/// `ER_DUP_KEYNAME`: the index was created by another session.
const ER_DUP_KEYNAME: u16 = 1061;

const CREATE_BOOKS: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    id INT AUTO_INCREMENT PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    author VARCHAR(255) NOT NULL,
    year INT NOT NULL,
    favorite TINYINT(1) NOT NULL DEFAULT 0
)
"#;

/// A secondary index on a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub column: &'static str,
}

pub const BOOKS_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "idx_books_favorite",
        column: "favorite",
    },
    IndexSpec {
        name: "idx_books_title",
        column: "title",
    },
    IndexSpec {
        name: "idx_books_author",
        column: "author",
    },
];

const INDEX_EXISTS: &str = "SELECT COUNT(*) FROM INFORMATION_SCHEMA.STATISTICS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME = ?";

const TABLE_EXISTS: &str = "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";

const LIST_INDEXES: &str = "SELECT DISTINCT CAST(INDEX_NAME AS CHAR) FROM INFORMATION_SCHEMA.STATISTICS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? ORDER BY 1";

/// Create the `books` table and its indexes if they are missing.
pub async fn ensure_schema(
    conn: &mut MySqlConnection,
    cache: &StatementCache,
) -> Result<(), sqlx::Error> {
    execute(conn, CREATE_BOOKS).await?;

    for index in BOOKS_INDEXES {
        create_index_if_missing(conn, cache, BOOKS_TABLE, index).await?;
    }

    Ok(())
}

async fn create_index_if_missing(
    conn: &mut MySqlConnection,
    cache: &StatementCache,
    table: &str,
    index: &IndexSpec,
) -> Result<(), sqlx::Error> {
    if index_exists(conn, cache, table, index.name).await? {
        return Ok(());
    }

    let statement = add_index_sql(table, index);
    match execute(conn, &statement).await {
        Ok(()) => debug!(table, index = index.name, "Created missing index"),
        Err(err) if is_duplicate_key_name(&err) => {
            debug!(table, index = index.name, "Index created concurrently")
        }
        Err(err) => return Err(err),
    }
    Ok(())
}

fn is_duplicate_key_name(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.try_downcast_ref::<MySqlDatabaseError>())
        .is_some_and(|e| e.number() == ER_DUP_KEYNAME)
}

fn add_index_sql(table: &str, index: &IndexSpec) -> String {
    format!(
        "ALTER TABLE {} ADD INDEX {} ({})",
        table, index.name, index.column
    )
}

async fn index_exists(
    conn: &mut MySqlConnection,
    cache: &StatementCache,
    table: &str,
    index: &str,
) -> Result<bool, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(INDEX_EXISTS)
        .bind(table)
        .bind(index)
        .persistent(cache.admits(INDEX_EXISTS))
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

/// What the metadata catalog says about the `books` schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub table_present: bool,
    /// Index names on the table, `PRIMARY` included.
    pub indexes: Vec<String>,
}

impl SchemaReport {
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|index| index == name)
    }

    /// Required indexes that are not present.
    pub fn missing_indexes(&self) -> Vec<&'static str> {
        BOOKS_INDEXES
            .iter()
            .map(|index| index.name)
            .filter(|name| !self.has_index(name))
            .collect()
    }

    /// The table and every required index exist.
    pub fn is_complete(&self) -> bool {
        self.table_present && self.missing_indexes().is_empty()
    }
}

/// Read the current state of the `books` schema.
pub async fn inspect(conn: &mut MySqlConnection) -> Result<SchemaReport, sqlx::Error> {
    let (tables,): (i64,) = sqlx::query_as(TABLE_EXISTS)
        .bind(BOOKS_TABLE)
        .fetch_one(&mut *conn)
        .await?;

    let indexes: Vec<(String,)> = sqlx::query_as(LIST_INDEXES)
        .bind(BOOKS_TABLE)
        .fetch_all(&mut *conn)
        .await?;

    Ok(SchemaReport {
        table_present: tables > 0,
        indexes: indexes.into_iter().map(|(name,)| name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_is_conditional() {
        assert!(CREATE_BOOKS.contains("CREATE TABLE IF NOT EXISTS books"));
        assert!(CREATE_BOOKS.contains("favorite TINYINT(1) NOT NULL DEFAULT 0"));
    }

    #[test]
    fn add_index_statement() {
        assert_eq!(
            add_index_sql(BOOKS_TABLE, &BOOKS_INDEXES[1]),
            "ALTER TABLE books ADD INDEX idx_books_title (title)"
        );
    }

    #[test]
    fn only_duplicate_key_name_is_tolerated() {
        assert!(!is_duplicate_key_name(&sqlx::Error::RowNotFound));
        assert!(!is_duplicate_key_name(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn metadata_queries_are_cacheable() {
        let cache = StatementCache::default();
        assert!(cache.admits(INDEX_EXISTS));
        assert!(cache.admits(TABLE_EXISTS));
    }

    #[test]
    fn report_lists_missing_indexes() {
        let report = SchemaReport {
            table_present: true,
            indexes: vec!["PRIMARY".into(), "idx_books_title".into()],
        };

        assert!(report.has_index("idx_books_title"));
        assert_eq!(
            report.missing_indexes(),
            vec!["idx_books_favorite", "idx_books_author"]
        );
        assert!(!report.is_complete());
    }

    #[test]
    fn report_complete_requires_table_and_indexes() {
        let mut report = SchemaReport {
            table_present: false,
            indexes: BOOKS_INDEXES.iter().map(|i| i.name.to_string()).collect(),
        };
        assert!(!report.is_complete());

        report.table_present = true;
        assert!(report.is_complete());

        assert!(!SchemaReport::default().is_complete());
    }
}
