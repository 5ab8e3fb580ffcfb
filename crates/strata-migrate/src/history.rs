//! Reading applied migrations from a history store.
//!
//! The store is the `strata_revisions` table. Rows are read in insertion
//! order so that the verifier sees the history exactly as it was applied.
//! This module never writes to the table.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use strata_core::history::MigrationRecord;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// SQL that creates the history table (SQLite).
pub const CREATE_REVISIONS_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS strata_revisions (
    version INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    statements TEXT NOT NULL,
    hash TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

type Row = (i64, i64, String, String, String, String);

/// Parses a stored timestamp, accepting RFC 3339 and SQLite's `datetime()`.
fn parse_applied_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite datetime format fallback
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .ok()
}

fn to_record((row, version, description, statements, hash, applied_at): Row) -> Result<MigrationRecord> {
    let invalid = |message: String| MigrateError::InvalidRecord { row, message };

    let version = u64::try_from(version).map_err(|_| invalid(format!("negative version {version}")))?;
    let statements: Vec<String> = serde_json::from_str(&statements)
        .map_err(|e| invalid(format!("statements are not a JSON string array: {e}")))?;
    let applied_at = parse_applied_at(&applied_at)
        .ok_or_else(|| invalid(format!("unreadable timestamp '{applied_at}'")))?;

    Ok(MigrationRecord {
        version,
        description,
        statements,
        hash,
        applied_at,
    })
}

/// Read-only access to the migration history table.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Creates a store over an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to a SQLite database.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(1).connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Returns true if the history table exists.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn exists(&self) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'strata_revisions'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Reads every record in the order it was applied.
    ///
    /// A database without a history table has an empty history.
    ///
    /// # Errors
    ///
    /// Fails on database errors or if a row cannot be read as a record.
    pub async fn records(&self) -> Result<Vec<MigrationRecord>> {
        if !self.exists().await? {
            debug!("No history table, history is empty");
            return Ok(Vec::new());
        }

        let rows: Vec<Row> = sqlx::query_as(
            "SELECT rowid, version, description, statements, hash, applied_at \
             FROM strata_revisions ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let records = rows.into_iter().map(to_record).collect::<Result<Vec<_>>>()?;
        debug!(records = records.len(), "Read migration history");
        Ok(records)
    }

    /// Counts applied migrations.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn count(&self) -> Result<i64> {
        if !self.exists().await? {
            return Ok(0);
        }
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM strata_revisions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::history::content_hash;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn insert(pool: &SqlitePool, version: i64, statements: &[&str], applied_at: &str) {
        sqlx::query(
            "INSERT INTO strata_revisions (version, description, statements, hash, applied_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(version)
        .bind(format!("migration {version}"))
        .bind(serde_json::to_string(statements).unwrap())
        .bind(content_hash(statements))
        .bind(applied_at)
        .execute(pool)
        .await
        .unwrap();
    }

    #[test]
    fn test_parse_applied_at() {
        assert!(parse_applied_at("2026-03-01T12:00:00Z").is_some());
        assert!(parse_applied_at("2026-03-01T12:00:00+02:00").is_some());
        assert!(parse_applied_at("2026-03-01 12:00:00").is_some());
        assert!(parse_applied_at("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_missing_table_is_empty_history() {
        let store = HistoryStore::new(create_test_pool().await);
        assert!(!store.exists().await.unwrap());
        assert!(store.records().await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_records_in_insertion_order() {
        let pool = create_test_pool().await;
        sqlx::query(CREATE_REVISIONS_TABLE_SQL).execute(&pool).await.unwrap();
        insert(&pool, 2, &["CREATE TABLE b (id INTEGER)"], "2026-03-02 09:00:00").await;
        insert(&pool, 1, &["CREATE TABLE a (id INTEGER)"], "2026-03-01T09:00:00Z").await;

        let store = HistoryStore::new(pool);
        let records = store.records().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(records.iter().map(|r| r.version).collect::<Vec<_>>(), vec![2, 1]);
        assert!(records.iter().all(MigrationRecord::is_intact));
        assert_eq!(records[0].description, "migration 2");
    }

    #[tokio::test]
    async fn test_bad_statements_column() {
        let pool = create_test_pool().await;
        sqlx::query(CREATE_REVISIONS_TABLE_SQL).execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO strata_revisions (version, statements, hash) VALUES (1, 'DROP TABLE x', '')")
            .execute(&pool)
            .await
            .unwrap();

        let err = HistoryStore::new(pool).records().await.unwrap_err();
        assert!(matches!(err, MigrateError::InvalidRecord { row: 1, .. }));
    }
}
