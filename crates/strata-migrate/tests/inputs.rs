//! Integration tests: JSON inputs on disk through to plans and verification.

use std::fs;
use std::path::{Path, PathBuf};

use sqlx::sqlite::SqlitePoolOptions;
use strata_core::prelude::*;
use strata_migrate::prelude::*;

const CURRENT: &str = r#"{
  "name": "main",
  "dialect": "sqlite",
  "tables": [
    {
      "name": "users",
      "columns": [
        { "name": "id", "type": "INTEGER", "nullable": false },
        { "name": "name", "type": "TEXT" }
      ],
      "primary_key": { "columns": ["id"] }
    }
  ]
}"#;

const DESIRED: &str = r#"{
  "name": "main",
  "dialect": "sqlite",
  "tables": [
    {
      "name": "users",
      "columns": [
        { "name": "id", "type": "INTEGER", "nullable": false },
        { "name": "full_name", "type": "TEXT" },
        { "name": "email", "type": "TEXT", "nullable": false }
      ],
      "primary_key": { "columns": ["id"] }
    }
  ]
}"#;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_plan_from_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let current = load_schema(&write(dir.path(), "current.json", CURRENT)).unwrap();
    let desired = load_schema(&write(dir.path(), "desired.json", DESIRED)).unwrap();

    let caps = resolve_capabilities(None, None, current.dialect).unwrap();
    let diff = strata_core::diff(&current, &desired).unwrap();
    let plan = strata_core::plan(&diff.changes, &caps).unwrap();
    let lint = strata_core::lint(&plan);

    assert_eq!(plan.family, DialectFamily::Sqlite);
    assert_eq!(lint.count(Severity::Destructive), 1);
    assert_eq!(lint.count(Severity::Warning), 1);

    let text = render_plan(&plan, &lint);
    assert!(text.contains("Group 1"));
    assert!(text.ends_with("1 destructive, 1 warning(s), 1 notice(s)\n"));
}

#[test]
fn test_collapsed_rename_from_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let current = load_schema(&write(dir.path(), "current.json", CURRENT)).unwrap();
    let desired = load_schema(&write(dir.path(), "desired.json", DESIRED)).unwrap();

    let diff = strata_core::diff(&current, &desired).unwrap();
    let plan = Planner::new(DialectCapabilities::sqlite())
        .with_options(PlannerOptions::new().with_collapse_renames())
        .plan(&diff.changes)
        .unwrap();

    assert!(plan
        .changes()
        .any(|c| *c == Change::rename_column("users", "name", "full_name")));
    assert!(!strata_core::lint(&plan).has_destructive());
}

#[test]
fn test_custom_capabilities_file() {
    let dir = tempfile::tempdir().unwrap();
    let custom = DialectCapabilities::sqlite().with(Capability::ColumnRename, false);
    let path = write(
        dir.path(),
        "caps.json",
        &serde_json::to_string_pretty(&custom).unwrap(),
    );

    let caps = resolve_capabilities(Some(&path), Some(DialectFamily::Sqlite), DialectFamily::Sqlite)
        .unwrap();
    assert!(!caps.supports_column_rename);
}

#[test]
fn test_records_file_round_trip_through_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "records.json",
        r#"[
          { "version": 1, "statements": ["CREATE TABLE users (id INTEGER PRIMARY KEY)"], "applied_at": "2026-02-01T10:00:00Z" },
          { "version": 2, "description": "add name", "statements": ["ALTER TABLE users ADD COLUMN name TEXT"], "applied_at": "2026-02-02T10:00:00Z" }
        ]"#,
    );

    let records = load_records(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.hash.is_empty()));
    assert!(matches!(
        strata_core::verify(&records),
        Err(StrataError::HashMismatch { version: 1, .. })
    ));

    let hashed: Vec<MigrationRecord> = records
        .iter()
        .map(|r| MigrationRecord {
            hash: r.computed_hash(),
            ..r.clone()
        })
        .collect();
    let sum = HistorySum::compute(&hashed);
    let text = render_hashes(&records, &sum);
    assert!(text.contains(&records[0].computed_hash()));
    assert!(text.ends_with(&sum.to_string()));

    assert!(HistoryVerifier::new()
        .verify_sum(&hashed, &format!("h1:{}", sum.total))
        .is_ok());
}

#[tokio::test]
async fn test_verify_history_store() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    sqlx::query(CREATE_REVISIONS_TABLE_SQL).execute(&pool).await.unwrap();

    let migrations: [&[&str]; 3] = [
        &["CREATE TABLE users (id INTEGER PRIMARY KEY)"],
        &["ALTER TABLE users ADD COLUMN email TEXT"],
        &["CREATE INDEX idx_users_email ON users (email)"],
    ];
    for (i, statements) in migrations.iter().enumerate() {
        sqlx::query("INSERT INTO strata_revisions (version, statements, hash) VALUES (?, ?, ?)")
            .bind(i64::try_from(i + 1).unwrap())
            .bind(serde_json::to_string(statements).unwrap())
            .bind(content_hash(*statements))
            .execute(&pool)
            .await
            .unwrap();
    }

    let store = HistoryStore::new(pool.clone());
    let records = store.records().await.unwrap();
    let report = strata_core::verify(&records).unwrap();
    assert_eq!(report.records_checked, 3);
    assert_eq!(report.last_version, Some(3));

    sqlx::query("UPDATE strata_revisions SET statements = ? WHERE version = 2")
        .bind(r#"["ALTER TABLE users ADD COLUMN phone TEXT"]"#)
        .execute(&pool)
        .await
        .unwrap();

    let records = store.records().await.unwrap();
    assert!(matches!(
        strata_core::verify(&records),
        Err(StrataError::HashMismatch { version: 2, .. })
    ));
}
