//! End-to-end scenarios: diff two snapshots, plan for a dialect, lint.

mod common;

use strata_core::prelude::*;

// =============================================================================
// Adding a NOT NULL column without a default
// =============================================================================

#[test]
fn test_add_not_null_column_is_a_warning() {
    let current = Schema::new("main", DialectFamily::Sqlite).table(common::users());
    let desired = Schema::new("main", DialectFamily::Sqlite).table(
        common::users().column(Column::new("email", "text").not_null()),
    );

    let diff = strata_core::diff(&current, &desired).unwrap();
    let plan = strata_core::plan(&diff.changes, &DialectCapabilities::sqlite()).unwrap();

    assert_eq!(plan.groups.len(), 1);
    let changes: Vec<&Change> = plan.changes().collect();
    assert_eq!(
        changes,
        vec![&Change::add_column("users", Column::new("email", "text").not_null())]
    );

    let report = strata_core::lint(&plan);
    assert!(!report.has_destructive());
    assert_eq!(report.len(), 1);
    let diagnostic = &report.diagnostics[0];
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert_eq!(diagnostic.reason, ReasonCode::NotNullWithoutDefault);
    assert_eq!(diagnostic.group, 0);
}

// =============================================================================
// Dropping a table that another table references
// =============================================================================

#[test]
fn test_drop_referenced_table_drops_foreign_key_first() {
    let sessions = Table::new("sessions")
        .column(Column::new("id", "bigint"))
        .primary_key(["id"]);
    let audit_log = Table::new("audit_log")
        .column(Column::new("id", "bigint"))
        .column(Column::new("session_id", "bigint"))
        .primary_key(["id"]);

    let current = Schema::new("public", DialectFamily::Postgres)
        .table(sessions)
        .table(audit_log.clone().foreign_key(ForeignKey::new(
            "fk_audit_session",
            ["session_id"],
            "sessions",
            ["id"],
        )));
    let desired = Schema::new("public", DialectFamily::Postgres).table(audit_log);

    let diff = strata_core::diff(&current, &desired).unwrap();
    let plan = strata_core::plan(&diff.changes, &DialectCapabilities::postgres()).unwrap();

    assert_eq!(plan.groups.len(), 2);
    assert_eq!(plan.groups[0].len(), 1);
    assert_eq!(plan.groups[1].len(), 1);
    assert!(matches!(
        &plan.groups[0].changes[0].change,
        Change::DropForeignKey { table, foreign_key } if table == "audit_log" && foreign_key.name == "fk_audit_session"
    ));
    assert!(matches!(
        &plan.groups[1].changes[0].change,
        Change::DropTable { table } if table.name == "sessions"
    ));

    let report = strata_core::lint(&plan);
    let destructive: Vec<ReasonCode> = report
        .iter()
        .filter(|d| d.severity == Severity::Destructive)
        .map(|d| d.reason)
        .collect();
    assert_eq!(destructive, vec![ReasonCode::DropForeignKey, ReasonCode::DropTable]);

    assert!(plan.apply_to(&current).unwrap().structurally_eq(&desired));
}

// =============================================================================
// Renaming a column on a dialect that cannot rename
// =============================================================================

#[test]
fn test_rename_without_capability_stays_drop_and_add() {
    let table = |name: &str| {
        common::users().column(Column::new(name, "text"))
    };
    let current = Schema::new("main", DialectFamily::Sqlite).table(table("name"));
    let desired = Schema::new("main", DialectFamily::Sqlite).table(table("full_name"));
    let caps = DialectCapabilities::sqlite().with(Capability::ColumnRename, false);

    let diff = strata_core::diff(&current, &desired).unwrap();
    let plan = strata_core::plan(&diff.changes, &caps).unwrap();

    let kinds: Vec<ChangeKind> = plan.changes().map(Change::kind).collect();
    assert_eq!(kinds, vec![ChangeKind::DropColumn, ChangeKind::AddColumn]);
    assert!(plan.rewrites.is_empty());
    assert_eq!(plan.groups.len(), 1);

    let report = strata_core::lint(&plan);
    assert_eq!(report.count(Severity::Destructive), 1);
    let drop = plan.changes().next().unwrap();
    let for_drop: Vec<&LintDiagnostic> = report.for_change(drop).collect();
    assert_eq!(for_drop.len(), 1);
    assert_eq!(for_drop[0].reason, ReasonCode::DropColumn);

    assert!(plan.apply_to(&current).unwrap().structurally_eq(&desired));
}

#[test]
fn test_rename_hint_produces_rename() {
    let current = Schema::new("main", DialectFamily::Sqlite)
        .table(common::users().column(Column::new("name", "text")));
    let desired = Schema::new("main", DialectFamily::Sqlite)
        .table(common::users().column(Column::new("full_name", "text")));

    let differ = Differ::with_options(
        DiffOptions::new().with_hints(RenameHints::new().column("users", "name", "full_name")),
    );
    let diff = differ.diff(&current, &desired).unwrap();
    assert_eq!(diff.changes, vec![Change::rename_column("users", "name", "full_name")]);

    let plan = strata_core::plan(&diff.changes, &DialectCapabilities::sqlite()).unwrap();
    let report = strata_core::lint(&plan);
    assert!(!report.has_destructive());
    assert_eq!(report.diagnostics[0].reason, ReasonCode::RenameBreaksClients);

    let err = strata_core::plan(
        &diff.changes,
        &DialectCapabilities::sqlite().with(Capability::ColumnRename, false),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        StrataError::UnsupportedChange(UnsupportedChange::MissingCapability {
            capability: Capability::ColumnRename,
            ..
        })
    ));
}

// =============================================================================
// A full release of the blog schema
// =============================================================================

#[test]
fn test_blog_release_on_postgres() {
    let current = common::blog(DialectFamily::Postgres);
    let desired = common::blog_next(DialectFamily::Postgres);
    let plan = common::round_trip(&current, &desired, &DialectCapabilities::postgres());

    let add_enum = common::group_of(&plan, ChangeKind::AddEnum, "user_status");
    let add_status = common::group_of(&plan, ChangeKind::AddColumn, "users.status");
    assert!(add_enum <= add_status);

    let drop_fk = common::group_of(&plan, ChangeKind::DropForeignKey, "audit_log.fk_audit_session");
    let drop_sessions = common::group_of(&plan, ChangeKind::DropTable, "sessions");
    assert!(drop_fk < drop_sessions);

    let report = strata_core::lint(&plan);
    assert!(report.has_destructive());
    assert_eq!(report.max_severity(), Some(Severity::Destructive));
    assert!(report.iter().any(|d| d.reason == ReasonCode::BlockingIndexBuild));
    assert!(report.iter().all(|d| d.reason != ReasonCode::NarrowingType));
}

#[test]
fn test_type_change_on_sqlite_rebuilds_column_and_index() {
    let current = common::blog(DialectFamily::Sqlite);
    let mut desired = common::blog(DialectFamily::Sqlite);
    let users = desired.get_table_mut("users").unwrap();
    users.get_column_mut("email").unwrap().column_type = ColumnType::parse("text");

    let diff = strata_core::diff(&current, &desired).unwrap();
    let plan = strata_core::plan(&diff.changes, &DialectCapabilities::sqlite()).unwrap();

    assert_eq!(plan.rewrites.len(), 1);
    let rewrite = &plan.rewrites[0];
    assert_eq!(rewrite.capability, Capability::AlterColumnType);
    assert!(matches!(rewrite.original, Change::ModifyColumn { .. }));
    assert_eq!(plan.len(), rewrite.steps);
    assert_eq!(plan.groups.len(), 1);

    let kinds: Vec<ChangeKind> = plan.changes().map(Change::kind).collect();
    assert_eq!(
        kinds,
        vec![
            ChangeKind::DropIndex,
            ChangeKind::AddColumn,
            ChangeKind::DropColumn,
            ChangeKind::RenameColumn,
            ChangeKind::AddIndex,
        ]
    );

    // The new column starts empty: the rebuild is lossy and one-way.
    assert!(!plan.groups[0].reversible);
    assert!(!plan.is_reversible());

    let report = strata_core::lint(&plan);
    let drop = plan
        .changes()
        .find(|c| c.kind() == ChangeKind::DropColumn)
        .unwrap();
    let on_drop: Vec<_> = report.for_change(drop).collect();
    assert_eq!(on_drop.len(), 1);
    assert_eq!(on_drop[0].severity, Severity::Destructive);
    assert_eq!(on_drop[0].reason, ReasonCode::DropColumn);
    assert!(on_drop[0].message.contains("rewritten"));
    assert_eq!(report.len(), 1);
    assert_eq!(report.max_severity(), Some(Severity::Destructive));

    // email is already the last column, so the rebuild keeps column order.
    assert!(plan.apply_to(&current).unwrap().structurally_eq(&desired));
}

// =============================================================================
// Enum referenced by its bare name in a JSON snapshot
// =============================================================================

#[test]
fn test_enum_named_in_json_is_created_first() {
    let current = Schema::new("public", DialectFamily::Postgres);
    let desired: Schema = serde_json::from_str(
        r#"{
            "name": "public",
            "dialect": "postgres",
            "enums": [{"name": "mood", "values": ["happy", "sad"]}],
            "tables": [{
                "name": "people",
                "columns": [
                    {"name": "id", "type": "bigint", "nullable": false},
                    {"name": "mood", "type": "mood"}
                ],
                "primary_key": {"columns": ["id"]}
            }]
        }"#,
    )
    .unwrap();

    let plan = common::round_trip(&current, &desired, &DialectCapabilities::postgres());
    let kinds: Vec<ChangeKind> = plan.changes().map(Change::kind).collect();
    assert_eq!(kinds, vec![ChangeKind::AddEnum, ChangeKind::AddTable]);
    let Some(Change::AddTable { table }) = plan.changes().nth(1) else {
        panic!("expected the table second");
    };
    assert_eq!(table.columns[1].logical_type().enum_name(), Some("mood"));
}

#[test]
fn test_cross_dialect_diff_is_rejected() {
    let err = strata_core::diff(
        &common::blog(DialectFamily::Postgres),
        &common::blog(DialectFamily::Mysql),
    )
    .unwrap_err();
    assert!(matches!(err, StrataError::IncompatibleSchema { .. }));
}
