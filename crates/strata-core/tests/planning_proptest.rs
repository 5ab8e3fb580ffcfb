//! Property-based tests for diffing and planning.
//!
//! Random pairs of schemas within one dialect family are diffed and planned;
//! replaying the plan must reach the desired schema.

use proptest::prelude::*;
use strata_core::prelude::*;

const TYPES: [&str; 7] = [
    "int",
    "bigint",
    "text",
    "varchar(50)",
    "boolean",
    "timestamptz",
    "numeric(10,2)",
];

#[derive(Debug, Clone)]
struct TableSpec {
    columns: Vec<(usize, bool)>,
    indexed: bool,
    parent: bool,
}

/// Generate a random table shape
fn arb_table() -> impl Strategy<Value = TableSpec> {
    (
        prop::collection::vec((0..TYPES.len(), any::<bool>()), 0..6),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(columns, indexed, parent)| TableSpec {
            columns,
            indexed,
            parent,
        })
}

fn build(dialect: DialectFamily, specs: &[TableSpec]) -> Schema {
    let mut schema = Schema::new("app", dialect);
    for (i, shape) in specs.iter().enumerate() {
        let name = format!("t{i}");
        let mut table = Table::new(name.as_str()).column(Column::new("id", "bigint"));
        if i > 0 && shape.parent {
            table = table
                .column(Column::new("parent_id", "bigint"))
                .foreign_key(ForeignKey::new(format!("fk_{name}_parent"), ["parent_id"], "t0", ["id"]));
        }
        for (j, &(ty, nullable)) in shape.columns.iter().enumerate() {
            let column = Column::new(format!("c{j}"), TYPES[ty]);
            table = table.column(if nullable { column } else { column.not_null() });
        }
        if shape.indexed && !shape.columns.is_empty() {
            table = table.index(Index::new(format!("idx_{name}_c0"), ["c0"]));
        }
        schema = schema.table(table.primary_key(["id"]));
    }
    schema
}

/// Generate a random schema; `t0` always exists and is the parent table
fn arb_schema(dialect: DialectFamily) -> impl Strategy<Value = Schema> {
    prop::collection::vec(arb_table(), 1..5).prop_map(move |specs| build(dialect, &specs))
}

fn arb_dialect() -> impl Strategy<Value = DialectFamily> {
    prop_oneof![
        Just(DialectFamily::Sqlite),
        Just(DialectFamily::Postgres),
        Just(DialectFamily::Mysql),
    ]
}

proptest! {
    /// Diffing a schema against itself yields nothing
    #[test]
    fn prop_diff_is_idempotent(schema in arb_dialect().prop_flat_map(arb_schema)) {
        prop_assert!(schema.validate().is_ok());
        let diff = strata_core::diff(&schema, &schema).unwrap();
        prop_assert!(diff.is_empty());
    }

    /// Replaying a plan reaches the desired schema
    #[test]
    fn prop_plan_round_trips(
        current in arb_schema(DialectFamily::Postgres),
        desired in arb_schema(DialectFamily::Postgres),
    ) {
        let diff = strata_core::diff(&current, &desired).unwrap();
        let plan = strata_core::plan(&diff.changes, &DialectCapabilities::postgres()).unwrap();
        let applied = plan.apply_to(&current).unwrap();

        // New columns are appended, so only the column order may differ.
        let rest = strata_core::diff(&applied, &desired).unwrap();
        prop_assert!(rest.is_empty(), "left over: {:?}", rest.changes);
        if diff.warnings.is_empty() && plan.changes().all(|c| c.kind() != ChangeKind::AddColumn) {
            prop_assert!(applied.structurally_eq(&desired));
        }
    }

    /// Planning is a pure function of its input
    #[test]
    fn prop_plan_is_deterministic(
        current in arb_schema(DialectFamily::Postgres),
        desired in arb_schema(DialectFamily::Postgres),
    ) {
        let diff = strata_core::diff(&current, &desired).unwrap();
        let caps = DialectCapabilities::postgres();
        let first = strata_core::plan(&diff.changes, &caps).unwrap();
        let second = strata_core::plan(&diff.changes, &caps).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(strata_core::lint(&first), strata_core::lint(&second));
    }

    /// Every dropped table or column is reported as destructive
    #[test]
    fn prop_drops_are_destructive(
        current in arb_schema(DialectFamily::Postgres),
        desired in arb_schema(DialectFamily::Postgres),
    ) {
        let diff = strata_core::diff(&current, &desired).unwrap();
        let plan = strata_core::plan(&diff.changes, &DialectCapabilities::postgres()).unwrap();
        let report = strata_core::lint(&plan);
        for change in plan.changes() {
            if matches!(change.kind(), ChangeKind::DropTable | ChangeKind::DropColumn) {
                prop_assert!(report.for_change(change).any(|d| d.severity == Severity::Destructive));
            }
        }
    }
}
