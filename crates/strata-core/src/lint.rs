//! Plan linter.
//!
//! Classifies every change of a [`Plan`] by the risk it carries for existing
//! data and running clients. Diagnostics are advisory: whether a destructive
//! finding blocks execution is the caller's decision.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::Change;
use crate::lattice::{Conversion, TypeLattice};
use crate::plan::Plan;

/// How risky a change is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Purely additive; safe.
    Notice,
    /// May lock tables or fail on existing rows.
    Warning,
    /// Loses data or integrity guarantees.
    Destructive,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Destructive => "destructive",
        })
    }
}

/// Machine-readable reason for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    DropTable,
    DropColumn,
    DropForeignKey,
    DropCheck,
    DropUnique,
    DropIndex,
    DropEnum,
    DropSequence,
    NarrowingType,
    IncompatibleType,
    NotNullWithoutDefault,
    NotNullWithDefault,
    IndexRebuild,
    BlockingIndexBuild,
    UniqueOnExisting,
    ConstraintOnExisting,
    EnumValueRemoved,
    RenameBreaksClients,
    Additive,
}

impl ReasonCode {
    /// The code as serialized, e.g. `DROP_TABLE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DropTable => "DROP_TABLE",
            Self::DropColumn => "DROP_COLUMN",
            Self::DropForeignKey => "DROP_FOREIGN_KEY",
            Self::DropCheck => "DROP_CHECK",
            Self::DropUnique => "DROP_UNIQUE",
            Self::DropIndex => "DROP_INDEX",
            Self::DropEnum => "DROP_ENUM",
            Self::DropSequence => "DROP_SEQUENCE",
            Self::NarrowingType => "NARROWING_TYPE",
            Self::IncompatibleType => "INCOMPATIBLE_TYPE",
            Self::NotNullWithoutDefault => "NOT_NULL_WITHOUT_DEFAULT",
            Self::NotNullWithDefault => "NOT_NULL_WITH_DEFAULT",
            Self::IndexRebuild => "INDEX_REBUILD",
            Self::BlockingIndexBuild => "BLOCKING_INDEX_BUILD",
            Self::UniqueOnExisting => "UNIQUE_ON_EXISTING",
            Self::ConstraintOnExisting => "CONSTRAINT_ON_EXISTING",
            Self::EnumValueRemoved => "ENUM_VALUE_REMOVED",
            Self::RenameBreaksClients => "RENAME_BREAKS_CLIENTS",
            Self::Additive => "ADDITIVE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding about one change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintDiagnostic {
    /// How risky the change is.
    pub severity: Severity,
    /// Why.
    pub reason: ReasonCode,
    /// Human-readable explanation.
    pub message: String,
    /// The offending change. For a rewrite this is the change that was asked
    /// for, or the step that destroys data.
    pub change: Change,
    /// Index of the group holding the change.
    pub group: usize,
    /// Position of the change in plan order.
    pub position: usize,
}

impl fmt::Display for LintDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.reason, self.message)
    }
}

/// All diagnostics of a plan, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintReport {
    /// Diagnostics ordered by change position.
    pub diagnostics: Vec<LintDiagnostic>,
}

impl LintReport {
    /// Returns true if any diagnostic is destructive.
    #[must_use]
    pub fn has_destructive(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Destructive)
    }

    /// Number of diagnostics with the given severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// The highest severity found, if any.
    #[must_use]
    pub fn max_severity(&self) -> Option<Severity> {
        self.diagnostics.iter().map(|d| d.severity).max()
    }

    /// Diagnostics about the given change.
    pub fn for_change<'a>(&'a self, change: &'a Change) -> impl Iterator<Item = &'a LintDiagnostic> {
        self.diagnostics.iter().filter(move |d| d.change == *change)
    }

    /// Iterates diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &LintDiagnostic> {
        self.diagnostics.iter()
    }

    /// Number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns true if there are no diagnostics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Classifies the changes of a plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linter;

impl Linter {
    /// Creates a linter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Lints every change of the plan.
    ///
    /// Every change receives at least one diagnostic. A rewritten change is
    /// linted once, through the change that was asked for. A rewrite step
    /// that destroys data on its own, such as the column drop of a rebuild,
    /// is reported against that step, and the original change then loses
    /// its "safe" notice.
    #[must_use]
    pub fn lint(&self, plan: &Plan) -> LintReport {
        let new_tables = plan.new_tables();
        let ctx = Ctx {
            lattice: &plan.type_lattice,
            new_tables: &new_tables,
        };

        let lossy: BTreeSet<usize> = plan
            .planned()
            .filter_map(|(_, p)| p.rewrite.filter(|_| ctx.destroys(&p.change)))
            .collect();

        let mut seen_rewrites = BTreeSet::new();
        let mut diagnostics = Vec::new();
        for (position, (group, planned)) in plan.planned().enumerate() {
            let at = Site { group, position };
            let rewrite = planned
                .rewrite
                .and_then(|r| plan.rewrites.get(r).map(|w| (r, w)));
            let Some((r, rewrite)) = rewrite else {
                at.record(&mut diagnostics, ctx.classify(&planned.change), &planned.change, "");
                continue;
            };

            let note = format!(" (rewritten: dialect lacks {})", rewrite.capability);
            if seen_rewrites.insert(r) {
                let mut found = ctx.classify(&rewrite.original);
                if lossy.contains(&r) {
                    found.retain(|(severity, ..)| *severity != Severity::Notice);
                }
                at.record(&mut diagnostics, found, &rewrite.original, &note);
            }
            let destroyed: Vec<Finding> = ctx
                .classify(&planned.change)
                .into_iter()
                .filter(|(severity, ..)| *severity == Severity::Destructive)
                .collect();
            at.record(&mut diagnostics, destroyed, &planned.change, &note);
        }

        let report = LintReport { diagnostics };
        debug!(
            destructive = report.count(Severity::Destructive),
            warnings = report.count(Severity::Warning),
            notices = report.count(Severity::Notice),
            lossy_rewrites = lossy.len(),
            "Plan linted"
        );
        report
    }
}

/// Where a change sits in the plan.
#[derive(Clone, Copy)]
struct Site {
    group: usize,
    position: usize,
}

impl Site {
    fn record(self, out: &mut Vec<LintDiagnostic>, found: Vec<Finding>, change: &Change, note: &str) {
        out.extend(found.into_iter().map(|(severity, reason, message)| LintDiagnostic {
            severity,
            reason,
            message: format!("{message}{note}"),
            change: change.clone(),
            group: self.group,
            position: self.position,
        }));
    }
}

type Finding = (Severity, ReasonCode, String);

struct Ctx<'a> {
    lattice: &'a TypeLattice,
    new_tables: &'a BTreeSet<&'a str>,
}

fn destructive(reason: ReasonCode, message: String) -> Finding {
    (Severity::Destructive, reason, message)
}

fn warning(reason: ReasonCode, message: String) -> Finding {
    (Severity::Warning, reason, message)
}

impl Ctx<'_> {
    fn is_new(&self, table: &str) -> bool {
        self.new_tables.contains(table)
    }

    fn destroys(&self, change: &Change) -> bool {
        self.classify(change)
            .iter()
            .any(|(severity, ..)| *severity == Severity::Destructive)
    }

    #[allow(clippy::too_many_lines)]
    fn classify(&self, change: &Change) -> Vec<Finding> {
        use ReasonCode as R;

        let mut found = Vec::new();
        match change {
            Change::DropTable { table } => found.push(destructive(
                R::DropTable,
                format!("Dropping table '{}' deletes all of its rows", table.name),
            )),
            Change::DropColumn { table, column } => found.push(destructive(
                R::DropColumn,
                format!("Dropping column '{table}.{}' deletes its data", column.name),
            )),
            Change::DropForeignKey { table, foreign_key } => found.push(destructive(
                R::DropForeignKey,
                format!(
                    "Dropping foreign key '{}' on '{table}' stops enforcing references to '{}'",
                    foreign_key.name, foreign_key.ref_table
                ),
            )),
            Change::DropCheck { table, check } => found.push(destructive(
                R::DropCheck,
                format!("Dropping check '{}' on '{table}' lets invalid rows in", check.name),
            )),
            Change::DropUnique { table, unique } => found.push(destructive(
                R::DropUnique,
                format!(
                    "Dropping unique constraint '{}' on '{table}' allows duplicate rows",
                    unique.name
                ),
            )),
            Change::DropEnum { enum_type } => found.push(destructive(
                R::DropEnum,
                format!("Dropping enum '{}'", enum_type.name),
            )),
            Change::DropSequence { sequence } => found.push(destructive(
                R::DropSequence,
                format!("Dropping sequence '{}' loses its current value", sequence.name),
            )),
            Change::DropIndex { table, index } => found.push(warning(
                R::DropIndex,
                format!(
                    "Dropping index '{}' on '{table}' may slow queries that use it",
                    index.name
                ),
            )),

            Change::ModifyColumn { table, from, to, .. } => {
                match self.lattice.classify(from.logical_type(), to.logical_type()) {
                    Conversion::Narrowing => found.push(destructive(
                        R::NarrowingType,
                        format!(
                            "Changing '{table}.{}' from {} to {} may truncate values",
                            to.name, from.column_type, to.column_type
                        ),
                    )),
                    Conversion::Incompatible => found.push(destructive(
                        R::IncompatibleType,
                        format!(
                            "Changing '{table}.{}' from {} to {} cannot convert existing values",
                            to.name, from.column_type, to.column_type
                        ),
                    )),
                    Conversion::Identical | Conversion::Widening => {}
                }
                if from.nullable && !to.nullable {
                    if to.default.is_none() {
                        found.push(destructive(
                            R::NotNullWithoutDefault,
                            format!(
                                "Making '{table}.{}' NOT NULL without a default fails on NULL rows",
                                to.name
                            ),
                        ));
                    } else {
                        found.push(warning(
                            R::NotNullWithDefault,
                            format!(
                                "Making '{table}.{}' NOT NULL relies on the default for existing rows",
                                to.name
                            ),
                        ));
                    }
                }
            }

            Change::AddColumn { table, column } if !column.nullable && !self.is_new(table) => {
                if column.default.is_none() && column.generated.is_none() {
                    found.push(warning(
                        R::NotNullWithoutDefault,
                        format!(
                            "Adding NOT NULL column '{table}.{}' without a default fails if the table has rows",
                            column.name
                        ),
                    ));
                } else {
                    found.push(warning(
                        R::NotNullWithDefault,
                        format!(
                            "Adding NOT NULL column '{table}.{}' backfills existing rows with the default",
                            column.name
                        ),
                    ));
                }
            }

            Change::AddIndex {
                table,
                index,
                concurrently,
            } if !self.is_new(table) => {
                if !*concurrently {
                    found.push(warning(
                        R::BlockingIndexBuild,
                        format!("Building index '{}' blocks writes to '{table}'", index.name),
                    ));
                }
                if index.unique {
                    found.push(warning(
                        R::UniqueOnExisting,
                        format!(
                            "Unique index '{}' fails if '{table}' already holds duplicates",
                            index.name
                        ),
                    ));
                }
            }
            Change::ModifyIndex { table, to, .. } => found.push(warning(
                R::IndexRebuild,
                format!("Rebuilding index '{}' may lock '{table}'", to.name),
            )),

            Change::AddUnique { table, unique } if !self.is_new(table) => found.push(warning(
                R::UniqueOnExisting,
                format!(
                    "Unique constraint '{}' fails if '{table}' already holds duplicates",
                    unique.name
                ),
            )),
            Change::AddForeignKey { table, foreign_key } if !self.is_new(table) => {
                found.push(warning(
                    R::ConstraintOnExisting,
                    format!(
                        "Foreign key '{}' validates every existing row of '{table}'",
                        foreign_key.name
                    ),
                ));
            }
            Change::AddCheck { table, check } if !self.is_new(table) => found.push(warning(
                R::ConstraintOnExisting,
                format!("Check '{}' validates every existing row of '{table}'", check.name),
            )),
            Change::ModifyPrimaryKey { table, .. } => found.push(warning(
                R::ConstraintOnExisting,
                format!("Replacing the primary key of '{table}' rebuilds its index"),
            )),

            Change::RenameTable { from, to } => found.push(warning(
                R::RenameBreaksClients,
                format!("Renaming table '{from}' to '{to}' breaks clients using the old name"),
            )),
            Change::RenameColumn { table, from, to } => found.push(warning(
                R::RenameBreaksClients,
                format!(
                    "Renaming column '{table}.{from}' to '{to}' breaks clients using the old name"
                ),
            )),

            Change::ModifyEnum { from, to } => {
                let removed: Vec<&str> = from
                    .values
                    .iter()
                    .filter(|v| !to.values.contains(v))
                    .map(String::as_str)
                    .collect();
                if !removed.is_empty() {
                    found.push(destructive(
                        R::EnumValueRemoved,
                        format!(
                            "Removing value(s) {} from enum '{}' invalidates rows that use them",
                            removed.join(", "),
                            to.name
                        ),
                    ));
                }
            }

            Change::ModifyTable { changes, .. } => {
                for sub in changes {
                    found.extend(self.classify(sub));
                }
            }

            Change::AddTable { .. }
            | Change::AddColumn { .. }
            | Change::AddIndex { .. }
            | Change::AddUnique { .. }
            | Change::AddForeignKey { .. }
            | Change::AddCheck { .. }
            | Change::AddEnum { .. }
            | Change::AddSequence { .. }
            | Change::ModifySequence { .. }
            | Change::AlterTableOptions { .. } => {}
        }

        if found.is_empty() {
            found.push((
                Severity::Notice,
                ReasonCode::Additive,
                format!("{change} is safe"),
            ));
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Capability, DialectCapabilities};
    use crate::plan::Planner;
    use crate::schema::{Column, EnumType, ForeignKey, Index, Table};

    fn lint(changes: &[Change], caps: DialectCapabilities) -> LintReport {
        let plan = Planner::new(caps).plan(changes).unwrap();
        Linter::new().lint(&plan)
    }

    fn reasons(report: &LintReport) -> Vec<(Severity, ReasonCode)> {
        report.iter().map(|d| (d.severity, d.reason)).collect()
    }

    #[test]
    fn test_add_not_null_without_default_is_warning() {
        let report = lint(
            &[Change::add_column("users", Column::new("email", "text").not_null())],
            DialectCapabilities::postgres(),
        );
        assert_eq!(
            reasons(&report),
            vec![(Severity::Warning, ReasonCode::NotNullWithoutDefault)]
        );
        assert!(!report.has_destructive());
    }

    #[test]
    fn test_drops_are_destructive() {
        let report = lint(
            &[
                Change::drop_column("users", Column::new("name", "text")),
                Change::drop_table(Table::new("sessions").column(Column::new("id", "int"))),
            ],
            DialectCapabilities::postgres(),
        );
        assert_eq!(report.count(Severity::Destructive), 2);
        assert_eq!(report.max_severity(), Some(Severity::Destructive));
    }

    #[test]
    fn test_narrowing_type() {
        let report = lint(
            &[Change::modify_column(
                "users",
                Column::new("age", "bigint"),
                Column::new("age", "smallint"),
            )],
            DialectCapabilities::postgres(),
        );
        assert_eq!(
            reasons(&report),
            vec![(Severity::Destructive, ReasonCode::NarrowingType)]
        );
    }

    #[test]
    fn test_widening_type_is_notice() {
        let report = lint(
            &[Change::modify_column(
                "users",
                Column::new("age", "int"),
                Column::new("age", "bigint"),
            )],
            DialectCapabilities::postgres(),
        );
        assert_eq!(reasons(&report), vec![(Severity::Notice, ReasonCode::Additive)]);
    }

    #[test]
    fn test_set_not_null() {
        let report = lint(
            &[Change::modify_column(
                "users",
                Column::new("email", "text"),
                Column::new("email", "text").not_null(),
            )],
            DialectCapabilities::postgres(),
        );
        assert_eq!(
            reasons(&report),
            vec![(Severity::Destructive, ReasonCode::NotNullWithoutDefault)]
        );
    }

    #[test]
    fn test_index_on_existing_table() {
        let report = lint(
            &[Change::add_index("users", Index::new("idx_email", ["email"]).unique())],
            DialectCapabilities::postgres(),
        );
        assert_eq!(
            reasons(&report),
            vec![
                (Severity::Warning, ReasonCode::BlockingIndexBuild),
                (Severity::Warning, ReasonCode::UniqueOnExisting),
            ]
        );
    }

    #[test]
    fn test_new_table_is_additive() {
        let report = lint(
            &[
                Change::add_table(Table::new("tags").column(Column::new("id", "int"))),
                Change::add_index("tags", Index::new("idx_tags", ["id"])),
            ],
            DialectCapabilities::postgres(),
        );
        assert_eq!(report.count(Severity::Notice), 2);
        assert_eq!(report.max_severity(), Some(Severity::Notice));
    }

    #[test]
    fn test_rebuild_reports_the_dropped_column() {
        let report = lint(
            &[Change::modify_column(
                "users",
                Column::new("age", "int"),
                Column::new("age", "text"),
            )],
            DialectCapabilities::sqlite(),
        );
        assert_eq!(
            reasons(&report),
            vec![(Severity::Destructive, ReasonCode::DropColumn)]
        );
        let d = &report.diagnostics[0];
        assert!(matches!(&d.change, Change::DropColumn { column, .. } if column.name == "age"));
        assert!(d.message.contains("rewritten"));
        assert_eq!(d.position, 1);
    }

    #[test]
    fn test_split_add_column_linted_once() {
        let caps = DialectCapabilities::postgres().with(Capability::AddColumnWithDefault, false);
        let column = Column::new("status", "text").not_null().default("'new'");
        let report = lint(&[Change::add_column("orders", column)], caps);
        assert_eq!(
            reasons(&report),
            vec![(Severity::Warning, ReasonCode::NotNullWithDefault)]
        );
        assert!(matches!(report.diagnostics[0].change, Change::AddColumn { .. }));
        assert!(report.diagnostics[0].message.contains("rewritten"));
    }

    #[test]
    fn test_enum_value_removed() {
        let report = lint(
            &[Change::ModifyEnum {
                from: EnumType::new("mood", ["happy", "sad"]),
                to: EnumType::new("mood", ["happy"]),
            }],
            DialectCapabilities::postgres(),
        );
        assert_eq!(
            reasons(&report),
            vec![(Severity::Destructive, ReasonCode::EnumValueRemoved)]
        );
    }

    #[test]
    fn test_drop_foreign_key_and_rename() {
        let report = lint(
            &[
                Change::drop_foreign_key("posts", ForeignKey::new("fk", ["uid"], "users", ["id"])),
                Change::rename_column("users", "name", "full_name"),
            ],
            DialectCapabilities::postgres(),
        );
        assert_eq!(
            reasons(&report),
            vec![
                (Severity::Destructive, ReasonCode::DropForeignKey),
                (Severity::Warning, ReasonCode::RenameBreaksClients),
            ]
        );
    }

    #[test]
    fn test_reason_code_serialization() {
        let json = serde_json::to_string(&ReasonCode::NotNullWithoutDefault).unwrap();
        assert_eq!(json, "\"NOT_NULL_WITHOUT_DEFAULT\"");
        assert_eq!(ReasonCode::DropTable.to_string(), "DROP_TABLE");
    }
}
