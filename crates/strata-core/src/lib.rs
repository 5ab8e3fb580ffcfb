//! Declarative schema diffing and migration planning.
//!
//! `strata-core` compares two snapshots of a relational schema and turns the
//! difference into a safe, ordered migration plan:
//!
//! - **Differ** - matches tables, columns, indexes and constraints by name
//!   and emits typed [`Change`]s, with optional rename detection
//! - **Planner** - orders changes by their dependencies, rewrites what the
//!   target dialect cannot do natively and groups the result into
//!   transactions
//! - **Linter** - flags destructive and locking changes
//! - **History verifier** - detects drift in applied migration records
//!
//! Everything here is pure and synchronous. Loading snapshots, reading the
//! history store and executing plans belong to the caller.
//!
//! # Example
//!
//! ```rust
//! use strata_core::prelude::*;
//!
//! let current = Schema::new("app", DialectFamily::Postgres).table(
//!     Table::new("users")
//!         .column(Column::new("id", "bigint"))
//!         .primary_key(["id"]),
//! );
//! let desired = Schema::new("app", DialectFamily::Postgres).table(
//!     Table::new("users")
//!         .column(Column::new("id", "bigint"))
//!         .column(Column::new("email", "text").not_null())
//!         .primary_key(["id"]),
//! );
//!
//! let diff = strata_core::diff(&current, &desired)?;
//! let plan = strata_core::plan(&diff.changes, &DialectCapabilities::postgres())?;
//! let report = strata_core::lint(&plan);
//!
//! assert_eq!(plan.groups.len(), 1);
//! assert!(!report.has_destructive());
//! assert!(plan.apply_to(&current)?.structurally_eq(&desired));
//! # Ok::<(), strata_core::StrataError>(())
//! ```

pub mod capabilities;
pub mod change;
pub mod diff;
pub mod error;
pub mod expr;
pub mod history;
pub mod lattice;
pub mod lint;
pub mod plan;
pub mod schema;
pub mod state;
pub mod types;

pub use error::{Result, StrataError, UnsupportedChange};

use capabilities::DialectCapabilities;
use change::Change;
use diff::{Differ, SchemaDiff};
use history::{HistoryVerifier, MigrationRecord, VerifyReport};
use lint::{LintReport, Linter};
use plan::{Plan, Planner};
use schema::Schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::capabilities::{Capability, DialectCapabilities};
    pub use crate::change::{Change, ChangeKind, ColumnDelta, ObjectRef};
    pub use crate::diff::{
        AmbiguousRename, DiffOptions, DiffWarning, Differ, RenameHints, RenameScorer, SchemaDiff,
        ShapeScorer,
    };
    pub use crate::error::{Result, StrataError, UnsupportedChange};
    pub use crate::history::{
        content_hash, HistorySum, HistoryVerifier, MigrationRecord, VerifyOptions, VerifyReport,
    };
    pub use crate::lattice::{Conversion, TypeLattice, TypeRule};
    pub use crate::lint::{LintDiagnostic, LintReport, Linter, ReasonCode, Severity};
    pub use crate::plan::{
        LockSeverity, Plan, PlanGroup, PlannedChange, Planner, PlannerOptions, Rewrite,
    };
    pub use crate::schema::{
        CheckConstraint, Column, DialectFamily, EnumType, ForeignKey, Generated, Index,
        IndexPart, PrimaryKey, ReferentialAction, Schema, Sequence, Table, TableOptions,
        UniqueConstraint,
    };
    pub use crate::state::SchemaState;
    pub use crate::types::{ColumnType, LogicalType};
}

/// Diffs two snapshots with default options.
///
/// # Errors
///
/// See [`Differ::diff`].
pub fn diff(current: &Schema, desired: &Schema) -> Result<SchemaDiff> {
    Differ::new().diff(current, desired)
}

/// Plans changes for a dialect with default options.
///
/// # Errors
///
/// See [`Planner::plan`].
pub fn plan(changes: &[Change], capabilities: &DialectCapabilities) -> Result<Plan> {
    Planner::new(capabilities.clone()).plan(changes)
}

/// Lints a plan.
#[must_use]
pub fn lint(plan: &Plan) -> LintReport {
    Linter::new().lint(plan)
}

/// Verifies migration records without requiring contiguous versions.
///
/// # Errors
///
/// See [`HistoryVerifier::verify`].
pub fn verify(records: &[MigrationRecord]) -> Result<VerifyReport> {
    HistoryVerifier::new().verify(records)
}
