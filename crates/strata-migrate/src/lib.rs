//! Command-line surface for strata.
//!
//! `strata-migrate` wires the pure planning core to the outside world:
//!
//! - **Load** - schema snapshots, capability descriptors and migration
//!   records from JSON files
//! - **History** - applied migrations read from a SQLite `strata_revisions`
//!   table
//! - **Report** - plain-text and JSON rendering of diffs, plans and lint
//!
//! # CLI Usage
//!
//! ```bash
//! # Show what changed between two snapshots
//! strata diff current.json desired.json
//!
//! # Plan the migration for PostgreSQL and show findings
//! strata plan current.json desired.json --dialect postgres
//!
//! # Fail when the plan would destroy data
//! strata lint current.json desired.json --deny-destructive
//!
//! # Check applied migrations for drift
//! strata verify --database sqlite:app.db --contiguous
//! ```

pub mod error;
pub mod history;
pub mod load;
pub mod report;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{MigrateError, Result};
    pub use crate::history::{HistoryStore, CREATE_REVISIONS_TABLE_SQL};
    pub use crate::load::{load_capabilities, load_records, load_schema, resolve_capabilities};
    pub use crate::report::{render_diff, render_hashes, render_lint, render_plan, PlanOutput};
}
