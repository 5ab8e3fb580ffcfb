//! Migration planner.
//!
//! Turns a set of changes into an ordered sequence of execution groups for
//! one dialect:
//!
//! 1. nested table changes are flattened and duplicates rejected;
//! 2. each change is rewritten into steps the dialect supports;
//! 3. dependencies between changes become graph edges, foreign keys of
//!    tables inside a cycle are deferred to a final group;
//! 4. the graph is sorted with a deterministic tie-break and cut into
//!    groups.

mod graph;
mod group;
mod rewrite;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use rewrite::TEMP_COLUMN_SUFFIX;

use crate::capabilities::{Capability, DialectCapabilities};
use crate::change::Change;
use crate::error::{Result, StrataError};
use crate::lattice::TypeLattice;
use crate::schema::{DialectFamily, Schema};
use crate::state::SchemaState;
use graph::Graph;
use rewrite::{Context, Unit};

/// Default maximum number of changes per group.
pub const DEFAULT_MAX_GROUP_SIZE: usize = 64;

/// Options for the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerOptions {
    /// Maximum number of units per group. Changes to one object may exceed it.
    pub max_group_size: usize,
    /// Turn structurally identical Drop+Add pairs into renames.
    pub collapse_renames: bool,
    /// Build indexes on existing tables without blocking writes when the
    /// dialect can.
    pub concurrent_indexes: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerOptions {
    /// Creates default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            collapse_renames: false,
            concurrent_indexes: false,
        }
    }

    /// Sets the maximum group size; zero is treated as one.
    #[must_use]
    pub fn with_max_group_size(mut self, size: usize) -> Self {
        self.max_group_size = size.max(1);
        self
    }

    /// Enables rename collapsing.
    #[must_use]
    pub const fn with_collapse_renames(mut self) -> Self {
        self.collapse_renames = true;
        self
    }

    /// Enables concurrent index builds.
    #[must_use]
    pub const fn with_concurrent_indexes(mut self) -> Self {
        self.concurrent_indexes = true;
        self
    }
}

/// Estimated lock a group takes on the objects it touches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LockSeverity {
    /// Touches only objects created in the plan, or type objects.
    #[default]
    None,
    /// Blocks writes but not reads.
    Shared,
    /// Blocks reads and writes.
    Exclusive,
}

impl fmt::Display for LockSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        })
    }
}

/// A capability rewrite: the change that was asked for and how many steps
/// replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    /// The change as the differ produced it.
    pub original: Change,
    /// The missing capability that forced the rewrite.
    pub capability: Capability,
    /// Number of steps that carry out the original change.
    pub steps: usize,
}

/// A change placed in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    /// The change to execute.
    pub change: Change,
    /// Index into [`Plan::rewrites`] if this change is a rewrite step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<usize>,
}

/// Changes that run as one atomic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanGroup {
    /// Changes in execution order.
    pub changes: Vec<PlannedChange>,
    /// Whether the group runs inside a transaction.
    pub transactional: bool,
    /// Whether every change can be undone without data loss.
    pub reversible: bool,
    /// Strongest lock any change takes.
    pub lock: LockSeverity,
}

impl PlanGroup {
    /// Iterates the group's changes.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().map(|p| &p.change)
    }

    /// Number of changes in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the group has no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// An ordered, grouped migration plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Dialect family the plan targets.
    pub family: DialectFamily,
    /// Execution groups in order.
    pub groups: Vec<PlanGroup>,
    /// Capability rewrites referenced by [`PlannedChange::rewrite`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewrites: Vec<Rewrite>,
    /// Type rules of the target dialect, kept for the linter.
    #[serde(default)]
    pub type_lattice: TypeLattice,
}

impl Plan {
    /// Iterates all changes in execution order.
    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        self.groups.iter().flat_map(PlanGroup::iter)
    }

    /// Iterates all changes with their group index.
    pub fn planned(&self) -> impl Iterator<Item = (usize, &PlannedChange)> {
        self.groups
            .iter()
            .enumerate()
            .flat_map(|(g, group)| group.changes.iter().map(move |c| (g, c)))
    }

    /// Total number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(PlanGroup::len).sum()
    }

    /// Returns true if the plan has nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns true if every group is reversible.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.groups.iter().all(|g| g.reversible)
    }

    /// Index of the first group holding a change that matches.
    pub fn group_of(&self, matches: impl Fn(&Change) -> bool) -> Option<usize> {
        self.planned().find(|(_, p)| matches(&p.change)).map(|(g, _)| g)
    }

    /// Tables the plan creates.
    #[must_use]
    pub fn new_tables(&self) -> BTreeSet<&str> {
        self.changes()
            .filter_map(|c| match c {
                Change::AddTable { table } => Some(table.name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replays the plan against a schema.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidState`] at the first change whose
    /// precondition fails.
    pub fn apply_to(&self, schema: &Schema) -> Result<Schema> {
        let mut state = SchemaState::new(schema.clone());
        state.apply_all(self.changes())?;
        Ok(state.into_schema())
    }
}

/// Plans changes for one dialect.
#[derive(Debug, Clone)]
pub struct Planner {
    capabilities: DialectCapabilities,
    options: PlannerOptions,
}

impl Planner {
    /// Creates a planner with default options.
    #[must_use]
    pub const fn new(capabilities: DialectCapabilities) -> Self {
        Self {
            capabilities,
            options: PlannerOptions::new(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub const fn with_options(mut self, options: PlannerOptions) -> Self {
        self.options = options;
        self
    }

    /// The dialect capabilities this planner targets.
    #[must_use]
    pub const fn capabilities(&self) -> &DialectCapabilities {
        &self.capabilities
    }

    /// Orders and groups changes.
    ///
    /// # Errors
    ///
    /// - [`StrataError::InvalidSchema`] if two changes target the same
    ///   object with the same kind.
    /// - [`StrataError::UnsupportedChange`] if a change has no rewrite for
    ///   the dialect.
    /// - [`StrataError::CircularDependency`] if the changes cannot be ordered.
    pub fn plan(&self, changes: &[Change]) -> Result<Plan> {
        let caps = &self.capabilities;
        let mut changes: Vec<Change> = changes.iter().cloned().flat_map(Change::flatten).collect();
        reject_duplicates(&changes)?;

        if self.options.collapse_renames {
            changes = rewrite::collapse_renames(changes, caps);
        }

        let ctx = Context::from_changes(&changes);
        let units = changes
            .into_iter()
            .map(|c| rewrite::rewrite(c, caps, self.options.concurrent_indexes, &ctx))
            .collect::<Result<Vec<Unit>>>()?;
        let mut units = rewrite::fold_foreign_keys(units, caps, &ctx);
        graph::break_drop_cycles(&mut units);
        graph::defer_foreign_key_cycles(&mut units);
        units.sort_by_cached_key(|u| (u.primary.kind().priority(), u.primary.target().to_string()));

        let graph = Graph::build(&units, &ctx);
        let main: Vec<usize> = (0..units.len()).filter(|&u| !units[u].deferred).collect();
        let order = graph.order(&units, &main)?;

        let mut drafts = group::assign(&units, &order, &graph, self.options.max_group_size);
        let deferred: Vec<usize> = (0..units.len()).filter(|&u| units[u].deferred).collect();
        if !deferred.is_empty() {
            drafts.push(group::Draft {
                units: deferred,
                standalone: false,
            });
        }

        let plan = self.materialize(&units, drafts, &ctx);
        info!(
            groups = plan.groups.len(),
            changes = plan.len(),
            rewrites = plan.rewrites.len(),
            "Migration plan computed"
        );
        Ok(plan)
    }

    fn materialize(&self, units: &[Unit], drafts: Vec<group::Draft>, ctx: &Context) -> Plan {
        let caps = &self.capabilities;
        let mut rewrites = Vec::new();
        let mut groups = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let mut planned = Vec::new();
            let mut reversible = true;
            let mut lock = LockSeverity::None;
            for &u in &draft.units {
                let unit = &units[u];
                let rewrite = unit.rewrite.map(|capability| {
                    rewrites.push(Rewrite {
                        original: unit.primary.clone(),
                        capability,
                        steps: unit.steps.len(),
                    });
                    rewrites.len() - 1
                });
                reversible &= unit.primary.is_reversible_with(&caps.type_lattice)
                    && unit.steps.iter().all(|s| s.is_reversible_with(&caps.type_lattice));
                for step in &unit.steps {
                    lock = lock.max(lock_for(step, ctx));
                    planned.push(PlannedChange {
                        change: step.clone(),
                        rewrite,
                    });
                }
            }
            groups.push(PlanGroup {
                changes: planned,
                transactional: caps.supports_transactional_ddl && !draft.standalone,
                reversible,
                lock,
            });
        }

        Plan {
            family: caps.family,
            groups,
            rewrites,
            type_lattice: caps.type_lattice.clone(),
        }
    }
}

fn reject_duplicates(changes: &[Change]) -> Result<()> {
    let mut seen = BTreeSet::new();
    let mut errors = Vec::new();
    for change in changes {
        if !seen.insert((change.kind(), change.target())) {
            errors.push(format!("duplicate change: {change}"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StrataError::InvalidSchema(errors))
    }
}

fn lock_for(change: &Change, ctx: &Context) -> LockSeverity {
    if change.table().is_some_and(|t| ctx.new_tables.contains(t)) {
        return LockSeverity::None;
    }
    match change {
        Change::AddEnum { .. }
        | Change::ModifyEnum { .. }
        | Change::DropEnum { .. }
        | Change::AddSequence { .. }
        | Change::ModifySequence { .. }
        | Change::DropSequence { .. }
        | Change::AddIndex {
            concurrently: true, ..
        } => LockSeverity::None,
        Change::AddIndex { .. } | Change::AddForeignKey { .. } => LockSeverity::Shared,
        _ => LockSeverity::Exclusive,
    }
}
