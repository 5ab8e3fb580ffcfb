//! Capability rewrites.
//!
//! Each input change becomes a [`Unit`]: the change itself, or a sequence of
//! steps the dialect supports natively that has the same effect. Steps of a
//! unit are ordered and always land in the same execution group.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::graph;
use crate::capabilities::{Capability, DialectCapabilities};
use crate::change::{Change, ColumnDelta};
use crate::error::{Result, UnsupportedChange};
use crate::schema::{Column, ForeignKey, Table};

/// Suffix of the temporary column a rebuild adds.
pub const TEMP_COLUMN_SUFFIX: &str = "__strata_tmp";

/// Facts about the whole change set a single rewrite needs.
#[derive(Debug, Default)]
pub(crate) struct Context {
    /// Tables created by the plan.
    pub new_tables: BTreeSet<String>,
    /// Tables dropped by the plan.
    pub dropped_tables: BTreeSet<String>,
    /// Indexes dropped or rebuilt by their own change, as (table, index).
    pub replaced_indexes: BTreeSet<(String, String)>,
    /// Sequences mentioned by any change.
    pub sequences: BTreeSet<String>,
    /// Foreign-key cycle component of each new table that sits in one.
    pub fk_cycles: BTreeMap<String, usize>,
}

impl Context {
    pub fn from_changes(changes: &[Change]) -> Self {
        let mut ctx = Self::default();
        let mut references: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut refer = |table: &str, fk: &ForeignKey| {
            if fk.ref_table != table {
                references
                    .entry(table.to_string())
                    .or_default()
                    .insert(fk.ref_table.clone());
            }
        };
        for change in changes {
            match change {
                Change::AddTable { table } => {
                    ctx.new_tables.insert(table.name.clone());
                    for fk in &table.foreign_keys {
                        refer(table.name.as_str(), fk);
                    }
                }
                Change::AddForeignKey { table, foreign_key } => refer(table.as_str(), foreign_key),
                Change::DropTable { table } => {
                    ctx.dropped_tables.insert(table.name.clone());
                }
                Change::DropIndex { table, index } => {
                    ctx.replaced_indexes.insert((table.clone(), index.name.clone()));
                }
                Change::AddSequence { sequence } | Change::DropSequence { sequence } => {
                    ctx.sequences.insert(sequence.name.clone());
                }
                Change::ModifySequence { to, .. } => {
                    ctx.sequences.insert(to.name.clone());
                }
                _ => {}
            }
        }
        references.retain(|t, _| ctx.new_tables.contains(t));
        ctx.fk_cycles = graph::component_of(&graph::cycles(&references));
        ctx
    }

    fn is_new(&self, table: &str) -> bool {
        self.new_tables.contains(table)
    }

    /// Whether a foreign key from `table` to `ref_table` closes a cycle of
    /// new tables.
    pub fn in_same_cycle(&self, table: &str, ref_table: &str) -> bool {
        table == ref_table
            || self
                .fk_cycles
                .get(table)
                .is_some_and(|c| self.fk_cycles.get(ref_table) == Some(c))
    }
}

/// One input change and the steps that carry it out.
#[derive(Debug, Clone)]
pub(crate) struct Unit {
    /// The change as the differ produced it.
    pub primary: Change,
    /// Steps to execute, in order.
    pub steps: Vec<Change>,
    /// Capability whose absence forced a rewrite.
    pub rewrite: Option<Capability>,
    /// Whether the unit was moved to the deferred foreign-key group.
    pub deferred: bool,
    /// Whether the unit must run outside a transaction.
    pub standalone: bool,
    /// Synthesized by the planner rather than requested.
    pub synthesized: bool,
}

impl Unit {
    pub fn native(change: Change) -> Self {
        Self {
            steps: vec![change.clone()],
            primary: change,
            rewrite: None,
            deferred: false,
            standalone: false,
            synthesized: false,
        }
    }

    fn rewritten(primary: Change, steps: Vec<Change>, capability: Capability) -> Self {
        debug!(
            change = %primary,
            capability = %capability,
            steps = steps.len(),
            "Rewrote change"
        );
        Self {
            primary,
            steps,
            rewrite: Some(capability),
            deferred: false,
            standalone: false,
            synthesized: false,
        }
    }
}

/// Replaces Drop+Add pairs of identical shape with renames when each side
/// has exactly one candidate and the dialect can rename.
pub(crate) fn collapse_renames(changes: Vec<Change>, caps: &DialectCapabilities) -> Vec<Change> {
    let mut changes = changes;
    let mut replaced = BTreeMap::new();

    if caps.supports_column_rename {
        let dropped: Vec<(usize, &str, &Column)> = changes
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                Change::DropColumn { table, column } => Some((i, table.as_str(), column)),
                _ => None,
            })
            .collect();
        let added: Vec<(usize, &str, &Column)> = changes
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                Change::AddColumn { table, column } => Some((i, table.as_str(), column)),
                _ => None,
            })
            .collect();

        for &(d, table, from) in &dropped {
            let candidates: Vec<_> = added
                .iter()
                .filter(|(_, t, to)| *t == table && from.same_shape(to))
                .collect();
            let [&(a, _, to)] = candidates[..] else { continue };
            let rivals = dropped
                .iter()
                .filter(|(_, t, other)| *t == table && other.same_shape(to))
                .count();
            if rivals == 1 {
                debug!(table = %table, from = %from.name, to = %to.name, "Collapsed drop and add into column rename");
                replaced.insert(a, Some(Change::rename_column(table, from.name.as_str(), to.name.as_str())));
                replaced.insert(d, None);
            }
        }
    }

    if caps.supports_table_rename {
        let linked: BTreeSet<&str> = changes
            .iter()
            .filter_map(|c| match c {
                Change::AddIndex { table, .. } | Change::AddForeignKey { table, .. } => {
                    Some(table.as_str())
                }
                _ => None,
            })
            .collect();
        let dropped: Vec<(usize, &Table)> = changes
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                Change::DropTable { table } if table.indexes.is_empty() && table.foreign_keys.is_empty() => {
                    Some((i, table))
                }
                _ => None,
            })
            .collect();
        let added: Vec<(usize, &Table)> = changes
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                Change::AddTable { table } if !linked.contains(table.name.as_str()) => Some((i, table)),
                _ => None,
            })
            .collect();

        let same = |old: &Table, new: &Table| {
            let mut renamed = old.clone();
            renamed.name.clone_from(&new.name);
            renamed == *new
        };
        for &(d, old) in &dropped {
            let candidates: Vec<_> = added.iter().filter(|(_, new)| same(old, new)).collect();
            let [&(a, new)] = candidates[..] else { continue };
            if dropped.iter().filter(|(_, other)| same(other, new)).count() == 1 {
                debug!(from = %old.name, to = %new.name, "Collapsed drop and add into table rename");
                replaced.insert(a, Some(Change::rename_table(old.name.as_str(), new.name.as_str())));
                replaced.insert(d, None);
            }
        }
    }

    if replaced.is_empty() {
        return changes;
    }
    changes = changes
        .into_iter()
        .enumerate()
        .filter_map(|(i, c)| match replaced.remove(&i) {
            Some(replacement) => replacement,
            None => Some(c),
        })
        .collect();
    changes
}

fn missing(change: &Change, capability: Capability) -> UnsupportedChange {
    UnsupportedChange::MissingCapability {
        change: change.description(),
        capability,
    }
}

/// Turns one change into a unit the dialect can execute.
pub(crate) fn rewrite(
    change: Change,
    caps: &DialectCapabilities,
    concurrent_indexes: bool,
    ctx: &Context,
) -> Result<Unit> {
    match &change {
        Change::RenameTable { .. } => {
            caps.require(Capability::TableRename, || change.description())?;
        }
        Change::RenameColumn { .. } => {
            caps.require(Capability::ColumnRename, || change.description())?;
        }
        Change::AddEnum { .. } | Change::DropEnum { .. } | Change::ModifyEnum { .. } => {
            caps.require(Capability::Enums, || change.description())?;
        }
        Change::AddSequence { .. } | Change::DropSequence { .. } | Change::ModifySequence { .. } => {
            caps.require(Capability::Sequences, || change.description())?;
        }
        Change::AddForeignKey { table, .. }
        | Change::AddCheck { table, .. }
        | Change::AddUnique { table, .. }
            if !ctx.is_new(table) =>
        {
            caps.require(Capability::AlterConstraints, || change.description())?;
        }
        Change::DropForeignKey { .. }
        | Change::DropCheck { .. }
        | Change::DropUnique { .. }
        | Change::ModifyPrimaryKey { .. } => {
            caps.require(Capability::AlterConstraints, || change.description())?;
        }
        Change::AddIndex {
            table,
            index,
            concurrently,
        } => {
            let concurrent = *concurrently
                || (concurrent_indexes
                    && caps.supports_concurrent_index_build
                    && !ctx.is_new(table));
            if concurrent {
                caps.require(Capability::ConcurrentIndexBuild, || change.description())?;
                let mut unit = Unit::native(Change::AddIndex {
                    table: table.clone(),
                    index: index.clone(),
                    concurrently: true,
                });
                unit.primary = change;
                unit.standalone = true;
                return Ok(unit);
            }
        }
        Change::AddColumn { table, column }
            if column.default.is_some()
                && !ctx.is_new(table)
                && !caps.supports_add_column_with_default =>
        {
            return split_add_column(change.clone(), table, column, caps);
        }
        Change::ModifyColumn { .. } => return rewrite_modify_column(change, caps, ctx),
        Change::ModifyTable { .. } => {
            return Err(crate::error::StrataError::InvalidState(
                "nested table changes must be flattened before planning".to_string(),
            ));
        }
        _ => {}
    }
    Ok(Unit::native(change))
}

fn split_add_column(
    change: Change,
    table: &str,
    column: &Column,
    caps: &DialectCapabilities,
) -> Result<Unit> {
    if !caps.supports_alter_column {
        return Err(missing(&change, Capability::AddColumnWithDefault).into());
    }
    let mut bare = column.clone();
    bare.default = None;
    bare.nullable = true;
    let steps = vec![
        Change::add_column(table, bare.clone()),
        Change::modify_column(table, bare, column.clone()),
    ];
    Ok(Unit::rewritten(change, steps, Capability::AddColumnWithDefault))
}

/// Rebuilds a column the dialect cannot alter in place: add the new shape
/// under a temporary name, drop the old column, rename the new one back.
/// The new column starts empty, so the old values are lost with the drop.
fn rewrite_modify_column(change: Change, caps: &DialectCapabilities, ctx: &Context) -> Result<Unit> {
    let Change::ModifyColumn {
        table,
        from,
        to,
        dependent_indexes,
        constrained,
    } = &change
    else {
        return Ok(Unit::native(change));
    };

    let delta = ColumnDelta::between(from, to);
    let capability = if delta.column_type || delta.generated {
        Capability::AlterColumnType
    } else {
        Capability::AlterColumn
    };
    if caps.supports(capability) {
        return Ok(Unit::native(change));
    }

    // A rebuild cannot move keys, and cannot add a NOT NULL column to rows
    // that have no value for it.
    if !caps.supports_column_rename || *constrained || (!to.nullable && to.default.is_none()) {
        return Err(missing(&change, capability).into());
    }

    let mut temp = to.clone();
    temp.name = format!("{}{TEMP_COLUMN_SUFFIX}", to.name);

    let recreate: Vec<_> = dependent_indexes
        .iter()
        .filter(|i| !ctx.replaced_indexes.contains(&(table.clone(), i.name.clone())))
        .collect();

    let mut steps = Vec::new();
    if !caps.supports_drop_column_with_index {
        for index in &recreate {
            steps.push(Change::drop_index(table.as_str(), (*index).clone()));
        }
    }
    steps.push(Change::add_column(table.as_str(), temp.clone()));
    steps.push(Change::drop_column(table.as_str(), from.clone()));
    steps.push(Change::rename_column(table.as_str(), temp.name, to.name.as_str()));
    for index in recreate {
        steps.push(Change::add_index(table.as_str(), index.clone()));
    }

    Ok(Unit::rewritten(change, steps, capability))
}

/// Moves foreign keys of new tables into their AddTable for dialects that
/// cannot add constraints later.
pub(crate) fn fold_foreign_keys(units: Vec<Unit>, caps: &DialectCapabilities, ctx: &Context) -> Vec<Unit> {
    if caps.supports_alter_constraints {
        return units;
    }
    let mut folded: BTreeMap<String, Vec<ForeignKey>> = BTreeMap::new();
    let mut rest = Vec::with_capacity(units.len());
    for unit in units {
        match &unit.primary {
            Change::AddForeignKey { table, foreign_key } if ctx.is_new(table) => {
                folded.entry(table.clone()).or_default().push(foreign_key.clone());
            }
            _ => rest.push(unit),
        }
    }
    for unit in &mut rest {
        if let Change::AddTable { table } = &mut unit.primary {
            if let Some(fks) = folded.remove(&table.name) {
                debug!(table = %table.name, count = fks.len(), "Folded foreign keys into table creation");
                table.foreign_keys.extend(fks);
                unit.steps = vec![unit.primary.clone()];
            }
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Index;

    fn ctx() -> Context {
        Context::default()
    }

    #[test]
    fn test_native_when_supported() {
        let change = Change::modify_column(
            "users",
            Column::new("age", "int"),
            Column::new("age", "bigint"),
        );
        let unit = rewrite(change.clone(), &DialectCapabilities::postgres(), false, &ctx()).unwrap();
        assert_eq!(unit.steps, vec![change]);
        assert!(unit.rewrite.is_none());
    }

    #[test]
    fn test_type_change_rebuild() {
        let change = Change::ModifyColumn {
            table: "users".to_string(),
            from: Column::new("age", "int"),
            to: Column::new("age", "text"),
            dependent_indexes: vec![Index::new("idx_age", ["age"])],
            constrained: false,
        };
        let unit = rewrite(change, &DialectCapabilities::sqlite(), false, &ctx()).unwrap();
        assert_eq!(unit.rewrite, Some(Capability::AlterColumnType));
        let kinds: Vec<_> = unit.steps.iter().map(Change::kind).collect();
        assert_eq!(
            kinds,
            vec![
                crate::change::ChangeKind::DropIndex,
                crate::change::ChangeKind::AddColumn,
                crate::change::ChangeKind::DropColumn,
                crate::change::ChangeKind::RenameColumn,
                crate::change::ChangeKind::AddIndex,
            ]
        );
        assert_eq!(
            unit.steps[3],
            Change::rename_column("users", "age__strata_tmp", "age")
        );
    }

    #[test]
    fn test_rebuild_refused_for_constrained_column() {
        let change = Change::ModifyColumn {
            table: "users".to_string(),
            from: Column::new("id", "int"),
            to: Column::new("id", "bigint"),
            dependent_indexes: Vec::new(),
            constrained: true,
        };
        let err = rewrite(change, &DialectCapabilities::sqlite(), false, &ctx()).unwrap_err();
        assert!(err.to_string().contains("alter_column_type"));
    }

    #[test]
    fn test_rebuild_needs_column_rename() {
        let caps = DialectCapabilities::sqlite().with(Capability::ColumnRename, false);
        let change = Change::modify_column(
            "users",
            Column::new("bio", "varchar(10)"),
            Column::new("bio", "text"),
        );
        assert!(rewrite(change, &caps, false, &ctx()).is_err());
    }

    #[test]
    fn test_constraint_on_existing_table_needs_capability() {
        let change = Change::add_foreign_key("posts", ForeignKey::new("fk", ["a"], "users", ["id"]));
        assert!(rewrite(change.clone(), &DialectCapabilities::sqlite(), false, &ctx()).is_err());

        let mut context = ctx();
        context.new_tables.insert("posts".to_string());
        assert!(rewrite(change, &DialectCapabilities::sqlite(), false, &context).is_ok());
    }

    #[test]
    fn test_concurrent_index_is_standalone() {
        let change = Change::add_index("users", Index::new("idx_email", ["email"]));
        let unit = rewrite(change.clone(), &DialectCapabilities::postgres(), true, &ctx()).unwrap();
        assert!(unit.standalone);
        assert_eq!(unit.primary, change);
        assert!(matches!(
            unit.steps[0],
            Change::AddIndex {
                concurrently: true,
                ..
            }
        ));
    }

    #[test]
    fn test_split_add_column_with_default() {
        let caps = DialectCapabilities::postgres().with(Capability::AddColumnWithDefault, false);
        let column = Column::new("status", "text").not_null().default("'new'");
        let unit = rewrite(Change::add_column("orders", column), &caps, false, &ctx()).unwrap();
        assert_eq!(unit.steps.len(), 2);
        assert_eq!(unit.rewrite, Some(Capability::AddColumnWithDefault));
    }

    #[test]
    fn test_collapse_column_rename() {
        let changes = vec![
            Change::drop_column("users", Column::new("name", "text")),
            Change::add_column("users", Column::new("full_name", "text")),
        ];
        let collapsed = collapse_renames(changes.clone(), &DialectCapabilities::postgres());
        assert_eq!(collapsed, vec![Change::rename_column("users", "name", "full_name")]);

        let caps = DialectCapabilities::postgres().with(Capability::ColumnRename, false);
        assert_eq!(collapse_renames(changes, &caps).len(), 2);
    }

    #[test]
    fn test_collapse_table_rename() {
        let old = Table::new("people").column(Column::new("id", "bigint"));
        let new = Table::new("persons").column(Column::new("id", "bigint"));
        let collapsed = collapse_renames(
            vec![Change::drop_table(old), Change::add_table(new)],
            &DialectCapabilities::postgres(),
        );
        assert_eq!(collapsed, vec![Change::rename_table("people", "persons")]);
    }

    #[test]
    fn test_fold_foreign_keys_on_sqlite() {
        let mut context = ctx();
        context.new_tables.insert("posts".to_string());
        let units = vec![
            Unit::native(Change::add_table(Table::new("posts").column(Column::new("uid", "int")))),
            Unit::native(Change::add_foreign_key(
                "posts",
                ForeignKey::new("fk", ["uid"], "users", ["id"]),
            )),
        ];
        let folded = fold_foreign_keys(units, &DialectCapabilities::sqlite(), &context);
        assert_eq!(folded.len(), 1);
        let Change::AddTable { table } = &folded[0].steps[0] else {
            panic!("expected AddTable");
        };
        assert_eq!(table.foreign_keys.len(), 1);
    }
}
