//! Schema differ.
//!
//! Compares two snapshots of one dialect family and produces the typed
//! changes that turn the current schema into the desired one. Objects are
//! matched by name; renames come from explicit hints or, when enabled, a
//! pluggable scorer.

mod rename;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use rename::{name_similarity, AmbiguousRename, RenameHints, RenameScope, RenameScorer, ShapeScorer};

use crate::change::Change;
use crate::error::{Result, StrataError, UnsupportedChange};
use crate::expr;
use crate::schema::{Schema, Table};
use crate::state::SchemaState;

/// Default score a heuristic rename must reach.
pub const DEFAULT_RENAME_THRESHOLD: f64 = 0.7;

/// Options for the differ.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Whether to detect renames heuristically. Hints apply regardless.
    pub detect_renames: bool,
    /// Minimum score for a heuristic rename (0.0 to 1.0).
    pub rename_threshold: f64,
    /// Scoring function for heuristic renames.
    pub scorer: Arc<dyn RenameScorer>,
    /// Explicit renames supplied by the caller.
    pub hints: RenameHints,
    /// Fail on ambiguous renames instead of reporting them.
    pub strict: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffOptions {
    /// Creates default options: no heuristic renames, threshold 0.7.
    #[must_use]
    pub fn new() -> Self {
        Self {
            detect_renames: false,
            rename_threshold: DEFAULT_RENAME_THRESHOLD,
            scorer: Arc::new(ShapeScorer),
            hints: RenameHints::default(),
            strict: false,
        }
    }

    /// Enables rename detection.
    #[must_use]
    pub fn with_rename_detection(mut self) -> Self {
        self.detect_renames = true;
        self
    }

    /// Sets the rename threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.rename_threshold = threshold;
        self
    }

    /// Replaces the rename scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl RenameScorer + 'static) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    /// Supplies explicit renames.
    #[must_use]
    pub fn with_hints(mut self, hints: RenameHints) -> Self {
        self.hints = hints;
        self
    }

    /// Makes ambiguous renames an error.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Informational findings that are not changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum DiffWarning {
    /// The relative order of surviving columns differs. Column order is
    /// significant in some dialects; the differ never reorders.
    ColumnOrderChanged {
        /// Table name.
        table: String,
        /// Column names in the current order.
        current: Vec<String>,
        /// Column names in the desired order.
        desired: Vec<String>,
    },
}

/// Result of comparing two schema snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Structural changes, renames first, then by object name.
    pub changes: Vec<Change>,
    /// Renames the differ refused to guess.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<AmbiguousRename>,
    /// Informational warnings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DiffWarning>,
}

impl SchemaDiff {
    /// Returns true if there are no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changes with every ModifyTable replaced by its sub-changes.
    #[must_use]
    pub fn flattened(&self) -> Vec<Change> {
        self.changes.iter().cloned().flat_map(Change::flatten).collect()
    }
}

/// Computes changes between schema snapshots.
#[derive(Debug, Default)]
pub struct Differ {
    options: DiffOptions,
}

fn by_name<T>(items: &[T], name: impl Fn(&T) -> &str) -> BTreeMap<&str, &T> {
    items.iter().map(|i| (name(i), i)).collect()
}

impl Differ {
    /// Creates a differ with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a differ with custom options.
    #[must_use]
    pub const fn with_options(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Compares `current` with `desired`.
    ///
    /// # Errors
    ///
    /// - [`StrataError::IncompatibleSchema`] if the dialect families differ.
    /// - [`StrataError::InvalidSchema`] if either snapshot is malformed.
    /// - [`StrataError::InvalidRenameHint`] if a hint names a missing object.
    /// - [`StrataError::UnsupportedChange`] for an ambiguous rename in strict mode.
    pub fn diff(&self, current: &Schema, desired: &Schema) -> Result<SchemaDiff> {
        if current.dialect != desired.dialect {
            return Err(StrataError::IncompatibleSchema {
                current: current.dialect,
                desired: desired.dialect,
            });
        }
        let current = &current.with_enum_types_resolved();
        let desired = &desired.with_enum_types_resolved();
        validate_pair(current, desired)?;

        let mut result = SchemaDiff::default();
        let mut working = SchemaState::new(current.clone());

        let table_renames = self.table_renames(current, desired, &mut result)?;
        for (from, to) in &table_renames {
            let change = Change::rename_table(from.as_str(), to.as_str());
            working.apply(&change)?;
            result.changes.push(change);
        }

        for (table, hints) in &self.options.hints.columns {
            if working.schema().get_table(table).is_some() && desired.get_table(table).is_some() {
                continue;
            }
            if let Some((from, to)) = hints.iter().next() {
                return Err(StrataError::InvalidRenameHint {
                    from: format!("{table}.{from}"),
                    to: format!("{table}.{to}"),
                    reason: format!("table '{table}' is not present in both schemas"),
                });
            }
        }

        let mut column_renames: BTreeMap<String, Vec<Change>> = BTreeMap::new();
        for desired_table in &desired.tables {
            let Some(current_table) = working.schema().get_table(&desired_table.name) else {
                continue;
            };
            let renames = self.column_renames(current_table, desired_table, &mut result)?;
            if renames.is_empty() {
                continue;
            }
            let changes: Vec<Change> = renames
                .into_iter()
                .map(|(from, to)| Change::rename_column(desired_table.name.as_str(), from, to))
                .collect();
            working.apply_all(&changes)?;
            column_renames.insert(desired_table.name.clone(), changes);
        }

        let working = working.into_schema();
        self.diff_objects(&working, desired, column_renames, &mut result);

        info!(
            changes = result.changes.len(),
            ambiguous = result.ambiguous.len(),
            warnings = result.warnings.len(),
            "Schema diff computed"
        );
        Ok(result)
    }

    fn report_ambiguity(&self, result: &mut SchemaDiff, ambiguity: AmbiguousRename) -> Result<()> {
        debug!(
            scope = %ambiguity.scope,
            dropped = %ambiguity.dropped,
            candidates = ?ambiguity.candidates,
            "Ambiguous rename"
        );
        if self.options.strict {
            return Err(UnsupportedChange::AmbiguousRename {
                scope: ambiguity.scope.to_string(),
                dropped: ambiguity.dropped,
                candidates: ambiguity.candidates,
            }
            .into());
        }
        result.ambiguous.push(ambiguity);
        Ok(())
    }

    fn table_renames(
        &self,
        current: &Schema,
        desired: &Schema,
        result: &mut SchemaDiff,
    ) -> Result<Vec<(String, String)>> {
        let mut renames = Vec::new();
        for (from, to) in &self.options.hints.tables {
            let reason = if current.get_table(from).is_none() {
                Some(format!("table '{from}' does not exist in the current schema"))
            } else if desired.get_table(from).is_some() {
                Some(format!("table '{from}' still exists in the desired schema"))
            } else if desired.get_table(to).is_none() {
                Some(format!("table '{to}' does not exist in the desired schema"))
            } else if current.get_table(to).is_some() {
                Some(format!("table '{to}' already exists in the current schema"))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(StrataError::InvalidRenameHint {
                    from: from.clone(),
                    to: to.clone(),
                    reason,
                });
            }
            renames.push((from.clone(), to.clone()));
        }

        if self.options.detect_renames {
            let hinted_to: BTreeSet<&str> = self.options.hints.tables.values().map(String::as_str).collect();
            let mut dropped: Vec<&str> = current
                .table_names()
                .filter(|n| desired.get_table(n).is_none() && !self.options.hints.tables.contains_key(*n))
                .collect();
            let mut added: Vec<&str> = desired
                .table_names()
                .filter(|n| current.get_table(n).is_none() && !hinted_to.contains(n))
                .collect();
            dropped.sort_unstable();
            added.sort_unstable();

            let matching = rename::resolve(&dropped, &added, self.options.rename_threshold, |d, a| {
                let (Some(d), Some(a)) = (current.get_table(d), desired.get_table(a)) else {
                    return None;
                };
                self.options.scorer.score_tables(d, a)
            });
            for (from, to) in &matching.renames {
                debug!(from = %from, to = %to, "Detected table rename");
            }
            renames.extend(matching.renames);
            for (dropped, candidates, score) in matching.ambiguous {
                self.report_ambiguity(
                    result,
                    AmbiguousRename {
                        scope: RenameScope::Table,
                        dropped,
                        candidates,
                        score,
                    },
                )?;
            }
        }

        renames.sort();
        Ok(renames)
    }

    fn column_renames(
        &self,
        current: &Table,
        desired: &Table,
        result: &mut SchemaDiff,
    ) -> Result<Vec<(String, String)>> {
        let mut renames = Vec::new();
        let hints = self.options.hints.columns.get(&desired.name);
        if let Some(hints) = hints {
            for (from, to) in hints {
                let reason = if current.get_column(from).is_none() {
                    Some(format!("column '{}.{from}' does not exist in the current schema", desired.name))
                } else if desired.get_column(from).is_some() {
                    Some(format!("column '{}.{from}' still exists in the desired schema", desired.name))
                } else if desired.get_column(to).is_none() {
                    Some(format!("column '{}.{to}' does not exist in the desired schema", desired.name))
                } else if current.get_column(to).is_some() {
                    Some(format!("column '{}.{to}' already exists in the current schema", desired.name))
                } else {
                    None
                };
                if let Some(reason) = reason {
                    return Err(StrataError::InvalidRenameHint {
                        from: from.clone(),
                        to: to.clone(),
                        reason,
                    });
                }
                renames.push((from.clone(), to.clone()));
            }
        }

        if self.options.detect_renames {
            let hinted_from = |n: &str| hints.is_some_and(|h| h.contains_key(n));
            let hinted_to = |n: &str| hints.is_some_and(|h| h.values().any(|v| v == n));
            let mut dropped: Vec<&str> = current
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .filter(|n| desired.get_column(n).is_none() && !hinted_from(n))
                .collect();
            let mut added: Vec<&str> = desired
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .filter(|n| current.get_column(n).is_none() && !hinted_to(n))
                .collect();
            dropped.sort_unstable();
            added.sort_unstable();

            let matching = rename::resolve(&dropped, &added, self.options.rename_threshold, |d, a| {
                let (Some(d), Some(a)) = (current.get_column(d), desired.get_column(a)) else {
                    return None;
                };
                self.options.scorer.score_columns(d, a)
            });
            for (from, to) in &matching.renames {
                debug!(table = %desired.name, from = %from, to = %to, "Detected column rename");
            }
            renames.extend(matching.renames);
            for (dropped, candidates, score) in matching.ambiguous {
                self.report_ambiguity(
                    result,
                    AmbiguousRename {
                        scope: RenameScope::Column {
                            table: desired.name.clone(),
                        },
                        dropped,
                        candidates,
                        score,
                    },
                )?;
            }
        }

        renames.sort();
        Ok(renames)
    }

    fn diff_objects(
        &self,
        current: &Schema,
        desired: &Schema,
        mut column_renames: BTreeMap<String, Vec<Change>>,
        result: &mut SchemaDiff,
    ) {
        let from_tables = by_name(&current.tables, |t| &t.name);
        let to_tables = by_name(&desired.tables, |t| &t.name);

        for (&name, &table) in &from_tables {
            if !to_tables.contains_key(name) {
                result.changes.push(Change::drop_table(table.clone()));
            }
        }

        for (&name, &table) in &to_tables {
            match from_tables.get(name) {
                None => {
                    let mut created = table.clone();
                    let indexes = std::mem::take(&mut created.indexes);
                    let foreign_keys = std::mem::take(&mut created.foreign_keys);
                    result.changes.push(Change::add_table(created));
                    for index in indexes {
                        result.changes.push(Change::add_index(name, index));
                    }
                    for fk in foreign_keys {
                        result.changes.push(Change::add_foreign_key(name, fk));
                    }
                }
                Some(&from) => {
                    let mut changes = column_renames.remove(name).unwrap_or_default();
                    changes.extend(self.diff_table(from, table, &mut result.warnings));
                    if !changes.is_empty() {
                        result.changes.push(Change::ModifyTable {
                            table: name.to_string(),
                            changes,
                        });
                    }
                }
            }
        }

        diff_types(current, desired, &mut result.changes);
    }

    #[allow(clippy::unused_self, clippy::too_many_lines)]
    fn diff_table(&self, from: &Table, to: &Table, warnings: &mut Vec<DiffWarning>) -> Vec<Change> {
        let table = to.name.as_str();
        let mut drops = Vec::new();
        let mut columns = Vec::new();
        let mut adds = Vec::new();

        // Foreign keys, checks and uniques are replaced, never altered.
        let from_fks = by_name(&from.foreign_keys, |f| &f.name);
        let to_fks = by_name(&to.foreign_keys, |f| &f.name);
        for (name, &fk) in &from_fks {
            if to_fks.get(name).is_none_or(|&other| other != fk) {
                drops.push(Change::drop_foreign_key(table, fk.clone()));
            }
        }
        for (name, &fk) in &to_fks {
            if from_fks.get(name).is_none_or(|&other| other != fk) {
                adds.push(Change::add_foreign_key(table, fk.clone()));
            }
        }

        let from_checks = by_name(&from.checks, |c| &c.name);
        let to_checks = by_name(&to.checks, |c| &c.name);
        for (name, &check) in &from_checks {
            if to_checks
                .get(name)
                .is_none_or(|other| !expr::same(Some(other.expr.as_str()), Some(check.expr.as_str())))
            {
                drops.push(Change::DropCheck {
                    table: table.to_string(),
                    check: check.clone(),
                });
            }
        }
        for (name, &check) in &to_checks {
            if from_checks
                .get(name)
                .is_none_or(|other| !expr::same(Some(other.expr.as_str()), Some(check.expr.as_str())))
            {
                adds.push(Change::AddCheck {
                    table: table.to_string(),
                    check: check.clone(),
                });
            }
        }

        let from_uniques = by_name(&from.uniques, |u| &u.name);
        let to_uniques = by_name(&to.uniques, |u| &u.name);
        for (name, &unique) in &from_uniques {
            if to_uniques.get(name).is_none_or(|&other| other != unique) {
                drops.push(Change::DropUnique {
                    table: table.to_string(),
                    unique: unique.clone(),
                });
            }
        }
        for (name, &unique) in &to_uniques {
            if from_uniques.get(name).is_none_or(|&other| other != unique) {
                adds.push(Change::AddUnique {
                    table: table.to_string(),
                    unique: unique.clone(),
                });
            }
        }

        let from_indexes = by_name(&from.indexes, |i| &i.name);
        let to_indexes = by_name(&to.indexes, |i| &i.name);
        for (name, &index) in &from_indexes {
            if !to_indexes.contains_key(name) {
                drops.push(Change::drop_index(table, index.clone()));
            }
        }

        for col in &from.columns {
            if to.get_column(&col.name).is_none() {
                drops.push(Change::drop_column(table, col.clone()));
            }
        }
        for col in &to.columns {
            match from.get_column(&col.name) {
                None => columns.push(Change::add_column(table, col.clone())),
                Some(old) if !crate::change::ColumnDelta::between(old, col).is_empty() => {
                    columns.push(Change::ModifyColumn {
                        table: table.to_string(),
                        from: old.clone(),
                        to: col.clone(),
                        dependent_indexes: from
                            .indexes
                            .iter()
                            .filter(|i| i.covers(&col.name))
                            .cloned()
                            .collect(),
                        constrained: from.is_constrained(&col.name),
                    });
                }
                Some(_) => {}
            }
        }

        let current_order: Vec<String> = from
            .columns
            .iter()
            .filter(|c| to.get_column(&c.name).is_some())
            .map(|c| c.name.clone())
            .collect();
        let desired_order: Vec<String> = to
            .columns
            .iter()
            .filter(|c| from.get_column(&c.name).is_some())
            .map(|c| c.name.clone())
            .collect();
        if current_order != desired_order {
            warnings.push(DiffWarning::ColumnOrderChanged {
                table: table.to_string(),
                current: current_order,
                desired: desired_order,
            });
        }

        if from.primary_key != to.primary_key {
            columns.push(Change::ModifyPrimaryKey {
                table: table.to_string(),
                from: from.primary_key.clone(),
                to: to.primary_key.clone(),
            });
        }

        for (name, &index) in &to_indexes {
            match from_indexes.get(name) {
                None => adds.push(Change::add_index(table, index.clone())),
                Some(&old) if !old.equivalent(index) => adds.push(Change::ModifyIndex {
                    table: table.to_string(),
                    from: old.clone(),
                    to: index.clone(),
                }),
                Some(_) => {}
            }
        }

        if from.options != to.options {
            adds.push(Change::AlterTableOptions {
                table: table.to_string(),
                from: from.options.clone(),
                to: to.options.clone(),
            });
        }

        drops.extend(columns);
        drops.extend(adds);
        drops
    }
}

fn diff_types(current: &Schema, desired: &Schema, changes: &mut Vec<Change>) {
    let from_enums = by_name(&current.enums, |e| &e.name);
    let to_enums = by_name(&desired.enums, |e| &e.name);
    for (name, &e) in &from_enums {
        if !to_enums.contains_key(name) {
            changes.push(Change::DropEnum { enum_type: e.clone() });
        }
    }
    for (name, &e) in &to_enums {
        match from_enums.get(name) {
            None => changes.push(Change::AddEnum { enum_type: e.clone() }),
            Some(&old) if old.values != e.values => changes.push(Change::ModifyEnum {
                from: old.clone(),
                to: e.clone(),
            }),
            Some(_) => {}
        }
    }

    let from_seqs = by_name(&current.sequences, |s| &s.name);
    let to_seqs = by_name(&desired.sequences, |s| &s.name);
    for (name, &s) in &from_seqs {
        if !to_seqs.contains_key(name) {
            changes.push(Change::DropSequence { sequence: s.clone() });
        }
    }
    for (name, &s) in &to_seqs {
        match from_seqs.get(name) {
            None => changes.push(Change::AddSequence { sequence: s.clone() }),
            Some(&old) if old != s => changes.push(Change::ModifySequence {
                from: old.clone(),
                to: s.clone(),
            }),
            Some(_) => {}
        }
    }
}

fn validate_pair(current: &Schema, desired: &Schema) -> Result<()> {
    let mut problems = Vec::new();
    for (label, schema) in [("current", current), ("desired", desired)] {
        if let Err(StrataError::InvalidSchema(found)) = schema.validate() {
            problems.extend(found.into_iter().map(|p| format!("{label}: {p}")));
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(StrataError::InvalidSchema(problems))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, DialectFamily, EnumType, ForeignKey, Index};

    fn schema(tables: Vec<Table>) -> Schema {
        tables
            .into_iter()
            .fold(Schema::new("public", DialectFamily::Postgres), Schema::table)
    }

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "bigint"))
            .column(Column::new("name", "text").not_null())
            .primary_key(["id"])
    }

    #[test]
    fn test_identical_schemas_have_no_changes() {
        let s = schema(vec![users()]);
        let diff = Differ::new().diff(&s, &s).unwrap();
        assert!(diff.is_empty());
        assert!(diff.warnings.is_empty());
    }

    #[test]
    fn test_incompatible_dialects() {
        let a = Schema::new("main", DialectFamily::Sqlite);
        let b = Schema::new("public", DialectFamily::Postgres);
        assert!(matches!(
            Differ::new().diff(&a, &b),
            Err(StrataError::IncompatibleSchema { .. })
        ));
    }

    #[test]
    fn test_invalid_input_is_prefixed() {
        let bad = schema(vec![users(), users()]);
        let Err(StrataError::InvalidSchema(problems)) = Differ::new().diff(&schema(vec![]), &bad) else {
            panic!("expected InvalidSchema");
        };
        assert_eq!(problems, vec!["desired: duplicate table 'users'".to_string()]);
    }

    #[test]
    fn test_add_table_splits_indexes_and_foreign_keys() {
        let posts = Table::new("posts")
            .column(Column::new("id", "bigint"))
            .column(Column::new("author_id", "bigint"))
            .index(Index::new("idx_author", ["author_id"]))
            .foreign_key(ForeignKey::new("posts_author_fk", ["author_id"], "users", ["id"]));
        let diff = Differ::new()
            .diff(&schema(vec![users()]), &schema(vec![users(), posts]))
            .unwrap();

        assert_eq!(diff.changes.len(), 3);
        let Change::AddTable { table } = &diff.changes[0] else {
            panic!("expected AddTable first");
        };
        assert!(table.indexes.is_empty() && table.foreign_keys.is_empty());
        assert!(matches!(diff.changes[1], Change::AddIndex { .. }));
        assert!(matches!(diff.changes[2], Change::AddForeignKey { .. }));
    }

    #[test]
    fn test_spelling_differences_are_not_changes() {
        let a = schema(vec![Table::new("t").column(Column::new("n", "int4").default("(0)"))]);
        let b = schema(vec![Table::new("t").column(Column::new("n", "INTEGER").default("0"))]);
        assert!(Differ::new().diff(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn test_modify_column_carries_dependents() {
        let a = schema(vec![users().index(Index::new("idx_name", ["name"]))]);
        let b = schema(vec![Table::new("users")
            .column(Column::new("id", "bigint"))
            .column(Column::new("name", "varchar(80)").not_null())
            .primary_key(["id"])
            .index(Index::new("idx_name", ["name"]))]);
        let changes = Differ::new().diff(&a, &b).unwrap().flattened();
        assert_eq!(changes.len(), 1);
        let Change::ModifyColumn {
            dependent_indexes,
            constrained,
            ..
        } = &changes[0]
        else {
            panic!("expected ModifyColumn");
        };
        assert_eq!(dependent_indexes.len(), 1);
        assert!(!constrained);
    }

    #[test]
    fn test_rename_without_detection_is_drop_add() {
        let b = schema(vec![Table::new("users")
            .column(Column::new("id", "bigint"))
            .column(Column::new("full_name", "text").not_null())
            .primary_key(["id"])]);
        let changes = Differ::new().diff(&schema(vec![users()]), &b).unwrap().flattened();
        assert!(matches!(changes[0], Change::DropColumn { .. }));
        assert!(matches!(changes[1], Change::AddColumn { .. }));
    }

    #[test]
    fn test_rename_detected_heuristically() {
        let b = schema(vec![Table::new("users")
            .column(Column::new("id", "bigint"))
            .column(Column::new("full_name", "text").not_null())
            .primary_key(["id"])]);
        let differ = Differ::with_options(DiffOptions::new().with_rename_detection());
        let changes = differ.diff(&schema(vec![users()]), &b).unwrap().flattened();
        assert_eq!(changes, vec![Change::rename_column("users", "name", "full_name")]);
    }

    #[test]
    fn test_table_rename_hint() {
        let accounts = Table::new("accounts")
            .column(Column::new("id", "bigint"))
            .column(Column::new("name", "text").not_null())
            .primary_key(["id"]);
        let differ = Differ::with_options(
            DiffOptions::new().with_hints(RenameHints::new().table("users", "accounts")),
        );
        let diff = differ.diff(&schema(vec![users()]), &schema(vec![accounts])).unwrap();
        assert_eq!(diff.changes, vec![Change::rename_table("users", "accounts")]);
    }

    #[test]
    fn test_invalid_hint() {
        let differ = Differ::with_options(
            DiffOptions::new().with_hints(RenameHints::new().table("ghosts", "users")),
        );
        assert!(matches!(
            differ.diff(&schema(vec![]), &schema(vec![users()])),
            Err(StrataError::InvalidRenameHint { .. })
        ));
    }

    #[test]
    fn test_ambiguous_rename_reported_or_strict() {
        let a = schema(vec![Table::new("t")
            .column(Column::new("id", "bigint"))
            .column(Column::new("ab", "text"))]);
        let b = schema(vec![Table::new("t")
            .column(Column::new("id", "bigint"))
            .column(Column::new("ac", "text"))
            .column(Column::new("ad", "text"))]);

        let options = DiffOptions::new().with_rename_detection();
        let diff = Differ::with_options(options.clone()).diff(&a, &b).unwrap();
        assert_eq!(diff.ambiguous.len(), 1);
        assert_eq!(diff.ambiguous[0].candidates, vec!["ac", "ad"]);
        assert_eq!(diff.flattened().len(), 3);

        let err = Differ::with_options(options.strict()).diff(&a, &b).unwrap_err();
        assert!(matches!(
            err,
            StrataError::UnsupportedChange(UnsupportedChange::AmbiguousRename { .. })
        ));
    }

    #[test]
    fn test_foreign_key_change_is_drop_add() {
        let posts = |action| {
            Table::new("posts")
                .column(Column::new("author_id", "bigint"))
                .foreign_key(
                    ForeignKey::new("fk", ["author_id"], "users", ["id"]).on_delete(action),
                )
        };
        let a = schema(vec![users(), posts(crate::schema::ReferentialAction::NoAction)]);
        let b = schema(vec![users(), posts(crate::schema::ReferentialAction::Cascade)]);
        let changes = Differ::new().diff(&a, &b).unwrap().flattened();
        assert!(matches!(changes[0], Change::DropForeignKey { .. }));
        assert!(matches!(changes[1], Change::AddForeignKey { .. }));
    }

    #[test]
    fn test_column_order_warning() {
        let a = schema(vec![Table::new("t")
            .column(Column::new("a", "int"))
            .column(Column::new("b", "int"))]);
        let b = schema(vec![Table::new("t")
            .column(Column::new("b", "int"))
            .column(Column::new("a", "int"))]);
        let diff = Differ::new().diff(&a, &b).unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.warnings.len(), 1);
    }

    #[test]
    fn test_enum_changes() {
        let a = schema(vec![]).enum_type(EnumType::new("mood", ["happy"]));
        let b = schema(vec![]).enum_type(EnumType::new("mood", ["happy", "sad"]));
        let diff = Differ::new().diff(&a, &b).unwrap();
        assert!(matches!(diff.changes[0], Change::ModifyEnum { .. }));
    }

    #[test]
    fn test_column_naming_an_enum_uses_it() {
        let a = schema(vec![]);
        let b = schema(vec![Table::new("people").column(Column::new("mood", "Mood"))])
            .enum_type(EnumType::new("mood", ["happy", "sad"]));
        let diff = Differ::new().diff(&a, &b).unwrap();
        let table = diff
            .changes
            .iter()
            .find_map(|c| match c {
                Change::AddTable { table } => Some(table),
                _ => None,
            })
            .unwrap();
        assert_eq!(table.columns[0].logical_type().enum_name(), Some("mood"));
    }
}
