//! Schema-model mutator.
//!
//! [`SchemaState`] replays changes against a schema snapshot, checking each
//! change's precondition the way a database would. The differ uses it to
//! apply detected renames, and [`crate::plan::Plan::apply_to`] uses it to
//! replay a whole plan.

use crate::change::Change;
use crate::error::{Result, StrataError};
use crate::schema::{Column, IndexPart, Schema, Table};

fn invalid(message: String) -> StrataError {
    StrataError::InvalidState(message)
}

fn remove_named<T>(items: &mut Vec<T>, name: &str, key: impl Fn(&T) -> &str) -> Option<T> {
    items.iter().position(|i| key(i) == name).map(|idx| items.remove(idx))
}

/// A mutable schema that changes are applied to one at a time.
#[derive(Debug, Clone)]
pub struct SchemaState {
    schema: Schema,
}

impl SchemaState {
    /// Starts from a snapshot.
    #[must_use]
    pub const fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Returns the current schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Consumes and returns the schema.
    #[must_use]
    pub fn into_schema(self) -> Schema {
        self.schema
    }

    /// Applies changes in order.
    ///
    /// # Errors
    ///
    /// Stops at the first change whose precondition fails.
    pub fn apply_all<'a>(&mut self, changes: impl IntoIterator<Item = &'a Change>) -> Result<()> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.schema
            .get_table_mut(name)
            .ok_or_else(|| invalid(format!("Table '{name}' does not exist")))
    }

    fn referencing_foreign_key(&self, table: &str, column: Option<&str>) -> Option<(String, String)> {
        self.schema.tables.iter().find_map(|t| {
            t.foreign_keys
                .iter()
                .filter(|fk| fk.ref_table == table && t.name != table)
                .find(|fk| column.is_none_or(|c| fk.ref_columns.iter().any(|rc| rc == c)))
                .map(|fk| (fk.name.clone(), t.name.clone()))
        })
    }

    /// Applies a single change.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidState`] if the change does not fit the
    /// current state, e.g. adding a table that exists or dropping a column a
    /// key still covers.
    #[allow(clippy::too_many_lines)]
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::AddTable { table } => {
                if self.schema.get_table(&table.name).is_some() {
                    return Err(invalid(format!("Table '{}' already exists", table.name)));
                }
                self.schema.tables.push(table.clone());
            }

            Change::DropTable { table } => {
                if let Some((fk, owner)) = self.referencing_foreign_key(&table.name, None) {
                    return Err(invalid(format!(
                        "Table '{}' is still referenced by foreign key '{fk}' on '{owner}'",
                        table.name
                    )));
                }
                remove_named(&mut self.schema.tables, &table.name, |t| &t.name)
                    .ok_or_else(|| invalid(format!("Table '{}' does not exist", table.name)))?;
            }

            Change::RenameTable { from, to } => {
                if self.schema.get_table(to).is_some() {
                    return Err(invalid(format!("Table '{to}' already exists")));
                }
                self.table_mut(from)?.name.clone_from(to);
                for t in &mut self.schema.tables {
                    for fk in &mut t.foreign_keys {
                        if fk.ref_table == *from {
                            fk.ref_table.clone_from(to);
                        }
                    }
                }
            }

            Change::ModifyTable { changes, .. } => self.apply_all(changes)?,

            Change::AlterTableOptions { table, to, .. } => {
                self.table_mut(table)?.options = to.clone();
            }

            Change::AddColumn { table, column } => {
                let t = self.table_mut(table)?;
                if t.get_column(&column.name).is_some() {
                    return Err(invalid(format!(
                        "Column '{}' already exists in table '{table}'",
                        column.name
                    )));
                }
                t.columns.push(column.clone());
            }

            Change::DropColumn { table, column } => self.drop_column(table, column)?,

            Change::RenameColumn { table, from, to } => self.rename_column(table, from, to)?,

            Change::ModifyColumn {
                table, from, to, ..
            } => {
                let t = self.table_mut(table)?;
                let col = t.get_column_mut(&from.name).ok_or_else(|| {
                    invalid(format!(
                        "Column '{}' does not exist in table '{table}'",
                        from.name
                    ))
                })?;
                *col = to.clone();
            }

            Change::AddIndex { table, index, .. } => {
                let t = self.table_mut(table)?;
                if t.get_index(&index.name).is_some() {
                    return Err(invalid(format!(
                        "Index '{}' already exists on table '{table}'",
                        index.name
                    )));
                }
                if let Some(missing) = index.columns().find(|c| t.get_column(c).is_none()) {
                    return Err(invalid(format!(
                        "Index '{}' covers missing column '{table}.{missing}'",
                        index.name
                    )));
                }
                t.indexes.push(index.clone());
            }

            Change::DropIndex { table, index } => {
                let t = self.table_mut(table)?;
                remove_named(&mut t.indexes, &index.name, |i| &i.name).ok_or_else(|| {
                    invalid(format!(
                        "Index '{}' does not exist on table '{table}'",
                        index.name
                    ))
                })?;
            }

            Change::ModifyIndex { table, from, to } => {
                let t = self.table_mut(table)?;
                let idx = t
                    .indexes
                    .iter_mut()
                    .find(|i| i.name == from.name)
                    .ok_or_else(|| {
                        invalid(format!(
                            "Index '{}' does not exist on table '{table}'",
                            from.name
                        ))
                    })?;
                *idx = to.clone();
            }

            Change::AddForeignKey { table, foreign_key } => {
                let target = self.schema.get_table(&foreign_key.ref_table).ok_or_else(|| {
                    invalid(format!(
                        "Foreign key '{}' references missing table '{}'",
                        foreign_key.name, foreign_key.ref_table
                    ))
                })?;
                if let Some(missing) = foreign_key
                    .ref_columns
                    .iter()
                    .find(|c| target.get_column(c).is_none())
                {
                    return Err(invalid(format!(
                        "Foreign key '{}' references missing column '{}.{missing}'",
                        foreign_key.name, foreign_key.ref_table
                    )));
                }
                let t = self.table_mut(table)?;
                if t.foreign_keys.iter().any(|fk| fk.name == foreign_key.name) {
                    return Err(invalid(format!(
                        "Foreign key '{}' already exists on table '{table}'",
                        foreign_key.name
                    )));
                }
                if let Some(missing) = foreign_key.columns.iter().find(|c| t.get_column(c).is_none()) {
                    return Err(invalid(format!(
                        "Foreign key '{}' uses missing column '{table}.{missing}'",
                        foreign_key.name
                    )));
                }
                t.foreign_keys.push(foreign_key.clone());
            }

            Change::DropForeignKey { table, foreign_key } => {
                let t = self.table_mut(table)?;
                remove_named(&mut t.foreign_keys, &foreign_key.name, |fk| &fk.name).ok_or_else(
                    || {
                        invalid(format!(
                            "Foreign key '{}' does not exist in table '{table}'",
                            foreign_key.name
                        ))
                    },
                )?;
            }

            Change::AddCheck { table, check } => {
                let t = self.table_mut(table)?;
                if t.checks.iter().any(|c| c.name == check.name) {
                    return Err(invalid(format!(
                        "Check '{}' already exists on table '{table}'",
                        check.name
                    )));
                }
                t.checks.push(check.clone());
            }

            Change::DropCheck { table, check } => {
                let t = self.table_mut(table)?;
                remove_named(&mut t.checks, &check.name, |c| &c.name).ok_or_else(|| {
                    invalid(format!(
                        "Check '{}' does not exist in table '{table}'",
                        check.name
                    ))
                })?;
            }

            Change::AddUnique { table, unique } => {
                let t = self.table_mut(table)?;
                if t.uniques.iter().any(|u| u.name == unique.name) {
                    return Err(invalid(format!(
                        "Unique constraint '{}' already exists on table '{table}'",
                        unique.name
                    )));
                }
                t.uniques.push(unique.clone());
            }

            Change::DropUnique { table, unique } => {
                let t = self.table_mut(table)?;
                remove_named(&mut t.uniques, &unique.name, |u| &u.name).ok_or_else(|| {
                    invalid(format!(
                        "Unique constraint '{}' does not exist in table '{table}'",
                        unique.name
                    ))
                })?;
            }

            Change::ModifyPrimaryKey { table, to, .. } => {
                let t = self.table_mut(table)?;
                if let Some(pk) = to {
                    if let Some(missing) = pk.columns.iter().find(|c| t.get_column(c).is_none()) {
                        return Err(invalid(format!(
                            "Primary key of '{table}' covers missing column '{missing}'"
                        )));
                    }
                }
                t.primary_key.clone_from(to);
            }

            Change::AddEnum { enum_type } => {
                if self.schema.get_enum(&enum_type.name).is_some() {
                    return Err(invalid(format!("Enum '{}' already exists", enum_type.name)));
                }
                self.schema.enums.push(enum_type.clone());
            }

            Change::DropEnum { enum_type } => {
                let user = self.schema.tables.iter().find_map(|t| {
                    t.columns
                        .iter()
                        .find(|c| c.logical_type().enum_name() == Some(enum_type.name.as_str()))
                        .map(|c| format!("{}.{}", t.name, c.name))
                });
                if let Some(user) = user {
                    return Err(invalid(format!(
                        "Enum '{}' is still used by column '{user}'",
                        enum_type.name
                    )));
                }
                remove_named(&mut self.schema.enums, &enum_type.name, |e| &e.name)
                    .ok_or_else(|| invalid(format!("Enum '{}' does not exist", enum_type.name)))?;
            }

            Change::ModifyEnum { from, to } => {
                let e = self
                    .schema
                    .enums
                    .iter_mut()
                    .find(|e| e.name == from.name)
                    .ok_or_else(|| invalid(format!("Enum '{}' does not exist", from.name)))?;
                *e = to.clone();
            }

            Change::AddSequence { sequence } => {
                if self.schema.get_sequence(&sequence.name).is_some() {
                    return Err(invalid(format!(
                        "Sequence '{}' already exists",
                        sequence.name
                    )));
                }
                self.schema.sequences.push(sequence.clone());
            }

            Change::DropSequence { sequence } => {
                remove_named(&mut self.schema.sequences, &sequence.name, |s| &s.name)
                    .ok_or_else(|| invalid(format!("Sequence '{}' does not exist", sequence.name)))?;
            }

            Change::ModifySequence { from, to } => {
                let s = self
                    .schema
                    .sequences
                    .iter_mut()
                    .find(|s| s.name == from.name)
                    .ok_or_else(|| invalid(format!("Sequence '{}' does not exist", from.name)))?;
                *s = to.clone();
            }
        }

        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &Column) -> Result<()> {
        if let Some((fk, owner)) = self.referencing_foreign_key(table, Some(&column.name)) {
            return Err(invalid(format!(
                "Column '{table}.{}' is still referenced by foreign key '{fk}' on '{owner}'",
                column.name
            )));
        }
        let t = self.table_mut(table)?;
        let name = column.name.as_str();
        let keyed = t
            .primary_key
            .as_ref()
            .is_some_and(|pk| pk.columns.iter().any(|c| c == name))
            || t.uniques.iter().any(|u| u.columns.iter().any(|c| c == name))
            || t.foreign_keys.iter().any(|fk| fk.columns.iter().any(|c| c == name));
        if keyed {
            return Err(invalid(format!(
                "Column '{table}.{name}' is still covered by a key or constraint"
            )));
        }
        remove_named(&mut t.columns, name, |c| &c.name).ok_or_else(|| {
            invalid(format!("Column '{name}' does not exist in table '{table}'"))
        })?;
        t.indexes.retain(|i| !i.covers(name));
        t.checks.retain(|c| !crate::expr::mentions(&c.expr, name));
        Ok(())
    }

    fn rename_column(&mut self, table: &str, from: &str, to: &str) -> Result<()> {
        let t = self.table_mut(table)?;
        if t.get_column(to).is_some() {
            return Err(invalid(format!(
                "Column '{to}' already exists in table '{table}'"
            )));
        }
        let col = t.get_column_mut(from).ok_or_else(|| {
            invalid(format!("Column '{from}' does not exist in table '{table}'"))
        })?;
        col.name = to.to_string();

        let rename = |c: &mut String| {
            if c == from {
                *c = to.to_string();
            }
        };
        if let Some(pk) = &mut t.primary_key {
            pk.columns.iter_mut().for_each(rename);
        }
        for u in &mut t.uniques {
            u.columns.iter_mut().for_each(rename);
        }
        for fk in &mut t.foreign_keys {
            fk.columns.iter_mut().for_each(rename);
        }
        for idx in &mut t.indexes {
            for part in &mut idx.parts {
                if let IndexPart::Column(c) = part {
                    rename(c);
                }
            }
        }
        for other in &mut self.schema.tables {
            for fk in &mut other.foreign_keys {
                if fk.ref_table == table {
                    fk.ref_columns.iter_mut().for_each(rename);
                }
            }
        }
        Ok(())
    }
}
