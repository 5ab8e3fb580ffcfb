//! Structural changes between two schema snapshots.
//!
//! A [`Change`] names the objects it affects by their identity within the
//! owning scope (table name, column name, constraint name), never by
//! position, so the planner may reorder changes freely. Drop variants carry
//! the full definition of what they remove.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr;
use crate::lattice::TypeLattice;
use crate::schema::{
    CheckConstraint, Column, EnumType, ForeignKey, Index, PrimaryKey, Sequence, Table,
    TableOptions, UniqueConstraint,
};

/// Which attributes of a column differ between two definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ColumnDelta {
    /// Logical type differs.
    pub column_type: bool,
    /// Nullability differs.
    pub nullable: bool,
    /// Default expression differs.
    pub default: bool,
    /// Generation expression differs.
    pub generated: bool,
}

impl ColumnDelta {
    /// Compares two column definitions.
    #[must_use]
    pub fn between(from: &Column, to: &Column) -> Self {
        Self {
            column_type: from.column_type != to.column_type,
            nullable: from.nullable != to.nullable,
            default: !expr::same(from.default.as_deref(), to.default.as_deref()),
            generated: from.generated.as_ref().map(|g| (expr::normalize(&g.expr), g.stored))
                != to.generated.as_ref().map(|g| (expr::normalize(&g.expr), g.stored)),
        }
    }

    /// Returns true if no attribute differs.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.column_type && !self.nullable && !self.default && !self.generated
    }

    /// Returns true if only nullability or the default differ.
    #[must_use]
    pub const fn is_attribute_only(&self) -> bool {
        !self.column_type && !self.generated && (self.nullable || self.default)
    }
}

/// A single structural delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// Create a table with its columns, primary key, checks and uniques.
    /// Indexes and foreign keys of a new table are separate changes.
    AddTable {
        /// Table definition.
        table: Table,
    },

    /// Drop a table.
    DropTable {
        /// Definition of the dropped table.
        table: Table,
    },

    /// Rename a table.
    RenameTable {
        /// Old table name.
        from: String,
        /// New table name.
        to: String,
    },

    /// Grouped sub-changes of one existing table.
    ModifyTable {
        /// Table name.
        table: String,
        /// Column, index and constraint changes.
        changes: Vec<Change>,
    },

    /// Change the comment or dialect attributes of a table.
    AlterTableOptions {
        /// Table name.
        table: String,
        /// Options before the change.
        from: TableOptions,
        /// Options after the change.
        to: TableOptions,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },

    /// Drop a column from a table.
    DropColumn {
        /// Table name.
        table: String,
        /// Definition of the dropped column.
        column: Column,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Old column name.
        from: String,
        /// New column name.
        to: String,
    },

    /// Alter a column's type, nullability, default or generation.
    ModifyColumn {
        /// Table name.
        table: String,
        /// Column definition before the change.
        from: Column,
        /// Column definition after the change.
        to: Column,
        /// Indexes covering the column in the current snapshot.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        dependent_indexes: Vec<Index>,
        /// Whether a key or constraint covers the column.
        #[serde(default)]
        constrained: bool,
    },

    /// Create an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: Index,
        /// Whether the index is built without blocking writes.
        #[serde(default)]
        concurrently: bool,
    },

    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// Definition of the dropped index.
        index: Index,
    },

    /// Rebuild an index with a new definition under the same name.
    ModifyIndex {
        /// Table name.
        table: String,
        /// Index before the change.
        from: Index,
        /// Index after the change.
        to: Index,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Referencing table.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKey,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Referencing table.
        table: String,
        /// Definition of the dropped foreign key.
        foreign_key: ForeignKey,
    },

    /// Add a check constraint.
    AddCheck {
        /// Table name.
        table: String,
        /// Check definition.
        check: CheckConstraint,
    },

    /// Drop a check constraint.
    DropCheck {
        /// Table name.
        table: String,
        /// Definition of the dropped check.
        check: CheckConstraint,
    },

    /// Add a unique constraint.
    AddUnique {
        /// Table name.
        table: String,
        /// Unique constraint definition.
        unique: UniqueConstraint,
    },

    /// Drop a unique constraint.
    DropUnique {
        /// Table name.
        table: String,
        /// Definition of the dropped unique constraint.
        unique: UniqueConstraint,
    },

    /// Add, drop or replace a table's primary key.
    ModifyPrimaryKey {
        /// Table name.
        table: String,
        /// Primary key before the change.
        from: Option<PrimaryKey>,
        /// Primary key after the change.
        to: Option<PrimaryKey>,
    },

    /// Create an enumerated type.
    AddEnum {
        /// Type definition.
        enum_type: EnumType,
    },

    /// Drop an enumerated type.
    DropEnum {
        /// Definition of the dropped type.
        enum_type: EnumType,
    },

    /// Change the values of an enumerated type.
    ModifyEnum {
        /// Type before the change.
        from: EnumType,
        /// Type after the change.
        to: EnumType,
    },

    /// Create a sequence.
    AddSequence {
        /// Sequence definition.
        sequence: Sequence,
    },

    /// Drop a sequence.
    DropSequence {
        /// Definition of the dropped sequence.
        sequence: Sequence,
    },

    /// Change the parameters of a sequence.
    ModifySequence {
        /// Sequence before the change.
        from: Sequence,
        /// Sequence after the change.
        to: Sequence,
    },
}

/// Fieldless discriminant of [`Change`].
///
/// Declaration order is the planner's tie-break priority: drops first, then
/// type objects, then tables, columns and finally indexes and foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// [`Change::DropForeignKey`]
    DropForeignKey,
    /// [`Change::DropCheck`]
    DropCheck,
    /// [`Change::DropUnique`]
    DropUnique,
    /// [`Change::DropIndex`]
    DropIndex,
    /// [`Change::DropColumn`]
    DropColumn,
    /// [`Change::DropTable`]
    DropTable,
    /// [`Change::DropEnum`]
    DropEnum,
    /// [`Change::DropSequence`]
    DropSequence,
    /// [`Change::AddEnum`]
    AddEnum,
    /// [`Change::ModifyEnum`]
    ModifyEnum,
    /// [`Change::AddSequence`]
    AddSequence,
    /// [`Change::ModifySequence`]
    ModifySequence,
    /// [`Change::RenameTable`]
    RenameTable,
    /// [`Change::AddTable`]
    AddTable,
    /// [`Change::ModifyTable`]
    ModifyTable,
    /// [`Change::AlterTableOptions`]
    AlterTableOptions,
    /// [`Change::RenameColumn`]
    RenameColumn,
    /// [`Change::AddColumn`]
    AddColumn,
    /// [`Change::ModifyColumn`]
    ModifyColumn,
    /// [`Change::ModifyPrimaryKey`]
    ModifyPrimaryKey,
    /// [`Change::AddUnique`]
    AddUnique,
    /// [`Change::AddCheck`]
    AddCheck,
    /// [`Change::ModifyIndex`]
    ModifyIndex,
    /// [`Change::AddIndex`]
    AddIndex,
    /// [`Change::AddForeignKey`]
    AddForeignKey,
}

impl ChangeKind {
    /// Tie-break priority; lower runs first when no dependency decides.
    #[must_use]
    pub const fn priority(self) -> u8 {
        self as u8
    }
}

/// Stable identity of the object a change affects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub enum ObjectRef {
    /// A table.
    Table {
        /// Table name.
        name: String,
    },
    /// A column of a table.
    Column {
        /// Table name.
        table: String,
        /// Column name.
        name: String,
    },
    /// An index of a table.
    Index {
        /// Table name.
        table: String,
        /// Index name.
        name: String,
    },
    /// A constraint of a table (foreign key, check, unique, primary key).
    Constraint {
        /// Table name.
        table: String,
        /// Constraint name.
        name: String,
    },
    /// An enumerated type.
    Enum {
        /// Type name.
        name: String,
    },
    /// A sequence.
    Sequence {
        /// Sequence name.
        name: String,
    },
}

impl ObjectRef {
    /// The table this object belongs to, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Table { name } => Some(name),
            Self::Column { table, .. } | Self::Index { table, .. } | Self::Constraint { table, .. } => {
                Some(table)
            }
            Self::Enum { .. } | Self::Sequence { .. } => None,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table { name } | Self::Enum { name } | Self::Sequence { name } => f.write_str(name),
            Self::Column { table, name }
            | Self::Index { table, name }
            | Self::Constraint { table, name } => write!(f, "{table}.{name}"),
        }
    }
}

fn table_ref(name: &str) -> ObjectRef {
    ObjectRef::Table {
        name: name.to_string(),
    }
}

fn column_ref(table: &str, name: &str) -> ObjectRef {
    ObjectRef::Column {
        table: table.to_string(),
        name: name.to_string(),
    }
}

fn index_ref(table: &str, name: &str) -> ObjectRef {
    ObjectRef::Index {
        table: table.to_string(),
        name: name.to_string(),
    }
}

fn constraint_ref(table: &str, name: &str) -> ObjectRef {
    ObjectRef::Constraint {
        table: table.to_string(),
        name: name.to_string(),
    }
}

/// Name used for the identity of an unnamed primary key.
pub const PRIMARY_KEY_NAME: &str = "PRIMARY KEY";

impl Change {
    /// Creates an AddTable change.
    #[must_use]
    pub const fn add_table(table: Table) -> Self {
        Self::AddTable { table }
    }

    /// Creates a DropTable change.
    #[must_use]
    pub const fn drop_table(table: Table) -> Self {
        Self::DropTable { table }
    }

    /// Creates a RenameTable change.
    #[must_use]
    pub fn rename_table(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::RenameTable {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates an AddColumn change.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a DropColumn change.
    #[must_use]
    pub fn drop_column(table: impl Into<String>, column: Column) -> Self {
        Self::DropColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a RenameColumn change.
    #[must_use]
    pub fn rename_column(
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::RenameColumn {
            table: table.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates a ModifyColumn change without dependent indexes.
    #[must_use]
    pub fn modify_column(table: impl Into<String>, from: Column, to: Column) -> Self {
        Self::ModifyColumn {
            table: table.into(),
            from,
            to,
            dependent_indexes: Vec::new(),
            constrained: false,
        }
    }

    /// Creates a blocking AddIndex change.
    #[must_use]
    pub fn add_index(table: impl Into<String>, index: Index) -> Self {
        Self::AddIndex {
            table: table.into(),
            index,
            concurrently: false,
        }
    }

    /// Creates a DropIndex change.
    #[must_use]
    pub fn drop_index(table: impl Into<String>, index: Index) -> Self {
        Self::DropIndex {
            table: table.into(),
            index,
        }
    }

    /// Creates an AddForeignKey change.
    #[must_use]
    pub fn add_foreign_key(table: impl Into<String>, foreign_key: ForeignKey) -> Self {
        Self::AddForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    /// Creates a DropForeignKey change.
    #[must_use]
    pub fn drop_foreign_key(table: impl Into<String>, foreign_key: ForeignKey) -> Self {
        Self::DropForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    /// Returns the fieldless kind of this change.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::AddTable { .. } => ChangeKind::AddTable,
            Self::DropTable { .. } => ChangeKind::DropTable,
            Self::RenameTable { .. } => ChangeKind::RenameTable,
            Self::ModifyTable { .. } => ChangeKind::ModifyTable,
            Self::AlterTableOptions { .. } => ChangeKind::AlterTableOptions,
            Self::AddColumn { .. } => ChangeKind::AddColumn,
            Self::DropColumn { .. } => ChangeKind::DropColumn,
            Self::RenameColumn { .. } => ChangeKind::RenameColumn,
            Self::ModifyColumn { .. } => ChangeKind::ModifyColumn,
            Self::AddIndex { .. } => ChangeKind::AddIndex,
            Self::DropIndex { .. } => ChangeKind::DropIndex,
            Self::ModifyIndex { .. } => ChangeKind::ModifyIndex,
            Self::AddForeignKey { .. } => ChangeKind::AddForeignKey,
            Self::DropForeignKey { .. } => ChangeKind::DropForeignKey,
            Self::AddCheck { .. } => ChangeKind::AddCheck,
            Self::DropCheck { .. } => ChangeKind::DropCheck,
            Self::AddUnique { .. } => ChangeKind::AddUnique,
            Self::DropUnique { .. } => ChangeKind::DropUnique,
            Self::ModifyPrimaryKey { .. } => ChangeKind::ModifyPrimaryKey,
            Self::AddEnum { .. } => ChangeKind::AddEnum,
            Self::DropEnum { .. } => ChangeKind::DropEnum,
            Self::ModifyEnum { .. } => ChangeKind::ModifyEnum,
            Self::AddSequence { .. } => ChangeKind::AddSequence,
            Self::DropSequence { .. } => ChangeKind::DropSequence,
            Self::ModifySequence { .. } => ChangeKind::ModifySequence,
        }
    }

    /// Returns the identity of the object this change affects.
    ///
    /// Renames are identified by their new name.
    #[must_use]
    pub fn target(&self) -> ObjectRef {
        match self {
            Self::AddTable { table } | Self::DropTable { table } => table_ref(&table.name),
            Self::RenameTable { to, .. } => table_ref(to),
            Self::ModifyTable { table, .. } | Self::AlterTableOptions { table, .. } => {
                table_ref(table)
            }
            Self::AddColumn { table, column } | Self::DropColumn { table, column } => {
                column_ref(table, &column.name)
            }
            Self::RenameColumn { table, to, .. } => column_ref(table, to),
            Self::ModifyColumn { table, to, .. } => column_ref(table, &to.name),
            Self::AddIndex { table, index, .. } | Self::DropIndex { table, index } => {
                index_ref(table, &index.name)
            }
            Self::ModifyIndex { table, to, .. } => index_ref(table, &to.name),
            Self::AddForeignKey { table, foreign_key }
            | Self::DropForeignKey { table, foreign_key } => {
                constraint_ref(table, &foreign_key.name)
            }
            Self::AddCheck { table, check } | Self::DropCheck { table, check } => {
                constraint_ref(table, &check.name)
            }
            Self::AddUnique { table, unique } | Self::DropUnique { table, unique } => {
                constraint_ref(table, &unique.name)
            }
            Self::ModifyPrimaryKey { table, from, to } => {
                let name = to
                    .as_ref()
                    .and_then(|pk| pk.name.as_deref())
                    .or_else(|| from.as_ref().and_then(|pk| pk.name.as_deref()))
                    .unwrap_or(PRIMARY_KEY_NAME);
                constraint_ref(table, name)
            }
            Self::AddEnum { enum_type } | Self::DropEnum { enum_type } => ObjectRef::Enum {
                name: enum_type.name.clone(),
            },
            Self::ModifyEnum { to, .. } => ObjectRef::Enum {
                name: to.name.clone(),
            },
            Self::AddSequence { sequence } | Self::DropSequence { sequence } => {
                ObjectRef::Sequence {
                    name: sequence.name.clone(),
                }
            }
            Self::ModifySequence { to, .. } => ObjectRef::Sequence {
                name: to.name.clone(),
            },
        }
    }

    /// The table this change belongs to, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::AddTable { table } | Self::DropTable { table } => Some(&table.name),
            Self::RenameTable { to, .. } => Some(to),
            Self::ModifyTable { table, .. }
            | Self::AlterTableOptions { table, .. }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::ModifyColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::ModifyIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::AddCheck { table, .. }
            | Self::DropCheck { table, .. }
            | Self::AddUnique { table, .. }
            | Self::DropUnique { table, .. }
            | Self::ModifyPrimaryKey { table, .. } => Some(table),
            Self::AddEnum { .. }
            | Self::DropEnum { .. }
            | Self::ModifyEnum { .. }
            | Self::AddSequence { .. }
            | Self::DropSequence { .. }
            | Self::ModifySequence { .. } => None,
        }
    }

    /// For a ModifyColumn, which attributes change.
    #[must_use]
    pub fn column_delta(&self) -> Option<ColumnDelta> {
        match self {
            Self::ModifyColumn { from, to, .. } => Some(ColumnDelta::between(from, to)),
            _ => None,
        }
    }

    /// Replaces a ModifyTable with its sub-changes; every other change is
    /// returned as is.
    #[must_use]
    pub fn flatten(self) -> Vec<Self> {
        match self {
            Self::ModifyTable { changes, .. } => changes.into_iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }

    /// Returns the change that undoes this one.
    ///
    /// Drop variants carry the dropped definition, so every change has a
    /// structural reverse. Whether running it restores the data is a
    /// separate question answered by [`Change::is_reversible`].
    #[must_use]
    pub fn reverse(&self) -> Self {
        match self.clone() {
            Self::AddTable { table } => Self::DropTable { table },
            Self::DropTable { table } => Self::AddTable { table },
            Self::RenameTable { from, to } => Self::RenameTable { from: to, to: from },
            Self::ModifyTable { table, changes } => Self::ModifyTable {
                table,
                changes: changes.iter().rev().map(Self::reverse).collect(),
            },
            Self::AlterTableOptions { table, from, to } => Self::AlterTableOptions {
                table,
                from: to,
                to: from,
            },
            Self::AddColumn { table, column } => Self::DropColumn { table, column },
            Self::DropColumn { table, column } => Self::AddColumn { table, column },
            Self::RenameColumn { table, from, to } => Self::RenameColumn {
                table,
                from: to,
                to: from,
            },
            Self::ModifyColumn {
                table,
                from,
                to,
                dependent_indexes,
                constrained,
            } => Self::ModifyColumn {
                table,
                from: to,
                to: from,
                dependent_indexes,
                constrained,
            },
            Self::AddIndex { table, index, .. } => Self::DropIndex { table, index },
            Self::DropIndex { table, index } => Self::AddIndex {
                table,
                index,
                concurrently: false,
            },
            Self::ModifyIndex { table, from, to } => Self::ModifyIndex {
                table,
                from: to,
                to: from,
            },
            Self::AddForeignKey { table, foreign_key } => {
                Self::DropForeignKey { table, foreign_key }
            }
            Self::DropForeignKey { table, foreign_key } => {
                Self::AddForeignKey { table, foreign_key }
            }
            Self::AddCheck { table, check } => Self::DropCheck { table, check },
            Self::DropCheck { table, check } => Self::AddCheck { table, check },
            Self::AddUnique { table, unique } => Self::DropUnique { table, unique },
            Self::DropUnique { table, unique } => Self::AddUnique { table, unique },
            Self::ModifyPrimaryKey { table, from, to } => Self::ModifyPrimaryKey {
                table,
                from: to,
                to: from,
            },
            Self::AddEnum { enum_type } => Self::DropEnum { enum_type },
            Self::DropEnum { enum_type } => Self::AddEnum { enum_type },
            Self::ModifyEnum { from, to } => Self::ModifyEnum { from: to, to: from },
            Self::AddSequence { sequence } => Self::DropSequence { sequence },
            Self::DropSequence { sequence } => Self::AddSequence { sequence },
            Self::ModifySequence { from, to } => Self::ModifySequence { from: to, to: from },
        }
    }

    /// Returns true if running [`Change::reverse`] restores the previous
    /// state including data, judging type changes by the built-in lattice.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.is_reversible_with(&TypeLattice::new())
    }

    /// Like [`Change::is_reversible`], with a dialect's type rules.
    ///
    /// A column type change is reversible only when it cannot lose values.
    #[must_use]
    pub fn is_reversible_with(&self, lattice: &TypeLattice) -> bool {
        match self {
            Self::DropTable { .. }
            | Self::DropColumn { .. }
            | Self::DropEnum { .. }
            | Self::DropSequence { .. } => false,
            Self::ModifyColumn { from, to, .. } => lattice
                .classify(from.logical_type(), to.logical_type())
                .is_lossless(),
            Self::ModifyEnum { from, to } => from.values.iter().all(|v| to.values.contains(v)),
            Self::ModifyTable { changes, .. } => {
                changes.iter().all(|c| c.is_reversible_with(lattice))
            }
            _ => true,
        }
    }

    /// Returns a human-readable description of this change.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::AddTable { table } => format!("Create table '{}'", table.name),
            Self::DropTable { table } => format!("Drop table '{}'", table.name),
            Self::RenameTable { from, to } => format!("Rename table '{from}' to '{to}'"),
            Self::ModifyTable { table, changes } => {
                format!("Modify table '{table}' ({} change(s))", changes.len())
            }
            Self::AlterTableOptions { table, .. } => format!("Alter options of table '{table}'"),
            Self::AddColumn { table, column } => {
                format!("Add column '{}' to table '{table}'", column.name)
            }
            Self::DropColumn { table, column } => {
                format!("Drop column '{}' from table '{table}'", column.name)
            }
            Self::RenameColumn { table, from, to } => {
                format!("Rename column '{from}' to '{to}' in table '{table}'")
            }
            Self::ModifyColumn { table, to, .. } => {
                format!("Alter column '{}' in table '{table}'", to.name)
            }
            Self::AddIndex {
                table,
                index,
                concurrently,
            } => {
                let how = if *concurrently { " concurrently" } else { "" };
                format!("Create index '{}'{how} on table '{table}'", index.name)
            }
            Self::DropIndex { table, index } => {
                format!("Drop index '{}' from table '{table}'", index.name)
            }
            Self::ModifyIndex { table, to, .. } => {
                format!("Rebuild index '{}' on table '{table}'", to.name)
            }
            Self::AddForeignKey { table, foreign_key } => format!(
                "Add foreign key '{}' to table '{table}'",
                foreign_key.name
            ),
            Self::DropForeignKey { table, foreign_key } => format!(
                "Drop foreign key '{}' from table '{table}'",
                foreign_key.name
            ),
            Self::AddCheck { table, check } => {
                format!("Add check '{}' to table '{table}'", check.name)
            }
            Self::DropCheck { table, check } => {
                format!("Drop check '{}' from table '{table}'", check.name)
            }
            Self::AddUnique { table, unique } => {
                format!("Add unique constraint '{}' to table '{table}'", unique.name)
            }
            Self::DropUnique { table, unique } => {
                format!("Drop unique constraint '{}' from table '{table}'", unique.name)
            }
            Self::ModifyPrimaryKey { table, to, .. } => match to {
                Some(pk) => format!(
                    "Set primary key of table '{table}' to ({})",
                    pk.columns.join(", ")
                ),
                None => format!("Drop primary key of table '{table}'"),
            },
            Self::AddEnum { enum_type } => format!("Create enum '{}'", enum_type.name),
            Self::DropEnum { enum_type } => format!("Drop enum '{}'", enum_type.name),
            Self::ModifyEnum { to, .. } => format!("Alter enum '{}'", to.name),
            Self::AddSequence { sequence } => format!("Create sequence '{}'", sequence.name),
            Self::DropSequence { sequence } => format!("Drop sequence '{}'", sequence.name),
            Self::ModifySequence { to, .. } => format!("Alter sequence '{}'", to.name),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "bigint"))
            .primary_key(["id"])
    }

    #[test]
    fn test_column_delta() {
        let from = Column::new("age", "int");
        let to = Column::new("age", "bigint").not_null();
        let delta = ColumnDelta::between(&from, &to);
        assert!(delta.column_type);
        assert!(delta.nullable);
        assert!(!delta.default);
        assert!(!delta.is_attribute_only());

        let delta = ColumnDelta::between(&from, &from.clone().default("(0)"));
        assert!(delta.is_attribute_only());
        assert!(ColumnDelta::between(&from, &Column::new("age", "INTEGER")).is_empty());
    }

    #[test]
    fn test_reverse_operations() {
        let op = Change::add_table(users());
        assert_eq!(op.reverse(), Change::drop_table(users()));

        let op = Change::rename_column("users", "name", "full_name");
        assert_eq!(op.reverse(), Change::rename_column("users", "full_name", "name"));

        let op = Change::add_index("users", Index::new("idx_id", ["id"]));
        assert!(matches!(op.reverse(), Change::DropIndex { .. }));
    }

    #[test]
    fn test_reverse_twice_is_identity() {
        let op = Change::modify_column(
            "users",
            Column::new("email", "varchar(100)"),
            Column::new("email", "text").not_null(),
        );
        assert_eq!(op.reverse().reverse(), op);
    }

    #[test]
    fn test_is_reversible() {
        assert!(Change::add_table(users()).is_reversible());
        assert!(!Change::drop_table(users()).is_reversible());
        assert!(!Change::drop_column("users", Column::new("id", "bigint")).is_reversible());
        assert!(Change::drop_index("users", Index::new("idx", ["id"])).is_reversible());

        let shrink = Change::ModifyEnum {
            from: EnumType::new("mood", ["happy", "sad"]),
            to: EnumType::new("mood", ["happy"]),
        };
        assert!(!shrink.is_reversible());
        assert!(shrink.reverse().is_reversible());
    }

    #[test]
    fn test_narrowing_column_is_irreversible() {
        let widen = Change::modify_column(
            "users",
            Column::new("age", "int"),
            Column::new("age", "bigint"),
        );
        assert!(widen.is_reversible());
        assert!(!widen.reverse().is_reversible());

        let lattice = crate::capabilities::DialectCapabilities::sqlite().type_lattice;
        assert!(widen.reverse().is_reversible_with(&lattice));
    }

    #[test]
    fn test_target_and_table() {
        let op = Change::rename_table("people", "users");
        assert_eq!(op.target().to_string(), "users");

        let op = Change::add_column("users", Column::new("email", "text"));
        assert_eq!(op.target().to_string(), "users.email");
        assert_eq!(op.table(), Some("users"));

        let op = Change::ModifyPrimaryKey {
            table: "users".to_string(),
            from: None,
            to: Some(PrimaryKey::new(["id"])),
        };
        assert_eq!(op.target().to_string(), "users.PRIMARY KEY");
    }

    #[test]
    fn test_kind_priority_orders_drops_first() {
        assert!(ChangeKind::DropForeignKey.priority() < ChangeKind::DropTable.priority());
        assert!(ChangeKind::DropTable.priority() < ChangeKind::AddTable.priority());
        assert!(ChangeKind::AddTable.priority() < ChangeKind::AddColumn.priority());
        assert!(ChangeKind::AddIndex.priority() < ChangeKind::AddForeignKey.priority());
    }

    #[test]
    fn test_flatten_modify_table() {
        let op = Change::ModifyTable {
            table: "users".to_string(),
            changes: vec![
                Change::add_column("users", Column::new("a", "int")),
                Change::add_column("users", Column::new("b", "int")),
            ],
        };
        assert_eq!(op.flatten().len(), 2);
    }

    #[test]
    fn test_description() {
        let op = Change::drop_column("users", Column::new("email", "text"));
        assert_eq!(op.description(), "Drop column 'email' from table 'users'");
    }

    #[test]
    fn test_serde_tagged() {
        let op = Change::rename_table("a", "b");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "rename_table");
        let back: Change = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }
}
