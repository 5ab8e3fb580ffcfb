//! Dialect capability descriptors.
//!
//! The planner never looks up a dialect by name at runtime; callers pass a
//! [`DialectCapabilities`] value into every planning call. Built-in presets
//! cover SQLite, PostgreSQL and MySQL, and custom descriptors deserialize
//! from JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnsupportedChange;
use crate::lattice::TypeLattice;
use crate::schema::DialectFamily;
use crate::types::LogicalType;

/// One structural operation a dialect may or may not support natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `ADD COLUMN ... DEFAULT x` without rewriting the table.
    AddColumnWithDefault,
    /// `DROP COLUMN` while an index still covers the column.
    DropColumnWithIndex,
    /// DDL inside a transaction.
    TransactionalDdl,
    /// Index builds that do not block writes.
    ConcurrentIndexBuild,
    /// `RENAME COLUMN`.
    ColumnRename,
    /// `RENAME TO` for tables.
    TableRename,
    /// In-place column type change.
    AlterColumnType,
    /// In-place nullability and default change.
    AlterColumn,
    /// Adding and dropping constraints on an existing table.
    AlterConstraints,
    /// Named enumerated types.
    Enums,
    /// Sequence objects.
    Sequences,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AddColumnWithDefault => "add_column_with_default",
            Self::DropColumnWithIndex => "drop_column_with_index",
            Self::TransactionalDdl => "transactional_ddl",
            Self::ConcurrentIndexBuild => "concurrent_index_build",
            Self::ColumnRename => "column_rename",
            Self::TableRename => "table_rename",
            Self::AlterColumnType => "alter_column_type",
            Self::AlterColumn => "alter_column",
            Self::AlterConstraints => "alter_constraints",
            Self::Enums => "enums",
            Self::Sequences => "sequences",
        })
    }
}

/// What a target SQL dialect can do natively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct DialectCapabilities {
    /// Dialect family the descriptor applies to.
    pub family: DialectFamily,
    /// Whether `ADD COLUMN` may carry a default.
    pub supports_add_column_with_default: bool,
    /// Whether a column can be dropped while indexes still cover it.
    pub supports_drop_column_with_index: bool,
    /// Whether DDL runs inside transactions.
    pub supports_transactional_ddl: bool,
    /// Whether indexes can be built without blocking writes.
    pub supports_concurrent_index_build: bool,
    /// Whether columns can be renamed in place.
    pub supports_column_rename: bool,
    /// Whether tables can be renamed in place.
    pub supports_table_rename: bool,
    /// Whether a column's type can be changed in place.
    pub supports_alter_column_type: bool,
    /// Whether a column's nullability and default can be changed in place.
    pub supports_alter_column: bool,
    /// Whether constraints can be added to or dropped from existing tables.
    pub supports_alter_constraints: bool,
    /// Whether named enum types exist.
    #[serde(default)]
    pub supports_enums: bool,
    /// Whether sequences exist.
    #[serde(default)]
    pub supports_sequences: bool,
    /// Type-compatibility overrides for this dialect.
    #[serde(default)]
    pub type_lattice: TypeLattice,
}

impl DialectCapabilities {
    /// SQLite: limited `ALTER TABLE`, transactional DDL, one integer class.
    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            family: DialectFamily::Sqlite,
            supports_add_column_with_default: true,
            supports_drop_column_with_index: false,
            supports_transactional_ddl: true,
            supports_concurrent_index_build: false,
            supports_column_rename: true,
            supports_table_rename: true,
            supports_alter_column_type: false,
            supports_alter_column: false,
            supports_alter_constraints: false,
            supports_enums: false,
            supports_sequences: false,
            type_lattice: TypeLattice::new()
                .equivalent(LogicalType::Integer, LogicalType::BigInt)
                .equivalent(LogicalType::SmallInt, LogicalType::Integer)
                .equivalent(LogicalType::SmallInt, LogicalType::BigInt),
        }
    }

    /// PostgreSQL: everything, including concurrent index builds.
    #[must_use]
    pub fn postgres() -> Self {
        Self {
            family: DialectFamily::Postgres,
            supports_add_column_with_default: true,
            supports_drop_column_with_index: true,
            supports_transactional_ddl: true,
            supports_concurrent_index_build: true,
            supports_column_rename: true,
            supports_table_rename: true,
            supports_alter_column_type: true,
            supports_alter_column: true,
            supports_alter_constraints: true,
            supports_enums: true,
            supports_sequences: true,
            type_lattice: TypeLattice::new(),
        }
    }

    /// MySQL: rich `ALTER TABLE` but DDL commits implicitly.
    #[must_use]
    pub fn mysql() -> Self {
        Self {
            family: DialectFamily::Mysql,
            supports_add_column_with_default: true,
            supports_drop_column_with_index: true,
            supports_transactional_ddl: false,
            supports_concurrent_index_build: false,
            supports_column_rename: true,
            supports_table_rename: true,
            supports_alter_column_type: true,
            supports_alter_column: true,
            supports_alter_constraints: true,
            supports_enums: false,
            supports_sequences: false,
            type_lattice: TypeLattice::new(),
        }
    }

    /// Returns the preset for a dialect family.
    #[must_use]
    pub fn for_family(family: DialectFamily) -> Self {
        match family {
            DialectFamily::Sqlite => Self::sqlite(),
            DialectFamily::Postgres => Self::postgres(),
            DialectFamily::Mysql => Self::mysql(),
        }
    }

    /// Sets a single capability.
    #[must_use]
    pub fn with(mut self, capability: Capability, supported: bool) -> Self {
        *self.flag_mut(capability) = supported;
        self
    }

    /// Replaces the type lattice.
    #[must_use]
    pub fn with_type_lattice(mut self, lattice: TypeLattice) -> Self {
        self.type_lattice = lattice;
        self
    }

    /// Returns whether the dialect supports a capability.
    #[must_use]
    pub const fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::AddColumnWithDefault => self.supports_add_column_with_default,
            Capability::DropColumnWithIndex => self.supports_drop_column_with_index,
            Capability::TransactionalDdl => self.supports_transactional_ddl,
            Capability::ConcurrentIndexBuild => self.supports_concurrent_index_build,
            Capability::ColumnRename => self.supports_column_rename,
            Capability::TableRename => self.supports_table_rename,
            Capability::AlterColumnType => self.supports_alter_column_type,
            Capability::AlterColumn => self.supports_alter_column,
            Capability::AlterConstraints => self.supports_alter_constraints,
            Capability::Enums => self.supports_enums,
            Capability::Sequences => self.supports_sequences,
        }
    }

    /// Fails with [`UnsupportedChange::MissingCapability`] if the capability
    /// is absent.
    ///
    /// # Errors
    ///
    /// Returns the missing capability together with the change description.
    pub fn require(
        &self,
        capability: Capability,
        change: impl FnOnce() -> String,
    ) -> std::result::Result<(), UnsupportedChange> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(UnsupportedChange::MissingCapability {
                change: change(),
                capability,
            })
        }
    }

    fn flag_mut(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::AddColumnWithDefault => &mut self.supports_add_column_with_default,
            Capability::DropColumnWithIndex => &mut self.supports_drop_column_with_index,
            Capability::TransactionalDdl => &mut self.supports_transactional_ddl,
            Capability::ConcurrentIndexBuild => &mut self.supports_concurrent_index_build,
            Capability::ColumnRename => &mut self.supports_column_rename,
            Capability::TableRename => &mut self.supports_table_rename,
            Capability::AlterColumnType => &mut self.supports_alter_column_type,
            Capability::AlterColumn => &mut self.supports_alter_column,
            Capability::AlterConstraints => &mut self.supports_alter_constraints,
            Capability::Enums => &mut self.supports_enums,
            Capability::Sequences => &mut self.supports_sequences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Conversion;

    #[test]
    fn test_presets() {
        let sqlite = DialectCapabilities::sqlite();
        assert!(!sqlite.supports(Capability::AlterColumnType));
        assert!(!sqlite.supports(Capability::AlterConstraints));
        assert!(sqlite.supports(Capability::TransactionalDdl));

        let mysql = DialectCapabilities::mysql();
        assert!(!mysql.supports(Capability::TransactionalDdl));

        let pg = DialectCapabilities::for_family(DialectFamily::Postgres);
        assert!(pg.supports(Capability::ConcurrentIndexBuild));
    }

    #[test]
    fn test_sqlite_integers_are_one_class() {
        let sqlite = DialectCapabilities::sqlite();
        assert_eq!(
            sqlite
                .type_lattice
                .classify(&LogicalType::BigInt, &LogicalType::Integer),
            Conversion::Identical
        );
    }

    #[test]
    fn test_with_overrides_single_flag() {
        let caps = DialectCapabilities::postgres().with(Capability::ColumnRename, false);
        assert!(!caps.supports(Capability::ColumnRename));
        assert!(caps.supports(Capability::TableRename));
    }

    #[test]
    fn test_require_names_capability() {
        let err = DialectCapabilities::sqlite()
            .require(Capability::AlterConstraints, || "Add foreign key 'fk'".to_string())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Add foreign key 'fk': dialect does not support alter_constraints"
        );
    }

    #[test]
    fn test_deserialize_custom_descriptor() {
        let json = r#"{
            "family": "postgres",
            "supports_add_column_with_default": true,
            "supports_drop_column_with_index": true,
            "supports_transactional_ddl": true,
            "supports_concurrent_index_build": false,
            "supports_column_rename": false,
            "supports_table_rename": true,
            "supports_alter_column_type": true,
            "supports_alter_column": true,
            "supports_alter_constraints": true
        }"#;
        let caps: DialectCapabilities = serde_json::from_str(json).unwrap();
        assert!(!caps.supports(Capability::ColumnRename));
        assert!(!caps.supports(Capability::Enums));
        assert!(caps.type_lattice.overrides.is_empty());
    }
}
