//! Schema representation types.
//!
//! A [`Schema`] is an immutable snapshot of one database schema: the current
//! state reported by introspection or the desired state from a declarative
//! definition. The differ and planner only ever read snapshots; objects are
//! referenced by name, never by position.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::expr;
use crate::types::{ColumnType, LogicalType};

/// SQL dialect family a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectFamily {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
    /// MySQL and MariaDB.
    Mysql,
}

impl fmt::Display for DialectFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        })
    }
}

impl std::str::FromStr for DialectFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

/// Generated (computed) column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated {
    /// Generation expression.
    pub expr: String,
    /// Whether the value is stored (as opposed to computed on read).
    #[serde(default)]
    pub stored: bool,
}

/// Schema definition for a column.
///
/// A column's position is its index in [`Table::columns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column allows NULL values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Default value expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Generation expression for computed columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<Generated>,
}

const fn default_nullable() -> bool {
    true
}

impl Column {
    /// Creates a nullable column from a raw type spelling.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: impl Into<ColumnType>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            nullable: true,
            default: None,
            generated: None,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the default value expression.
    #[must_use]
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Makes this a generated column.
    #[must_use]
    pub fn generated(mut self, expr: impl Into<String>, stored: bool) -> Self {
        self.generated = Some(Generated {
            expr: expr.into(),
            stored,
        });
        self
    }

    /// The column's logical type.
    #[must_use]
    pub const fn logical_type(&self) -> &LogicalType {
        &self.column_type.logical
    }

    /// Returns true if both columns have the same structural shape, ignoring
    /// the name: logical type, nullability, default and generation.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.column_type == other.column_type
            && self.nullable == other.nullable
            && expr::same(self.default.as_deref(), other.default.as_deref())
            && match (&self.generated, &other.generated) {
                (None, None) => true,
                (Some(a), Some(b)) => a.stored == b.stored && expr::same(Some(&a.expr), Some(&b.expr)),
                _ => false,
            }
    }
}

/// One element of an index key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPart {
    /// A plain column.
    Column(String),
    /// An expression, e.g. `lower(email)`.
    Expression(String),
}

impl IndexPart {
    /// Returns true if this part reads the named column.
    #[must_use]
    pub fn reads(&self, column: &str) -> bool {
        match self {
            Self::Column(name) => name == column,
            Self::Expression(e) => expr::mentions(e, column),
        }
    }

    fn equivalent(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Column(a), Self::Column(b)) => a == b,
            (Self::Expression(a), Self::Expression(b)) => expr::normalize(a) == expr::normalize(b),
            _ => false,
        }
    }
}

/// Schema definition for an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Ordered key parts.
    pub parts: Vec<IndexPart>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
    /// Partial index condition (WHERE clause).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    /// Access method, e.g. `btree` or `gin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Index {
    /// Creates an index over plain columns.
    #[must_use]
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            parts: columns.into_iter().map(|c| IndexPart::Column(c.into())).collect(),
            unique: false,
            predicate: None,
            method: None,
        }
    }

    /// Appends an expression key part.
    #[must_use]
    pub fn expression(mut self, expr: impl Into<String>) -> Self {
        self.parts.push(IndexPart::Expression(expr.into()));
        self
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the partial index predicate.
    #[must_use]
    pub fn predicate(mut self, expr: impl Into<String>) -> Self {
        self.predicate = Some(expr.into());
        self
    }

    /// Sets the access method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Plain column parts, in key order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            IndexPart::Column(c) => Some(c.as_str()),
            IndexPart::Expression(_) => None,
        })
    }

    /// Returns true if any key part or the predicate reads the named column.
    #[must_use]
    pub fn covers(&self, column: &str) -> bool {
        self.parts.iter().any(|p| p.reads(column))
            || self.predicate.as_deref().is_some_and(|p| expr::mentions(p, column))
    }

    /// Structural equality: normalized expressions, case-insensitive method.
    #[must_use]
    pub fn equivalent(&self, other: &Self) -> bool {
        self.name == other.name
            && self.unique == other.unique
            && self.parts.len() == other.parts.len()
            && self.parts.iter().zip(&other.parts).all(|(a, b)| a.equivalent(b))
            && expr::same(self.predicate.as_deref(), other.predicate.as_deref())
            && self.method.as_deref().map(str::to_ascii_lowercase)
                == other.method.as_deref().map(str::to_ascii_lowercase)
    }
}

/// Schema definition for a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Column(s) in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub ref_table: String,
    /// Referenced column(s).
    pub ref_columns: Vec<String>,
    /// Action on update.
    #[serde(default)]
    pub on_update: ReferentialAction,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ReferentialAction,
}

impl ForeignKey {
    /// Creates a foreign key with `NO ACTION` on update and delete.
    #[must_use]
    pub fn new<S: Into<String>, R: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        ref_table: impl Into<String>,
        ref_columns: impl IntoIterator<Item = R>,
    ) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            ref_table: ref_table.into(),
            ref_columns: ref_columns.into_iter().map(Into::into).collect(),
            on_update: ReferentialAction::NoAction,
            on_delete: ReferentialAction::NoAction,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Schema definition for a check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name.
    pub name: String,
    /// Boolean expression.
    pub expr: String,
}

impl CheckConstraint {
    /// Creates a check constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
        }
    }
}

/// Schema definition for a unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint name.
    pub name: String,
    /// Columns that form the unique constraint.
    pub columns: Vec<String>,
}

impl UniqueConstraint {
    /// Creates a unique constraint.
    #[must_use]
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Primary key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name, if the dialect names primary keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Key columns in order.
    pub columns: Vec<String>,
}

impl PrimaryKey {
    /// Creates an unnamed primary key.
    #[must_use]
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Dialect-specific table metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    /// Table comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Free-form attributes such as storage engine or collation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Complete schema definition for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Primary key, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    /// Index definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    /// Foreign key definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    /// Check constraint definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckConstraint>,
    /// Unique constraint definitions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uniques: Vec<UniqueConstraint>,
    /// Comment and dialect attributes.
    #[serde(default)]
    pub options: TableOptions,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
            uniques: Vec::new(),
            options: TableOptions::default(),
        }
    }

    /// Adds a column to the table.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns. Key columns become NOT NULL.
    #[must_use]
    pub fn primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        let pk = PrimaryKey::new(columns);
        for col in &mut self.columns {
            if pk.columns.contains(&col.name) {
                col.nullable = false;
            }
        }
        self.primary_key = Some(pk);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Adds a check constraint.
    #[must_use]
    pub fn check(mut self, check: CheckConstraint) -> Self {
        self.checks.push(check);
        self
    }

    /// Adds a unique constraint.
    #[must_use]
    pub fn unique(mut self, unique: UniqueConstraint) -> Self {
        self.uniques.push(unique);
        self
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    /// Sets a dialect attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.attributes.insert(key.into(), value.into());
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets a mutable column by name.
    #[must_use]
    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Returns the ordinal position of a column.
    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Returns true if the column is part of the primary key, a unique
    /// constraint, a foreign key or a check constraint.
    #[must_use]
    pub fn is_constrained(&self, column: &str) -> bool {
        let col = column.to_string();
        self.primary_key.as_ref().is_some_and(|pk| pk.columns.contains(&col))
            || self.uniques.iter().any(|u| u.columns.contains(&col))
            || self.foreign_keys.iter().any(|fk| fk.columns.contains(&col))
            || self.checks.iter().any(|c| expr::mentions(&c.expr, column))
    }

    /// Names of every constraint and index on this table.
    fn object_names(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.indexes
            .iter()
            .map(|i| ("index", i.name.as_str()))
            .chain(self.foreign_keys.iter().map(|f| ("foreign key", f.name.as_str())))
            .chain(self.checks.iter().map(|c| ("check", c.name.as_str())))
            .chain(self.uniques.iter().map(|u| ("unique constraint", u.name.as_str())))
            .chain(
                self.primary_key
                    .iter()
                    .filter_map(|pk| pk.name.as_deref().map(|n| ("primary key", n))),
            )
    }
}

/// Named enumerated type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    /// Type name.
    pub name: String,
    /// Allowed values in declaration order.
    pub values: Vec<String>,
}

impl EnumType {
    /// Creates an enumerated type.
    #[must_use]
    pub fn new<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Sequence generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
    /// First value.
    #[serde(default = "default_one")]
    pub start: i64,
    /// Step between values.
    #[serde(default = "default_one")]
    pub increment: i64,
    /// Lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    /// Whether the sequence wraps around at its bound.
    #[serde(default)]
    pub cycle: bool,
}

const fn default_one() -> i64 {
    1
}

impl Sequence {
    /// Creates a sequence starting at 1 with increment 1.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: 1,
            increment: 1,
            min_value: None,
            max_value: None,
            cycle: false,
        }
    }

    /// Sets the start value.
    #[must_use]
    pub const fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    /// Sets the increment.
    #[must_use]
    pub const fn increment(mut self, increment: i64) -> Self {
        self.increment = increment;
        self
    }
}

fn missing_columns<'a>(
    problems: &mut Vec<String>,
    columns: &BTreeSet<&str>,
    table: &str,
    owner: &str,
    referenced: impl IntoIterator<Item = &'a str>,
) {
    for c in referenced {
        if !columns.contains(c) {
            problems.push(format!("{owner} references missing column '{table}.{c}'"));
        }
    }
}

/// A complete schema snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name (e.g. `public`, `main`).
    pub name: String,
    /// Dialect family the snapshot was taken from or is written for.
    pub dialect: DialectFamily,
    /// Tables.
    #[serde(default)]
    pub tables: Vec<Table>,
    /// Enumerated types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumType>,
    /// Sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<Sequence>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>, dialect: DialectFamily) -> Self {
        Self {
            name: name.into(),
            dialect,
            tables: Vec::new(),
            enums: Vec::new(),
            sequences: Vec::new(),
        }
    }

    /// Adds a table to the schema.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds an enumerated type.
    #[must_use]
    pub fn enum_type(mut self, enum_type: EnumType) -> Self {
        self.enums.push(enum_type);
        self
    }

    /// Adds a sequence.
    #[must_use]
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Gets a mutable table by name.
    #[must_use]
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Gets an enumerated type by name.
    #[must_use]
    pub fn get_enum(&self, name: &str) -> Option<&EnumType> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Gets a sequence by name.
    #[must_use]
    pub fn get_sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.name == name)
    }

    /// Returns table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Checks the model invariants, reporting every violation at once.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidSchema`] listing each problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let mut seen = BTreeSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                problems.push(format!("duplicate table '{}'", table.name));
            }
        }
        let mut seen = BTreeSet::new();
        for e in &self.enums {
            if !seen.insert(e.name.as_str()) {
                problems.push(format!("duplicate enum '{}'", e.name));
            }
            let mut values = BTreeSet::new();
            for v in &e.values {
                if !values.insert(v.as_str()) {
                    problems.push(format!("enum '{}' repeats value '{v}'", e.name));
                }
            }
        }
        let mut seen = BTreeSet::new();
        for s in &self.sequences {
            if !seen.insert(s.name.as_str()) {
                problems.push(format!("duplicate sequence '{}'", s.name));
            }
            if s.increment == 0 {
                problems.push(format!("sequence '{}' has a zero increment", s.name));
            }
        }

        for table in &self.tables {
            self.validate_table(table, &mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(StrataError::InvalidSchema(problems))
        }
    }

    fn validate_table(&self, table: &Table, problems: &mut Vec<String>) {
        let t = &table.name;
        let mut columns = BTreeSet::new();
        for col in &table.columns {
            if !columns.insert(col.name.as_str()) {
                problems.push(format!("duplicate column '{t}.{}'", col.name));
            }
            if let Some(name) = col.logical_type().enum_name() {
                if self.get_enum(name).is_none() {
                    problems.push(format!("column '{t}.{}' uses undeclared enum '{name}'", col.name));
                }
            }
        }

        let mut names = BTreeSet::new();
        for (kind, name) in table.object_names() {
            if !names.insert(name) {
                problems.push(format!("duplicate {kind} name '{name}' on table '{t}'"));
            }
        }

        if let Some(pk) = &table.primary_key {
            if pk.columns.is_empty() {
                problems.push(format!("primary key of '{t}' has no columns"));
            }
            missing_columns(
                problems,
                &columns,
                t,
                &format!("primary key of '{t}'"),
                pk.columns.iter().map(String::as_str),
            );
        }
        for idx in &table.indexes {
            if idx.parts.is_empty() {
                problems.push(format!("index '{}' on '{t}' has no key parts", idx.name));
            }
            missing_columns(
                problems,
                &columns,
                t,
                &format!("index '{}'", idx.name),
                idx.columns(),
            );
        }
        for uc in &table.uniques {
            missing_columns(
                problems,
                &columns,
                t,
                &format!("unique constraint '{}'", uc.name),
                uc.columns.iter().map(String::as_str),
            );
        }
        for fk in &table.foreign_keys {
            missing_columns(
                problems,
                &columns,
                t,
                &format!("foreign key '{}'", fk.name),
                fk.columns.iter().map(String::as_str),
            );
        }

        for fk in &table.foreign_keys {
            if fk.columns.is_empty() || fk.columns.len() != fk.ref_columns.len() {
                problems.push(format!(
                    "foreign key '{}' on '{t}' maps {} column(s) to {}",
                    fk.name,
                    fk.columns.len(),
                    fk.ref_columns.len()
                ));
            }
            match self.get_table(&fk.ref_table) {
                None => problems.push(format!(
                    "foreign key '{}' on '{t}' references missing table '{}'",
                    fk.name, fk.ref_table
                )),
                Some(target) => {
                    for rc in &fk.ref_columns {
                        if target.get_column(rc).is_none() {
                            problems.push(format!(
                                "foreign key '{}' on '{t}' references missing column '{}.{rc}'",
                                fk.name, fk.ref_table
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Reads column types that only name a declared enum, such as a bare
    /// `"type": "mood"` in JSON, as references to that enum.
    pub fn resolve_enum_types(&mut self) {
        let declared: Vec<&str> = self.enums.iter().map(|e| e.name.as_str()).collect();
        if declared.is_empty() {
            return;
        }
        for col in self.tables.iter_mut().flat_map(|t| t.columns.iter_mut()) {
            col.column_type.logical.resolve_enum(&declared);
        }
    }

    /// Copy of the schema with [`Schema::resolve_enum_types`] applied.
    #[must_use]
    pub fn with_enum_types_resolved(&self) -> Self {
        let mut schema = self.clone();
        schema.resolve_enum_types();
        schema
    }

    /// Returns a copy with every named collection sorted by name and every
    /// expression normalized. Column order is kept.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut schema = self.with_enum_types_resolved();
        schema.tables.sort_by(|a, b| a.name.cmp(&b.name));
        schema.enums.sort_by(|a, b| a.name.cmp(&b.name));
        schema.sequences.sort_by(|a, b| a.name.cmp(&b.name));
        for table in &mut schema.tables {
            table.indexes.sort_by(|a, b| a.name.cmp(&b.name));
            table.foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));
            table.checks.sort_by(|a, b| a.name.cmp(&b.name));
            table.uniques.sort_by(|a, b| a.name.cmp(&b.name));
            for col in &mut table.columns {
                col.default = col.default.as_deref().map(expr::normalize);
                if let Some(generated) = &mut col.generated {
                    generated.expr = expr::normalize(&generated.expr);
                }
            }
            for check in &mut table.checks {
                check.expr = expr::normalize(&check.expr);
            }
            for idx in &mut table.indexes {
                idx.predicate = idx.predicate.as_deref().map(expr::normalize);
                idx.method = idx.method.as_deref().map(str::to_ascii_lowercase);
                for part in &mut idx.parts {
                    if let IndexPart::Expression(e) = part {
                        *e = expr::normalize(e);
                    }
                }
            }
        }
        schema
    }

    /// Structural equality: same objects and attributes regardless of the
    /// order named collections were declared in or how types are spelled.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}
