//! Logical column types.
//!
//! Dialects spell the same type many ways (`int4`, `INTEGER`, `int`), so the
//! schema model keeps the raw spelling for fidelity and compares columns by
//! the parsed [`LogicalType`] instead.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Dialect-independent column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogicalType {
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single precision float.
    Real,
    /// Double precision float.
    Double,
    /// Exact numeric with precision and scale.
    Decimal {
        /// Total number of digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Fixed-length character string.
    Char {
        /// Length in characters.
        length: u32,
    },
    /// Variable-length character string with a limit.
    Varchar {
        /// Maximum length in characters.
        length: u32,
    },
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    Timestamp {
        /// Whether the value carries a time zone.
        with_time_zone: bool,
    },
    /// Fixed-length binary data.
    Binary {
        /// Length in bytes.
        length: u32,
    },
    /// Variable-length binary data with a limit.
    VarBinary {
        /// Maximum length in bytes.
        length: u32,
    },
    /// Unbounded binary data.
    Blob,
    /// JSON document.
    Json,
    /// UUID.
    Uuid,
    /// Named enumerated type declared in the schema.
    Enum {
        /// Name of the enumerated type.
        name: String,
    },
    /// Array of another type.
    Array {
        /// Element type.
        element: Box<LogicalType>,
    },
    /// A type the parser does not know, compared by its normalized spelling.
    Other {
        /// Lowercased spelling.
        name: String,
    },
}

static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z_][a-z0-9_ ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?(?:\s+([a-z][a-z ]*))?$")
        .expect("type pattern is a valid regex")
});

impl LogicalType {
    /// Parses a raw dialect type spelling.
    ///
    /// Unknown spellings become [`LogicalType::Other`] rather than failing,
    /// so introspected schemas with exotic types still diff correctly.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

        if let Some(element) = collapsed.strip_suffix("[]") {
            return Self::Array {
                element: Box::new(Self::parse(element)),
            };
        }

        let Some(caps) = TYPE_RE.captures(&collapsed) else {
            return Self::Other { name: collapsed };
        };

        let base = caps.get(1).map_or("", |m| m.as_str()).trim();
        let trailing = caps.get(4).map_or("", |m| m.as_str()).trim();
        let name = if trailing.is_empty() {
            base.to_string()
        } else {
            format!("{base} {trailing}")
        };
        let first = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        let second = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());

        match name.as_str() {
            "smallint" | "int2" | "tinyint" | "smallserial" | "serial2" => Self::SmallInt,
            "integer" | "int" | "int4" | "mediumint" | "serial" | "serial4" => Self::Integer,
            "bigint" | "int8" | "bigserial" | "serial8" | "int unsigned" | "integer unsigned" => {
                Self::BigInt
            }
            "real" | "float4" => Self::Real,
            "double" | "double precision" | "float8" => Self::Double,
            "float" => match first {
                Some(p) if p <= 24 => Self::Real,
                _ => Self::Double,
            },
            "decimal" | "numeric" | "dec" => Self::Decimal {
                precision: first.unwrap_or(38),
                scale: second.unwrap_or(0),
            },
            "char" | "character" | "nchar" => Self::Char {
                length: first.unwrap_or(1),
            },
            "varchar" | "character varying" | "nvarchar" | "varchar2" => match first {
                Some(length) => Self::Varchar { length },
                None => Self::Text,
            },
            "text" | "tinytext" | "mediumtext" | "longtext" | "clob" | "string" => Self::Text,
            "boolean" | "bool" => Self::Boolean,
            "date" => Self::Date,
            "time" | "time without time zone" => Self::Time,
            "timestamp" | "timestamp without time zone" | "datetime" => Self::Timestamp {
                with_time_zone: false,
            },
            "timestamptz" | "timestamp with time zone" => Self::Timestamp {
                with_time_zone: true,
            },
            "binary" => Self::Binary {
                length: first.unwrap_or(1),
            },
            "varbinary" => match first {
                Some(length) => Self::VarBinary { length },
                None => Self::Blob,
            },
            "blob" | "bytea" | "longblob" | "mediumblob" | "tinyblob" => Self::Blob,
            "json" | "jsonb" => Self::Json,
            "uuid" | "uniqueidentifier" => Self::Uuid,
            _ => Self::Other { name: collapsed },
        }
    }

    /// Returns the decimal digits an integer type can hold without loss.
    #[must_use]
    pub const fn integer_digits(&self) -> Option<u32> {
        match self {
            Self::SmallInt => Some(5),
            Self::Integer => Some(10),
            Self::BigInt => Some(19),
            _ => None,
        }
    }

    /// Returns the bit width of an integer type.
    #[must_use]
    pub const fn integer_bits(&self) -> Option<u32> {
        match self {
            Self::SmallInt => Some(16),
            Self::Integer => Some(32),
            Self::BigInt => Some(64),
            _ => None,
        }
    }

    /// Returns the enumerated type this type refers to, looking through arrays.
    #[must_use]
    pub fn enum_name(&self) -> Option<&str> {
        match self {
            Self::Enum { name } => Some(name),
            Self::Array { element } => element.enum_name(),
            _ => None,
        }
    }

    /// Reads an unknown name as the declared enumerated type of that name,
    /// looking through arrays. Names compare case-insensitively.
    pub fn resolve_enum(&mut self, declared: &[&str]) {
        match self {
            Self::Other { name } => {
                if let Some(found) = declared.iter().find(|d| d.eq_ignore_ascii_case(name)) {
                    *self = Self::Enum {
                        name: (*found).to_string(),
                    };
                }
            }
            Self::Array { element } => element.resolve_enum(declared),
            _ => {}
        }
    }

    /// Returns true for character string types.
    #[must_use]
    pub const fn is_textual(&self) -> bool {
        matches!(self, Self::Char { .. } | Self::Varchar { .. } | Self::Text)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallInt => f.write_str("smallint"),
            Self::Integer => f.write_str("integer"),
            Self::BigInt => f.write_str("bigint"),
            Self::Real => f.write_str("real"),
            Self::Double => f.write_str("double precision"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision}, {scale})"),
            Self::Char { length } => write!(f, "char({length})"),
            Self::Varchar { length } => write!(f, "varchar({length})"),
            Self::Text => f.write_str("text"),
            Self::Boolean => f.write_str("boolean"),
            Self::Date => f.write_str("date"),
            Self::Time => f.write_str("time"),
            Self::Timestamp {
                with_time_zone: false,
            } => f.write_str("timestamp"),
            Self::Timestamp {
                with_time_zone: true,
            } => f.write_str("timestamptz"),
            Self::Binary { length } => write!(f, "binary({length})"),
            Self::VarBinary { length } => write!(f, "varbinary({length})"),
            Self::Blob => f.write_str("blob"),
            Self::Json => f.write_str("json"),
            Self::Uuid => f.write_str("uuid"),
            Self::Enum { name } | Self::Other { name } => f.write_str(name),
            Self::Array { element } => write!(f, "{element}[]"),
        }
    }
}

/// A column's type: the raw dialect spelling plus its logical meaning.
///
/// Equality only looks at the logical type, so `int4` and `INTEGER` are the
/// same column type.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(from = "ColumnTypeRepr")]
pub struct ColumnType {
    /// Spelling as written in the schema definition or reported by the database.
    pub raw: String,
    /// Parsed logical type.
    pub logical: LogicalType,
}

impl ColumnType {
    /// Parses a raw type spelling.
    #[must_use]
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let logical = LogicalType::parse(&raw);
        Self { raw, logical }
    }

    /// A column of the named enumerated type.
    #[must_use]
    pub fn enumeration(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            raw: name.clone(),
            logical: LogicalType::Enum { name },
        }
    }
}

impl PartialEq for ColumnType {
    fn eq(&self, other: &Self) -> bool {
        self.logical == other.logical
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for ColumnType {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Accepted serialized forms: a bare spelling or the full struct.
#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnTypeRepr {
    Raw(String),
    Full { raw: String, logical: LogicalType },
}

impl From<ColumnTypeRepr> for ColumnType {
    fn from(repr: ColumnTypeRepr) -> Self {
        match repr {
            ColumnTypeRepr::Raw(raw) => Self::parse(raw),
            ColumnTypeRepr::Full { raw, logical } => Self { raw, logical },
        }
    }
}
