//! Type-compatibility lattice.
//!
//! Classifies a column type change by comparing value domains: a change is
//! widening when every value of the old type is representable in the new
//! one. Dialects can override individual pairs, e.g. SQLite where `integer`
//! and `bigint` share one storage class.

use serde::{Deserialize, Serialize};

use crate::types::LogicalType;

/// How the value domain changes when converting between two types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// Same domain.
    Identical,
    /// The new domain is a superset of the old one.
    Widening,
    /// Some existing values may not fit the new type.
    Narrowing,
    /// No meaningful conversion exists.
    Incompatible,
}

impl Conversion {
    /// Returns true if no existing value can be lost.
    #[must_use]
    pub const fn is_lossless(self) -> bool {
        matches!(self, Self::Identical | Self::Widening)
    }
}

/// An explicit classification for one ordered pair of types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRule {
    /// Source type.
    pub from: LogicalType,
    /// Target type.
    pub to: LogicalType,
    /// Classification of `from -> to`.
    pub conversion: Conversion,
}

/// Built-in compatibility rules plus dialect overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLattice {
    /// Rules consulted before the built-in classification.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<TypeRule>,
}

impl TypeLattice {
    /// Creates a lattice with only the built-in rules.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            overrides: Vec::new(),
        }
    }

    /// Adds an override for `from -> to`.
    #[must_use]
    pub fn rule(mut self, from: LogicalType, to: LogicalType, conversion: Conversion) -> Self {
        self.overrides.retain(|r| r.from != from || r.to != to);
        self.overrides.push(TypeRule {
            from,
            to,
            conversion,
        });
        self
    }

    /// Declares two types interchangeable in both directions.
    #[must_use]
    pub fn equivalent(self, a: LogicalType, b: LogicalType) -> Self {
        self.rule(a.clone(), b.clone(), Conversion::Identical)
            .rule(b, a, Conversion::Identical)
    }

    /// Classifies a change from `from` to `to`.
    #[must_use]
    pub fn classify(&self, from: &LogicalType, to: &LogicalType) -> Conversion {
        if let Some(rule) = self
            .overrides
            .iter()
            .find(|r| &r.from == from && &r.to == to)
        {
            return rule.conversion;
        }
        builtin(from, to)
    }
}

fn by_size(from: u32, to: u32) -> Conversion {
    if to >= from {
        Conversion::Widening
    } else {
        Conversion::Narrowing
    }
}

fn builtin(from: &LogicalType, to: &LogicalType) -> Conversion {
    use LogicalType as T;

    if from == to {
        return Conversion::Identical;
    }

    if let (Some(a), Some(b)) = (from.integer_bits(), to.integer_bits()) {
        return by_size(a, b);
    }

    match (from, to) {
        (
            _,
            T::Decimal {
                precision, scale, ..
            },
        ) if from.integer_digits().is_some() => {
            let digits = from.integer_digits().unwrap_or(u32::MAX);
            by_size(digits, precision.saturating_sub(*scale))
        }
        (
            T::Decimal {
                precision: p1,
                scale: s1,
            },
            T::Decimal {
                precision: p2,
                scale: s2,
            },
        ) => {
            if s2 >= s1 && p2.saturating_sub(*s2) >= p1.saturating_sub(*s1) {
                Conversion::Widening
            } else {
                Conversion::Narrowing
            }
        }
        (T::Real | T::SmallInt | T::Integer, T::Double) | (T::SmallInt, T::Real) => {
            Conversion::Widening
        }
        (
            T::SmallInt | T::Integer | T::BigInt | T::Real | T::Double | T::Decimal { .. },
            T::SmallInt | T::Integer | T::BigInt | T::Real | T::Double | T::Decimal { .. },
        ) => Conversion::Narrowing,

        (T::Char { length: a } | T::Varchar { length: a }, T::Char { length: b } | T::Varchar { length: b }) => {
            by_size(*a, *b)
        }
        (T::Binary { length: a } | T::VarBinary { length: a }, T::Binary { length: b } | T::VarBinary { length: b }) => {
            by_size(*a, *b)
        }
        (T::Binary { .. } | T::VarBinary { .. }, T::Blob) => Conversion::Widening,
        (T::Blob, T::Binary { .. } | T::VarBinary { .. }) => Conversion::Narrowing,

        (T::Date, T::Timestamp { .. })
        | (
            T::Timestamp {
                with_time_zone: false,
            },
            T::Timestamp {
                with_time_zone: true,
            },
        ) => Conversion::Widening,
        (T::Timestamp { .. }, T::Date | T::Timestamp { .. }) => Conversion::Narrowing,

        (T::Array { element: a }, T::Array { element: b }) => builtin(a, b),

        (T::Text, T::Char { .. } | T::Varchar { .. } | T::Json | T::Uuid | T::Enum { .. }) => {
            Conversion::Narrowing
        }
        (T::Enum { .. }, T::Enum { .. }) | (T::Other { .. }, T::Other { .. }) => {
            Conversion::Incompatible
        }
        (T::Binary { .. } | T::VarBinary { .. } | T::Blob, T::Text) => Conversion::Incompatible,
        (_, T::Text) => Conversion::Widening,
        (_, T::Char { .. } | T::Varchar { .. }) => Conversion::Narrowing,
        _ => Conversion::Incompatible,
    }
}
