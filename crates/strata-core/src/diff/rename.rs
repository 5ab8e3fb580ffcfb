//! Rename detection.
//!
//! Explicit [`RenameHints`] always win. Heuristic detection pairs each
//! dropped object with an added one through a [`RenameScorer`]; a pair is
//! only accepted when each side is the other's unique best match.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{Column, Table};
use crate::types::LogicalType;

/// Scores below this are treated as equal.
const SCORE_EPSILON: f64 = 1e-9;

/// Computes the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev = (0..=b.len()).collect::<Vec<_>>();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Normalized name similarity in `0.0..=1.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_ascii_lowercase();
    let b = b.to_ascii_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(&a, &b) as f64 / max_len as f64)
}

/// Scores how likely a dropped object was renamed to an added one.
///
/// Returning `None` rules the pair out. Scores are compared against
/// [`crate::diff::DiffOptions::rename_threshold`].
pub trait RenameScorer: fmt::Debug + Send + Sync {
    /// Scores a dropped column against an added column of the same table.
    fn score_columns(&self, dropped: &Column, added: &Column) -> Option<f64>;

    /// Scores a dropped table against an added table.
    fn score_tables(&self, dropped: &Table, added: &Table) -> Option<f64>;
}

/// Sorted (column name, logical type) pairs of a table.
fn table_shape(table: &Table) -> Vec<(&str, &LogicalType)> {
    let mut columns: Vec<_> = table
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.logical_type()))
        .collect();
    columns.sort();
    columns
}

/// Default scorer: structural shape must match, names break ties.
///
/// Columns need the same type, nullability, default and generation and
/// score `0.5 + 0.5 * name similarity`. Tables need the same set of
/// (column name, logical type) pairs and score `0.7 + 0.3 * name
/// similarity`, so identical tables clear the default threshold regardless
/// of how different their names are.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeScorer;

impl RenameScorer for ShapeScorer {
    fn score_columns(&self, dropped: &Column, added: &Column) -> Option<f64> {
        dropped
            .same_shape(added)
            .then(|| 0.5 + 0.5 * name_similarity(&dropped.name, &added.name))
    }

    fn score_tables(&self, dropped: &Table, added: &Table) -> Option<f64> {
        (!dropped.columns.is_empty() && table_shape(dropped) == table_shape(added))
            .then(|| 0.7 + 0.3 * name_similarity(&dropped.name, &added.name))
    }
}

/// Caller-supplied renames.
///
/// Column hints are keyed by the table's name in the desired schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameHints {
    /// Table renames, old name to new name.
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
    /// Column renames per desired table, old name to new name.
    #[serde(default)]
    pub columns: BTreeMap<String, BTreeMap<String, String>>,
}

impl RenameHints {
    /// Creates empty hints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table rename.
    #[must_use]
    pub fn table(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.tables.insert(from.into(), to.into());
        self
    }

    /// Declares a column rename within a table, named as in the desired schema.
    #[must_use]
    pub fn column(
        mut self,
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.columns
            .entry(table.into())
            .or_default()
            .insert(from.into(), to.into());
        self
    }

    /// Returns true if no hint is given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.values().all(BTreeMap::is_empty)
    }
}

/// Where an ambiguous rename was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum RenameScope {
    /// Between tables.
    Table,
    /// Between columns of one table.
    Column {
        /// Table name in the desired schema.
        table: String,
    },
}

impl fmt::Display for RenameScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => f.write_str("table"),
            Self::Column { table } => write!(f, "column of '{table}'"),
        }
    }
}

/// A rename the differ refused to guess; it surfaces as Drop+Add instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousRename {
    /// Where the candidates were found.
    pub scope: RenameScope,
    /// Name of the dropped object.
    pub dropped: String,
    /// Equally likely new names, sorted.
    pub candidates: Vec<String>,
    /// The tied score.
    pub score: f64,
}

/// Outcome of pairing dropped names with added names.
#[derive(Debug, Default)]
pub(crate) struct Matching {
    pub renames: Vec<(String, String)>,
    pub ambiguous: Vec<(String, Vec<String>, f64)>,
}

fn top(scores: impl Iterator<Item = (usize, f64)> + Clone) -> (f64, Vec<usize>) {
    let best = scores.clone().map(|(_, s)| s).fold(f64::NEG_INFINITY, f64::max);
    let tied = scores
        .filter(|(_, s)| (best - s).abs() < SCORE_EPSILON)
        .map(|(i, _)| i)
        .collect();
    (best, tied)
}

/// Pairs dropped with added names by mutual unique best score.
///
/// Inputs must be sorted so the output is deterministic.
pub(crate) fn resolve(
    dropped: &[&str],
    added: &[&str],
    threshold: f64,
    score: impl Fn(&str, &str) -> Option<f64>,
) -> Matching {
    let mut matching = Matching::default();
    if dropped.is_empty() || added.is_empty() {
        return matching;
    }

    let scores: Vec<Vec<Option<f64>>> = dropped
        .iter()
        .map(|d| {
            added
                .iter()
                .map(|a| score(d, a).filter(|s| *s >= threshold))
                .collect()
        })
        .collect();

    for (i, d) in dropped.iter().enumerate() {
        let (best, tied) = top(
            scores[i]
                .iter()
                .enumerate()
                .filter_map(|(j, s)| s.map(|s| (j, s))),
        );
        let Some(&j) = tied.first() else {
            continue;
        };
        let (_, rivals) = top(
            scores
                .iter()
                .enumerate()
                .filter_map(move |(k, r)| r[j].map(|s| (k, s))),
        );
        if tied.len() == 1 && rivals == [i] {
            matching.renames.push(((*d).to_string(), added[j].to_string()));
        } else if tied.len() > 1 || rivals.contains(&i) {
            let candidates = tied.iter().map(|&j| added[j].to_string()).collect();
            matching.ambiguous.push(((*d).to_string(), candidates, best));
        }
    }
    matching
}
