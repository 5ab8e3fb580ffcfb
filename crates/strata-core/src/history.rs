//! Migration history verification.
//!
//! Each [`MigrationRecord`] stores the hash of its statements at the time it
//! was applied. Verification recomputes that hash and checks the version
//! sequence, without touching the store the records came from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Result, StrataError};

/// Lowercase hex SHA-256 over each statement followed by a newline.
#[must_use]
pub fn content_hash<S: AsRef<str>>(statements: &[S]) -> String {
    let mut hasher = Sha256::new();
    for statement in statements {
        hasher.update(statement.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// An applied migration as read from a history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Monotonic version, e.g. a sequence number or a `YYYYMMDDHHMMSS` stamp.
    pub version: u64,
    /// Migration name.
    #[serde(default)]
    pub description: String,
    /// Statements as persisted.
    pub statements: Vec<String>,
    /// Hash recorded when the migration was applied. Empty if never hashed.
    #[serde(default)]
    pub hash: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Creates a record whose hash matches its statements.
    #[must_use]
    pub fn new(
        version: u64,
        description: impl Into<String>,
        statements: Vec<String>,
        applied_at: DateTime<Utc>,
    ) -> Self {
        let hash = content_hash(&statements);
        Self {
            version,
            description: description.into(),
            statements,
            hash,
            applied_at,
        }
    }

    /// Hash of the statements as they are now.
    #[must_use]
    pub fn computed_hash(&self) -> String {
        content_hash(&self.statements)
    }

    /// Returns true if the recorded hash matches the statements.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.hash == self.computed_hash()
    }
}

/// One checksum over a whole history, plus the per-record hashes it covers.
///
/// Rendered as `h1:<total>` followed by one `<version> h1:<hash>` line per
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySum {
    /// Hash over every record line in order.
    pub total: String,
    /// Version and recorded hash of each record.
    pub entries: Vec<(u64, String)>,
}

impl HistorySum {
    /// Computes the sum over the recorded hashes.
    #[must_use]
    pub fn compute(records: &[MigrationRecord]) -> Self {
        let entries: Vec<(u64, String)> = records.iter().map(|r| (r.version, r.hash.clone())).collect();
        let lines: Vec<String> = entries.iter().map(|(v, h)| format!("{v} h1:{h}")).collect();
        Self {
            total: content_hash(&lines),
            entries,
        }
    }
}

impl fmt::Display for HistorySum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "h1:{}", self.total)?;
        for (version, hash) in &self.entries {
            writeln!(f, "{version} h1:{hash}")?;
        }
        Ok(())
    }
}

/// Options for the history verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Require each version to follow the previous one by exactly one.
    pub require_contiguous: bool,
}

impl VerifyOptions {
    /// Creates default options: gaps allowed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            require_contiguous: false,
        }
    }

    /// Requires contiguous versions.
    #[must_use]
    pub const fn contiguous(mut self) -> Self {
        self.require_contiguous = true;
        self
    }
}

/// Summary of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Number of records checked.
    pub records_checked: usize,
    /// Version of the last record, if any.
    pub last_version: Option<u64>,
}

/// Checks a migration history for drift.
#[derive(Debug, Clone, Default)]
pub struct HistoryVerifier {
    options: VerifyOptions,
}

impl HistoryVerifier {
    /// Creates a verifier with default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            options: VerifyOptions::new(),
        }
    }

    /// Creates a verifier with custom options.
    #[must_use]
    pub const fn with_options(options: VerifyOptions) -> Self {
        Self { options }
    }

    /// Verifies records in the order given.
    ///
    /// # Errors
    ///
    /// Fails at the first record that is out of order, leaves a gap when
    /// contiguous versions are required, or whose hash does not match its
    /// statements.
    pub fn verify(&self, records: &[MigrationRecord]) -> Result<VerifyReport> {
        let mut previous: Option<u64> = None;
        for record in records {
            if let Some(previous) = previous {
                if record.version <= previous {
                    return Err(StrataError::OutOfOrder {
                        previous,
                        version: record.version,
                    });
                }
                if self.options.require_contiguous && record.version != previous + 1 {
                    return Err(StrataError::GapDetected {
                        previous,
                        version: record.version,
                    });
                }
            }

            let computed = record.computed_hash();
            if computed != record.hash {
                warn!(version = record.version, "Migration content drifted from its recorded hash");
                return Err(StrataError::HashMismatch {
                    version: record.version,
                    recorded: record.hash.clone(),
                    computed,
                });
            }
            previous = Some(record.version);
        }

        debug!(records = records.len(), "Migration history verified");
        Ok(VerifyReport {
            records_checked: records.len(),
            last_version: previous,
        })
    }

    /// Verifies records and compares their sum with an expected total.
    ///
    /// # Errors
    ///
    /// Any error of [`HistoryVerifier::verify`], or
    /// [`StrataError::SumMismatch`] if the totals differ.
    pub fn verify_sum(&self, records: &[MigrationRecord], expected: &str) -> Result<HistorySum> {
        self.verify(records)?;
        let sum = HistorySum::compute(records);
        let expected = expected.trim().trim_start_matches("h1:");
        if sum.total != expected {
            return Err(StrataError::SumMismatch {
                expected: expected.to_string(),
                computed: sum.total,
            });
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: u64, sql: &str) -> MigrationRecord {
        MigrationRecord::new(version, format!("m{version}"), vec![sql.to_string()], Utc::now())
    }

    fn history() -> Vec<MigrationRecord> {
        vec![
            record(1, "CREATE TABLE users (id INTEGER PRIMARY KEY)"),
            record(2, "ALTER TABLE users ADD COLUMN email TEXT"),
            record(4, "CREATE INDEX idx_email ON users (email)"),
        ]
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash(&["SELECT 1"]);
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash(&["SELECT 1".to_string()]));
        assert_ne!(a, content_hash(&["SELECT 2"]));
        assert_ne!(content_hash(&["a", "b"]), content_hash(&["ab"]));
    }

    #[test]
    fn test_verify_ok() {
        let report = HistoryVerifier::new().verify(&history()).unwrap();
        assert_eq!(report.records_checked, 3);
        assert_eq!(report.last_version, Some(4));
    }

    #[test]
    fn test_empty_history() {
        let report = HistoryVerifier::new().verify(&[]).unwrap();
        assert_eq!(report.records_checked, 0);
        assert_eq!(report.last_version, None);
    }

    #[test]
    fn test_tampered_record() {
        let mut records = history();
        records[1].statements[0] = "ALTER TABLE users ADD COLUMN phone TEXT".to_string();
        let err = HistoryVerifier::new().verify(&records).unwrap_err();
        assert!(matches!(err, StrataError::HashMismatch { version: 2, .. }));
    }

    #[test]
    fn test_out_of_order() {
        let mut records = history();
        records.swap(0, 1);
        let err = HistoryVerifier::new().verify(&records).unwrap_err();
        assert_eq!(
            err,
            StrataError::OutOfOrder {
                previous: 2,
                version: 1
            }
        );
    }

    #[test]
    fn test_gap_only_when_contiguous() {
        let verifier = HistoryVerifier::with_options(VerifyOptions::new().contiguous());
        let err = verifier.verify(&history()).unwrap_err();
        assert_eq!(
            err,
            StrataError::GapDetected {
                previous: 2,
                version: 4
            }
        );
    }

    #[test]
    fn test_history_sum() {
        let records = history();
        let sum = HistorySum::compute(&records);
        let verifier = HistoryVerifier::new();
        assert!(verifier.verify_sum(&records, &format!("h1:{}", sum.total)).is_ok());

        let rendered = sum.to_string();
        assert!(rendered.starts_with(&format!("h1:{}\n", sum.total)));
        assert_eq!(rendered.lines().count(), 4);

        let err = verifier.verify_sum(&records[..2], &sum.total).unwrap_err();
        assert!(matches!(err, StrataError::SumMismatch { .. }));
    }
}
