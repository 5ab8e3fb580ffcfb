//! Error types for diffing, planning and history verification.
//!
//! Every public entry point fails atomically: when one of these errors is
//! returned, nothing usable was produced.

use crate::capabilities::Capability;
use crate::schema::DialectFamily;

/// Errors raised by the differ, planner, schema mutator and history verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrataError {
    /// A schema snapshot violates the model invariants.
    #[error("Invalid schema:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    InvalidSchema(Vec<String>),

    /// The two snapshots belong to different dialect families.
    #[error("Cannot compare a {current} schema with a {desired} schema")]
    IncompatibleSchema {
        /// Dialect family of the current snapshot.
        current: DialectFamily,
        /// Dialect family of the desired snapshot.
        desired: DialectFamily,
    },

    /// A change cannot be expressed for the target dialect.
    #[error(transparent)]
    UnsupportedChange(#[from] UnsupportedChange),

    /// A caller-supplied rename hint names an object that does not exist.
    #[error("Invalid rename hint '{from}' -> '{to}': {reason}")]
    InvalidRenameHint {
        /// Old name given by the hint.
        from: String,
        /// New name given by the hint.
        to: String,
        /// Why the hint was rejected.
        reason: String,
    },

    /// The change graph contains a cycle the planner cannot break.
    #[error("Circular dependency between changes: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    /// A change was applied to a schema state where its precondition fails.
    #[error("Invalid schema state: {0}")]
    InvalidState(String),

    /// A migration record's stored hash does not match its statements.
    #[error("Hash mismatch for migration {version}: recorded {recorded}, computed {computed}")]
    HashMismatch {
        /// Version of the offending record.
        version: u64,
        /// Hash stored with the record.
        recorded: String,
        /// Hash recomputed from the record's statements.
        computed: String,
    },

    /// The checksum over the whole history does not match.
    #[error("History checksum mismatch: expected {expected}, computed {computed}")]
    SumMismatch {
        /// Checksum supplied by the caller.
        expected: String,
        /// Checksum recomputed from the records.
        computed: String,
    },

    /// Record versions are not strictly increasing.
    #[error("Migration {version} is out of order: it follows {previous}")]
    OutOfOrder {
        /// Version of the preceding record.
        previous: u64,
        /// Version of the offending record.
        version: u64,
    },

    /// Contiguous sequencing is required and a version is missing.
    #[error("Gap in migration history: {version} follows {previous}")]
    GapDetected {
        /// Version of the preceding record.
        previous: u64,
        /// Version of the offending record.
        version: u64,
    },
}

/// Reasons a change cannot be planned for the target dialect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedChange {
    /// The dialect lacks a capability and no rewrite exists.
    #[error("{change}: dialect does not support {capability}")]
    MissingCapability {
        /// Description of the change.
        change: String,
        /// The capability that is missing.
        capability: Capability,
    },

    /// Several rename candidates scored equally; the differ refuses to guess.
    #[error("Ambiguous rename of {scope} '{dropped}': candidates {}", .candidates.join(", "))]
    AmbiguousRename {
        /// What kind of object was renamed ("table" or "column of <table>").
        scope: String,
        /// Name of the object that disappeared.
        dropped: String,
        /// Names of the equally likely replacements.
        candidates: Vec<String>,
    },
}

/// Result type for strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;
