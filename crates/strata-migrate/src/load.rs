//! Loading snapshots, capability descriptors and history records from JSON.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use strata_core::capabilities::DialectCapabilities;
use strata_core::history::MigrationRecord;
use strata_core::schema::{DialectFamily, Schema};
use strata_core::StrataError;
use tracing::debug;

use crate::error::{MigrateError, Result};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| MigrateError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Loads a schema snapshot.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid snapshot.
pub fn load_schema(path: &Path) -> Result<Schema> {
    let mut schema: Schema = read_json(path)?;
    schema.resolve_enum_types();
    debug!(
        path = %path.display(),
        dialect = %schema.dialect,
        tables = schema.tables.len(),
        "Loaded schema snapshot"
    );
    Ok(schema)
}

/// Loads a list of migration records in history order.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a JSON array of records.
pub fn load_records(path: &Path) -> Result<Vec<MigrationRecord>> {
    let records: Vec<MigrationRecord> = read_json(path)?;
    debug!(path = %path.display(), records = records.len(), "Loaded migration records");
    Ok(records)
}

/// Loads a custom capability descriptor.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid descriptor.
pub fn load_capabilities(path: &Path) -> Result<DialectCapabilities> {
    read_json(path)
}

/// Picks the capabilities to plan with.
///
/// A descriptor file wins over a dialect name, which wins over the family of
/// the schemas being planned.
///
/// # Errors
///
/// Fails if the descriptor cannot be loaded, or if the chosen capabilities
/// describe a different family than the schemas.
pub fn resolve_capabilities(
    file: Option<&Path>,
    dialect: Option<DialectFamily>,
    family: DialectFamily,
) -> Result<DialectCapabilities> {
    let caps = match (file, dialect) {
        (Some(path), _) => load_capabilities(path)?,
        (None, Some(dialect)) => DialectCapabilities::for_family(dialect),
        (None, None) => DialectCapabilities::for_family(family),
    };
    if caps.family != family {
        return Err(StrataError::IncompatibleSchema {
            current: family,
            desired: caps.family,
        }
        .into());
    }
    debug!(family = %caps.family, custom = file.is_some(), "Resolved dialect capabilities");
    Ok(caps)
}
