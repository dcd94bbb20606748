//! The storage's description of itself.
//!
//! A single metadata table records which layout version wrote the database.
//! Table encodings are only stable within one layout, so the engine refuses
//! to operate on a database written by any other version.

#[cfg(test)]
#[path = "metadata_test.rs"]
mod metadata_test;

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{StorageError, StorageResult, StorageWriter};

/// The version of the storage layout that wrote a database.
///
/// Bumped whenever a table is added or removed or an encoding changes; an
/// existing database then requires a migration before this build can use it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct LayoutVersion(pub u32);

/// The storage layout this build of the crate reads and writes.
pub const LAYOUT_VERSION: LayoutVersion = LayoutVersion(0);

impl Display for LayoutVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Keys of the metadata table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MetadataKey {
    LayoutVersion,
}

// Checks the database's layout version, stamping a fresh database with the
// current one. Runs once per open, before anything else touches the tables.
pub(crate) fn ensure_layout_version(writer: &mut StorageWriter) -> StorageResult<()> {
    let txn = writer.begin_rw_txn()?;
    match txn.txn.get(&txn.tables.metadata, &MetadataKey::LayoutVersion)? {
        Some(LAYOUT_VERSION) => Ok(()),
        Some(found) => {
            Err(StorageError::UnsupportedLayoutVersion { found, supported: LAYOUT_VERSION })
        }
        None => {
            debug!("Stamping a fresh database with layout version {LAYOUT_VERSION}.");
            txn.txn.insert(&txn.tables.metadata, &MetadataKey::LayoutVersion, &LAYOUT_VERSION)?;
            txn.commit()
        }
    }
}
