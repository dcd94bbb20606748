//! Typed access to the node's libmdbx environment.
//!
//! The state engine keeps all of its tables in one transactional libmdbx
//! environment. A [`TableId`] pairs a table name with the key and value types
//! stored in it, and a [`DbTransaction`] reads and writes whole typed entries;
//! raw bytes never leave this module. Encoding goes through the crate's
//! [`StorageSerde`] codec, which keeps composite keys byte-ordered the way
//! they compare, so cursor range scans walk entries in semantic order.
//!
//! Reads run on snapshot transactions and may be concurrent. The single,
//! non-clonable [`DbWriter`] serializes writers; dropping a write transaction
//! without committing aborts it and leaves no trace.


#[doc(hidden)]
pub mod serialization;

use std::borrow::Cow;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::ops::Range;
use std::path::PathBuf;
use std::result;
use std::sync::Arc;

use libmdbx::{DatabaseFlags, EnvironmentFlags, Geometry, PageSize, WriteFlags, WriteMap};
use quill_types::ChainId;
use serde::{Deserialize, Serialize};

use self::serialization::{StorageSerde, StorageSerdeEx};

// One slot per table in the Tables struct, with a little headroom.
const MAX_TABLES: usize = 16;

// Note that NO_TLS mode is used by default.
type EnvironmentKind = WriteMap;
type Environment = libmdbx::Environment<EnvironmentKind>;

type RawEntry<'txn> = (Cow<'txn, [u8]>, Cow<'txn, [u8]>);

/// The configuration of the database.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DbConfig {
    /// Parent directory of the database. The files of a chain live in a
    /// subdirectory named after its chain id.
    pub path_prefix: PathBuf,
    /// The chain whose state this database holds.
    pub chain_id: ChainId,
    /// The size the database starts at.
    pub min_size: usize,
    /// The size the database may grow to.
    pub max_size: usize,
    /// How much address space is added on each growth.
    pub growth_step: isize,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            path_prefix: PathBuf::from("./data"),
            chain_id: ChainId::default(),
            min_size: 1 << 20,    // 1MB
            max_size: 1 << 40,    // 1TB
            growth_step: 1 << 32, // 4GB
        }
    }
}

impl DbConfig {
    /// The directory holding this chain's database files.
    pub fn path(&self) -> PathBuf {
        self.path_prefix.join(self.chain_id.to_string().as_str())
    }

    fn geometry(&self) -> Geometry<Range<usize>> {
        Geometry {
            size: Some(self.min_size..self.max_size),
            growth_step: Some(self.growth_step),
            page_size: Some(mdbx_page_size(page_size::get())),
            ..Default::default()
        }
    }
}

// mdbx accepts page sizes between 256B and 64KB, powers of two only; start
// from the OS page size and round into that range.
fn mdbx_page_size(os_page_size: usize) -> PageSize {
    let clamped = os_page_size.clamp(256, 1 << 16);
    let rounded_down = 1 << (usize::BITS - 1 - clamped.leading_zeros());
    PageSize::Set(rounded_down)
}

/// An error that can occur when interacting with the database.
#[derive(thiserror::Error, Debug)]
pub enum DbError {
    /// An error raised by the database library.
    #[error(transparent)]
    Inner(#[from] libmdbx::Error),
    /// An insert hit a key that is already present.
    #[error("Key {key} already exists in table {table}.")]
    KeyAlreadyExists {
        /// The table that refused the insert.
        table: &'static str,
        /// The offending key.
        key: String,
    },
    /// A stored buffer failed to decode as the table's value type.
    #[error("Failed to decode a stored value.")]
    Decoding,
    /// A key or value failed to encode.
    #[error("Failed to encode a value.")]
    Encoding,
}

type DbResult<V> = result::Result<V, DbError>;

/// Opens the environment under `config.path()` and hands back the read and
/// write halves.
pub(crate) fn open_env(config: &DbConfig) -> DbResult<(DbReader, DbWriter)> {
    let env = Environment::new()
        .set_geometry(config.geometry())
        .set_max_dbs(MAX_TABLES)
        .set_flags(EnvironmentFlags { no_rdahead: true, liforeclaim: true, ..Default::default() })
        .open(&config.path())?;
    let env = Arc::new(env);
    Ok((DbReader { env: env.clone() }, DbWriter { env }))
}

/// A named table together with the types stored in it. Carries no open
/// resources; transactions resolve the name on each access.
pub(crate) struct TableId<K, V> {
    name: &'static str,
    _marker: PhantomData<(K, V)>,
}

// Not derived: a TableId is a name tag and copies regardless of K and V.
impl<K, V> Clone for TableId<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<K, V> Copy for TableId<K, V> {}

// Not derived: a TableId is a name tag and debug-prints regardless of K and V.
impl<K, V> std::fmt::Debug for TableId<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableId").field("name", &self.name).finish()
    }
}

#[derive(Clone)]
pub(crate) struct DbReader {
    env: Arc<Environment>,
}

pub(crate) struct DbWriter {
    env: Arc<Environment>,
}

impl DbReader {
    pub(crate) fn begin_ro_txn(&self) -> DbResult<DbTransaction<'_, RO>> {
        Ok(DbTransaction { txn: self.env.begin_ro_txn()? })
    }
}

impl DbWriter {
    pub(crate) fn begin_rw_txn(&mut self) -> DbResult<DbTransaction<'_, RW>> {
        Ok(DbTransaction { txn: self.env.begin_rw_txn()? })
    }

    /// Creates the table if it does not exist yet and returns its id.
    pub(crate) fn create_table<K, V>(&mut self, name: &'static str) -> DbResult<TableId<K, V>> {
        let txn = self.env.begin_rw_txn()?;
        txn.create_db(Some(name), DatabaseFlags::empty())?;
        txn.commit()?;
        Ok(TableId { name, _marker: PhantomData })
    }
}

#[doc(hidden)]
// Bridges this module's transaction modes to the library's.
pub trait TransactionKind {
    type Internal: libmdbx::TransactionKind;
}

#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub struct RO {}

#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub struct RW {}

impl TransactionKind for RO {
    type Internal = libmdbx::RO;
}

impl TransactionKind for RW {
    type Internal = libmdbx::RW;
}

#[derive(Debug)]
pub(crate) struct DbTransaction<'env, Mode: TransactionKind> {
    txn: libmdbx::Transaction<'env, Mode::Internal, EnvironmentKind>,
}

impl<'env, Mode: TransactionKind> DbTransaction<'env, Mode> {
    pub(crate) fn get<K: StorageSerde, V: StorageSerde>(
        &self,
        table: &TableId<K, V>,
        key: &K,
    ) -> DbResult<Option<V>> {
        let database = self.txn.open_db(Some(table.name))?;
        let key_bytes = key.serialize()?;
        match self.txn.get::<Cow<'_, [u8]>>(&database, &key_bytes)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(V::deserialize(&bytes).ok_or(DbError::Decoding)?)),
        }
    }

    /// Opens a cursor over the table.
    pub(crate) fn cursor<'txn, K: StorageSerde, V: StorageSerde>(
        &'txn self,
        table: &TableId<K, V>,
    ) -> DbResult<DbCursor<'txn, Mode, K, V>> {
        let database = self.txn.open_db(Some(table.name))?;
        Ok(DbCursor { cursor: self.txn.cursor(&database)?, _marker: PhantomData })
    }
}

impl<'env> DbTransaction<'env, RW> {
    /// Inserts or overwrites the entry.
    pub(crate) fn upsert<K: StorageSerde, V: StorageSerde>(
        &self,
        table: &TableId<K, V>,
        key: &K,
        value: &V,
    ) -> DbResult<()> {
        let key_bytes = key.serialize()?;
        let value_bytes = value.serialize()?;
        let database = self.txn.open_db(Some(table.name))?;
        self.txn.put(&database, key_bytes, value_bytes, WriteFlags::UPSERT)?;
        Ok(())
    }

    /// Inserts the entry; fails if the key is already present.
    pub(crate) fn insert<K: StorageSerde + Debug, V: StorageSerde>(
        &self,
        table: &TableId<K, V>,
        key: &K,
        value: &V,
    ) -> DbResult<()> {
        let key_bytes = key.serialize()?;
        let value_bytes = value.serialize()?;
        let database = self.txn.open_db(Some(table.name))?;
        self.txn.put(&database, key_bytes, value_bytes, WriteFlags::NO_OVERWRITE).map_err(
            |err| match err {
                libmdbx::Error::KeyExist => {
                    DbError::KeyAlreadyExists { table: table.name, key: format!("{key:?}") }
                }
                _ => err.into(),
            },
        )?;
        Ok(())
    }

    /// Deletes the entry; deleting an absent key is a no-op.
    pub(crate) fn delete<K: StorageSerde, V>(
        &self,
        table: &TableId<K, V>,
        key: &K,
    ) -> DbResult<()> {
        let key_bytes = key.serialize()?;
        let database = self.txn.open_db(Some(table.name))?;
        self.txn.del(&database, key_bytes, None)?;
        Ok(())
    }

    pub(crate) fn commit(self) -> DbResult<()> {
        self.txn.commit()?;
        Ok(())
    }
}

/// A typed cursor over one table.
pub(crate) struct DbCursor<'txn, Mode: TransactionKind, K, V> {
    cursor: libmdbx::Cursor<'txn, Mode::Internal>,
    _marker: PhantomData<(K, V)>,
}

impl<'txn, Mode: TransactionKind, K: StorageSerde, V: StorageSerde> DbCursor<'txn, Mode, K, V> {
    /// Positions at the first entry whose key is greater than or equal to the
    /// given one.
    pub(crate) fn lower_bound(&mut self, key: &K) -> DbResult<Option<(K, V)>> {
        let key_bytes = key.serialize()?;
        decode_entry(self.cursor.set_range::<Cow<'_, [u8]>, Cow<'_, [u8]>>(&key_bytes)?)
    }

    pub(crate) fn next(&mut self) -> DbResult<Option<(K, V)>> {
        decode_entry(self.cursor.next::<Cow<'_, [u8]>, Cow<'_, [u8]>>()?)
    }

    #[allow(dead_code)]
    pub(crate) fn prev(&mut self) -> DbResult<Option<(K, V)>> {
        decode_entry(self.cursor.prev::<Cow<'_, [u8]>, Cow<'_, [u8]>>()?)
    }
}

fn decode_entry<K: StorageSerde, V: StorageSerde>(
    raw: Option<RawEntry<'_>>,
) -> DbResult<Option<(K, V)>> {
    let Some((key_bytes, value_bytes)) = raw else {
        return Ok(None);
    };
    let key = K::deserialize(&key_bytes).ok_or(DbError::Decoding)?;
    let value = V::deserialize(&value_bytes).ok_or(DbError::Decoding)?;
    Ok(Some((key, value)))
}
