#![warn(missing_docs)]

//! A storage implementation for a [`StarkNet`] node's state engine.
//!
//! This crate maintains the node's authenticated global state: it applies
//! per-block state diffs, computes the state commitment over two global
//! Merkle-Patricia tries (contracts and declared classes) and per-contract
//! storage tries, keeps history logs that answer point-in-time queries, and
//! supports deterministic rollback of the most recent block. Enables at most
//! one writing operation and multiple reading operations concurrently. The
//! underlying storage is implemented using the [`libmdbx`] crate.
//!
//! # Quick Start
//! To use this crate, open a storage by calling [`open_storage`] to get a
//! [`StorageWriter`] and a [`StorageReader`] and use them to create
//! [`StorageTxn`] instances. The actual functionality is implemented on the
//! transaction in multiple traits.
//!
//! ```
//! use quill_storage::open_storage;
//! use quill_storage::db::DbConfig;
//! use quill_storage::state::StateStorageReader; // Import the state API.
//! use quill_storage::StorageConfig;
//! use quill_types::{ChainId, Felt};
//!
//! # let dir_handle = tempfile::tempdir().unwrap();
//! # let dir = dir_handle.path().to_path_buf();
//! let db_config = DbConfig {
//!     path_prefix: dir,
//!     chain_id: ChainId("SN_MAIN".to_owned()),
//!     min_size: 1 << 20,    // 1MB
//!     max_size: 1 << 35,    // 32GB
//!     growth_step: 1 << 26, // 64MB
//! };
//! # std::fs::create_dir_all(db_config.path()).unwrap();
//! let (reader, _writer) = open_storage(StorageConfig { db_config })?;
//!
//! let state_root = reader.begin_ro_txn()?.state_root()?; // Read the state commitment.
//! assert_eq!(state_root.0, Felt::ZERO); // A fresh storage holds the empty state.
//! # Ok::<(), quill_storage::StorageError>(())
//! ```
//!
//! [`StarkNet`]: https://starknet.io/
//! [`libmdbx`]: https://docs.rs/libmdbx/latest/libmdbx/

mod contract;
pub mod db;
mod history;
mod metadata;
mod serializers;
pub mod state;
mod trie;

#[cfg(any(feature = "testing", test))]
pub mod test_utils;

use std::sync::Arc;

use quill_types::{BlockNumber, ClassHash, ContractAddress, GlobalRoot, Nonce};
use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;

use crate::db::{
    open_env, DbError, DbReader, DbTransaction, DbWriter, TableId, TransactionKind, RO, RW,
};
use crate::history::{ContractLogKey, StorageLogKey};
use crate::metadata::{ensure_layout_version, MetadataKey};
pub use crate::metadata::{LayoutVersion, LAYOUT_VERSION};
use crate::state::data::DeclaredClass;
use crate::trie::{ContractNodeKey, TrieKind, TrieNode, TriePath};

/// Opens a storage and returns a [`StorageReader`] and a [`StorageWriter`].
pub fn open_storage(config: StorageConfig) -> StorageResult<(StorageReader, StorageWriter)> {
    let (db_reader, mut db_writer) = open_env(&config.db_config)?;
    let tables = Arc::new(Tables {
        classes_trie_nodes: db_writer.create_table("classes_trie_nodes")?,
        contract_class_hash_history: db_writer.create_table("contract_class_hash_history")?,
        contract_class_hashes: db_writer.create_table("contract_class_hashes")?,
        contract_deployment_blocks: db_writer.create_table("contract_deployment_blocks")?,
        contract_nonce_history: db_writer.create_table("contract_nonce_history")?,
        contract_nonces: db_writer.create_table("contract_nonces")?,
        contract_storage_history: db_writer.create_table("contract_storage_history")?,
        contract_storage_nodes: db_writer.create_table("contract_storage_nodes")?,
        contract_storage_roots: db_writer.create_table("contract_storage_roots")?,
        contracts_trie_nodes: db_writer.create_table("contracts_trie_nodes")?,
        declared_classes: db_writer.create_table("declared_classes")?,
        metadata: db_writer.create_table("metadata")?,
        trie_roots: db_writer.create_table("trie_roots")?,
    });
    let reader = StorageReader { db_reader, tables: tables.clone() };
    let mut writer = StorageWriter { db_writer, tables };

    ensure_layout_version(&mut writer)?;
    Ok((reader, writer))
}

/// A struct for starting RO transactions ([`StorageTxn`]) to the storage.
#[derive(Clone)]
pub struct StorageReader {
    db_reader: DbReader,
    tables: Arc<Tables>,
}

impl StorageReader {
    /// Takes a snapshot of the current state of the storage and returns a [`StorageTxn`] for
    /// reading data from the storage.
    pub fn begin_ro_txn(&self) -> StorageResult<StorageTxn<'_, RO>> {
        Ok(StorageTxn { txn: self.db_reader.begin_ro_txn()?, tables: self.tables.clone() })
    }
}

/// A struct for starting RW transactions ([`StorageTxn`]) to the storage.
/// There is a single non clonable writer instance, to make sure there is only one write transaction
/// at any given moment.
pub struct StorageWriter {
    db_writer: DbWriter,
    tables: Arc<Tables>,
}

impl StorageWriter {
    /// Takes a snapshot of the current state of the storage and returns a [`StorageTxn`] for
    /// reading and modifying data in the storage.
    pub fn begin_rw_txn(&mut self) -> StorageResult<StorageTxn<'_, RW>> {
        Ok(StorageTxn { txn: self.db_writer.begin_rw_txn()?, tables: self.tables.clone() })
    }
}

/// A struct for interacting with the storage.
/// The actual functionality is implemented on the transaction in multiple traits.
#[derive(Debug)]
pub struct StorageTxn<'env, Mode: TransactionKind> {
    txn: DbTransaction<'env, Mode>,
    tables: Arc<Tables>,
}

impl<'env> StorageTxn<'env, RW> {
    /// Commits the changes made in the transaction to the storage.
    pub fn commit(self) -> StorageResult<()> {
        self.txn.commit()?;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Tables {
    classes_trie_nodes: TableId<TriePath, TrieNode>,
    contract_class_hash_history: TableId<ContractLogKey, ClassHash>,
    contract_class_hashes: TableId<ContractAddress, ClassHash>,
    contract_deployment_blocks: TableId<ContractAddress, BlockNumber>,
    contract_nonce_history: TableId<ContractLogKey, Nonce>,
    contract_nonces: TableId<ContractAddress, Nonce>,
    contract_storage_history: TableId<StorageLogKey, Felt>,
    contract_storage_nodes: TableId<ContractNodeKey, TrieNode>,
    contract_storage_roots: TableId<ContractAddress, TriePath>,
    contracts_trie_nodes: TableId<TriePath, TrieNode>,
    declared_classes: TableId<ClassHash, DeclaredClass>,
    metadata: TableId<MetadataKey, LayoutVersion>,
    trie_roots: TableId<TrieKind, TriePath>,
}

/// Error type for the storage crate.
#[allow(missing_docs)]
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// Errors related to the underlying database.
    #[error(transparent)]
    InnerError(#[from] DbError),
    #[error(
        "Database layout version {found} is not supported; this build operates on layout \
         {supported}."
    )]
    UnsupportedLayoutVersion { found: LayoutVersion, supported: LayoutVersion },
    #[error("State's current root {found:?} does not match the expected root {expected:?}.")]
    MismatchedRoot { expected: GlobalRoot, found: GlobalRoot },
    #[error("Contract {address:?} is already deployed.")]
    ContractAlreadyDeployed { address: ContractAddress },
    #[error("State diff references contract {address:?} which is not deployed.")]
    UndeployedContract { address: ContractAddress },
    #[error("DB in inconsistent state: {msg:?}.")]
    DBInconsistency { msg: String },
}

/// A type alias that maps to std::result::Result<T, StorageError>.
pub type StorageResult<V> = std::result::Result<V, StorageError>;

/// A struct for the configuration of the storage.
#[allow(missing_docs)]
#[derive(Serialize, Debug, Deserialize, Clone, Default, PartialEq)]
pub struct StorageConfig {
    pub db_config: db::DbConfig,
}
