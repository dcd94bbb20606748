//! Append-only logs of the pre-images of mutated state.
//!
//! When block `B` mutates a storage slot, nonce or class hash, the value that
//! was in effect during block `B - 1` is recorded under the mutated entity and
//! `B`. The log keys order by entity first and block number last, so a
//! `lower_bound` scan from `(entity, B + 1)` finds the earliest log entry
//! recording a value still in effect at the end of block `B`.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use quill_types::{BlockNumber, ClassHash, ContractAddress, Felt, Nonce, StorageKey};

use crate::db::{DbError, TransactionKind, RW};
use crate::{StorageResult, StorageTxn};

/// Key of a storage-slot pre-image entry. The block number comes last so one
/// slot's entries are contiguous and ordered by block.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StorageLogKey {
    pub address: ContractAddress,
    pub key: StorageKey,
    pub block_number: BlockNumber,
}

/// Key of a nonce or class-hash pre-image entry.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ContractLogKey {
    pub address: ContractAddress,
    pub block_number: BlockNumber,
}

impl<'env, Mode: TransactionKind> StorageTxn<'env, Mode> {
    /// The value of the storage slot at the end of `block_number`, if any
    /// later mutation logged it.
    pub(crate) fn storage_pre_image_at(
        &self,
        address: ContractAddress,
        key: StorageKey,
        block_number: BlockNumber,
    ) -> StorageResult<Option<Felt>> {
        let mut cursor = self.txn.cursor(&self.tables.contract_storage_history)?;
        let from = StorageLogKey { address, key, block_number: block_number.next() };
        match cursor.lower_bound(&from)? {
            Some((entry, value)) if entry.address == address && entry.key == key => {
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    /// The nonce of the contract at the end of `block_number`, if any later
    /// mutation logged it.
    pub(crate) fn nonce_pre_image_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<Option<Nonce>> {
        let mut cursor = self.txn.cursor(&self.tables.contract_nonce_history)?;
        let from = ContractLogKey { address, block_number: block_number.next() };
        match cursor.lower_bound(&from)? {
            Some((entry, nonce)) if entry.address == address => Ok(Some(nonce)),
            _ => Ok(None),
        }
    }

    /// The class hash of the contract at the end of `block_number`, if any
    /// later replacement logged it.
    pub(crate) fn class_hash_pre_image_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<Option<ClassHash>> {
        let mut cursor = self.txn.cursor(&self.tables.contract_class_hash_history)?;
        let from = ContractLogKey { address, block_number: block_number.next() };
        match cursor.lower_bound(&from)? {
            Some((entry, class_hash)) if entry.address == address => Ok(Some(class_hash)),
            _ => Ok(None),
        }
    }
}

impl<'env> StorageTxn<'env, RW> {
    // Log writes keep the first entry per (entity, block): a slot written
    // several times within one block logs only the value it had before the
    // block.
    pub(crate) fn log_contract_storage(
        &self,
        address: ContractAddress,
        key: StorageKey,
        block_number: BlockNumber,
        value: &Felt,
    ) -> StorageResult<()> {
        let entry = StorageLogKey { address, key, block_number };
        match self.txn.insert(&self.tables.contract_storage_history, &entry, value) {
            Err(DbError::KeyAlreadyExists { .. }) => Ok(()),
            res => Ok(res?),
        }
    }

    pub(crate) fn log_contract_nonce(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
        nonce: &Nonce,
    ) -> StorageResult<()> {
        let entry = ContractLogKey { address, block_number };
        match self.txn.insert(&self.tables.contract_nonce_history, &entry, nonce) {
            Err(DbError::KeyAlreadyExists { .. }) => Ok(()),
            res => Ok(res?),
        }
    }

    pub(crate) fn log_contract_class_hash(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
        class_hash: &ClassHash,
    ) -> StorageResult<()> {
        let entry = ContractLogKey { address, block_number };
        match self.txn.insert(&self.tables.contract_class_hash_history, &entry, class_hash) {
            Err(DbError::KeyAlreadyExists { .. }) => Ok(()),
            res => Ok(res?),
        }
    }

    pub(crate) fn delete_contract_storage_log(
        &self,
        address: ContractAddress,
        key: StorageKey,
        block_number: BlockNumber,
    ) -> StorageResult<()> {
        let entry = StorageLogKey { address, key, block_number };
        Ok(self.txn.delete(&self.tables.contract_storage_history, &entry)?)
    }

    pub(crate) fn delete_contract_nonce_log(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<()> {
        let entry = ContractLogKey { address, block_number };
        Ok(self.txn.delete(&self.tables.contract_nonce_history, &entry)?)
    }

    pub(crate) fn delete_contract_class_hash_log(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<()> {
        let entry = ContractLogKey { address, block_number };
        Ok(self.txn.delete(&self.tables.contract_class_hash_history, &entry)?)
    }
}
