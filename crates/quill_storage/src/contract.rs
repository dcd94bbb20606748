//! A single contract's slice of the state: its class hash and nonce slots and
//! its storage trie, materialized on demand from the transaction.

#[cfg(test)]
#[path = "contract_test.rs"]
mod contract_test;

use quill_types::{ClassHash, ContractAddress, Felt, Nonce, StorageEntry, StorageKey};

use crate::db::{DbError, DbTransaction, TransactionKind, RW};
use crate::trie::{open_contract_storage_trie, ContractNodeKey, TriePath};
use crate::{StorageError, StorageResult, Tables};

#[derive(Debug)]
pub(crate) struct Contract<'env, Mode: TransactionKind> {
    txn: &'env DbTransaction<'env, Mode>,
    tables: &'env Tables,
    address: ContractAddress,
}

impl<'env, Mode: TransactionKind> Contract<'env, Mode> {
    /// Binds to a deployed contract. Fails if no contract is deployed at
    /// `address`.
    pub(crate) fn bind(
        txn: &'env DbTransaction<'env, Mode>,
        tables: &'env Tables,
        address: ContractAddress,
    ) -> StorageResult<Self> {
        let contract = Self { txn, tables, address };
        if contract.class_hash_opt()?.is_none() {
            return Err(StorageError::UndeployedContract { address });
        }
        Ok(contract)
    }

    pub(crate) fn address(&self) -> ContractAddress {
        self.address
    }

    pub(crate) fn class_hash(&self) -> StorageResult<ClassHash> {
        self.class_hash_opt()?.ok_or_else(|| StorageError::DBInconsistency {
            msg: format!("Missing class hash of contract {:?}.", self.address),
        })
    }

    fn class_hash_opt(&self) -> StorageResult<Option<ClassHash>> {
        Ok(self.txn.get(&self.tables.contract_class_hashes, &self.address)?)
    }

    // A deployed contract always has a nonce entry; the zero default only
    // covers databases written before the entry existed.
    pub(crate) fn nonce(&self) -> StorageResult<Nonce> {
        Ok(self.txn.get(&self.tables.contract_nonces, &self.address)?.unwrap_or_default())
    }

    pub(crate) fn storage(&self, key: &StorageKey) -> StorageResult<Felt> {
        let trie = open_contract_storage_trie(self.txn, self.tables, self.address)?;
        trie.get(&key.0.to_felt())
    }

    /// The root of the contract's storage trie.
    pub(crate) fn storage_root(&self) -> StorageResult<Felt> {
        let mut trie = open_contract_storage_trie(self.txn, self.tables, self.address)?;
        trie.root()
    }
}

impl<'env> Contract<'env, RW> {
    /// Creates the contract's slots: the class hash, and a nonce explicitly
    /// initialized to zero. Fails if the address is already deployed.
    pub(crate) fn deploy(
        txn: &'env DbTransaction<'env, RW>,
        tables: &'env Tables,
        address: ContractAddress,
        class_hash: ClassHash,
    ) -> StorageResult<Self> {
        txn.insert(&tables.contract_class_hashes, &address, &class_hash).map_err(
            |err| match err {
                DbError::KeyAlreadyExists { .. } => {
                    StorageError::ContractAlreadyDeployed { address }
                }
                _ => err.into(),
            },
        )?;
        txn.upsert(&tables.contract_nonces, &address, &Nonce::default())?;
        Ok(Self { txn, tables, address })
    }

    pub(crate) fn replace_class(&self, class_hash: &ClassHash) -> StorageResult<()> {
        Ok(self.txn.upsert(&self.tables.contract_class_hashes, &self.address, class_hash)?)
    }

    pub(crate) fn update_nonce(&self, nonce: &Nonce) -> StorageResult<()> {
        Ok(self.txn.upsert(&self.tables.contract_nonces, &self.address, nonce)?)
    }

    /// Applies the storage entries in order; a later entry for the same key
    /// overwrites an earlier one, and a zero value deletes the leaf. Returns
    /// the pre-image of every applied entry, in application order.
    pub(crate) fn update_storage(
        &self,
        diff: &[StorageEntry],
    ) -> StorageResult<Vec<(StorageKey, Felt)>> {
        let mut trie = open_contract_storage_trie(self.txn, self.tables, self.address)?;
        let mut previous_values = Vec::with_capacity(diff.len());
        for StorageEntry { key, value } in diff {
            let old_value = trie.put(&key.0.to_felt(), value)?;
            previous_values.push((*key, old_value));
        }
        trie.commit()?;
        Ok(previous_values)
    }

    /// Deletes every key the contract owns: the scalar slots and the whole
    /// storage trie, including its root-key entry.
    pub(crate) fn purge(&self) -> StorageResult<()> {
        self.txn.delete(&self.tables.contract_class_hashes, &self.address)?;
        self.txn.delete(&self.tables.contract_nonces, &self.address)?;
        self.txn.delete(&self.tables.contract_storage_roots, &self.address)?;

        let mut node_keys = Vec::new();
        let mut cursor = self.txn.cursor(&self.tables.contract_storage_nodes)?;
        let mut current = cursor
            .lower_bound(&ContractNodeKey { address: self.address, path: TriePath::default() })?;
        while let Some((node_key, _node)) = current {
            if node_key.address != self.address {
                break;
            }
            node_keys.push(node_key);
            current = cursor.next()?;
        }
        for node_key in &node_keys {
            self.txn.delete(&self.tables.contract_storage_nodes, node_key)?;
        }
        Ok(())
    }
}
