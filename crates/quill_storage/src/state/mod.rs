//! Interface for applying and reverting per-block state diffs and for reading
//! the authenticated global state.
//!
//! The global state commitment is
//! `Poseidon("STARKNET_STATE_V0", contracts_root, classes_root)`, falling back
//! to the bare contracts root while the classes trie is empty. The contracts
//! trie maps a contract address to
//! `Pedersen(Pedersen(Pedersen(class_hash, storage_root), nonce), 0)`; the
//! classes trie maps a Cairo 1 class hash to
//! `Poseidon("CONTRACT_CLASS_LEAF_V0", compiled_class_hash)`.
//!
//! Import [`StateStorageReader`] and [`StateStorageWriter`] to read and modify
//! state using a [`StorageTxn`]. Applying or reverting a state update never
//! commits the transaction; the caller owns commit and rollback. Both
//! operations verify the global root before and after themselves and fail
//! with [`StorageError::MismatchedRoot`] on any disagreement, leaving the
//! not-yet-committed transaction to be dropped.

pub mod data;

use std::collections::HashSet;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use quill_types::{
    BlockNumber, ClassHash, ContractAddress, ContractClass, DeclaredV1Class, Felt, GlobalRoot,
    Nonce, ReplacedClass, StateDiff, StateUpdate, StorageEntry, StorageKey,
};
use starknet_types_core::hash::{Pedersen, Poseidon, StarkHash};
use tracing::debug;

use crate::contract::Contract;
use crate::db::{DbTransaction, TransactionKind, RW};
use crate::state::data::DeclaredClass;
use crate::trie::{
    open_classes_trie, open_contract_storage_trie, open_contracts_trie, ContractsTrie,
};
use crate::{StorageError, StorageResult, StorageTxn, Tables};

lazy_static! {
    // The ASCII bytes of the version tags, read as field elements.
    static ref STATE_VERSION: Felt = Felt::from_bytes_be_slice(b"STARKNET_STATE_V0");
    static ref CONTRACT_CLASS_LEAF_VERSION: Felt =
        Felt::from_bytes_be_slice(b"CONTRACT_CLASS_LEAF_V0");
}

/// Interface for reading the current and historical global state.
///
/// The historical readers answer as of the end of the given block, and answer
/// `None` for blocks before the contract was deployed. They may run
/// concurrently with each other on one transaction, but not with a writer.
pub trait StateStorageReader {
    /// Returns the global state commitment; zero for an empty state.
    fn state_root(&self) -> StorageResult<GlobalRoot>;
    /// Returns the declared class and its declaration block.
    fn get_class(&self, class_hash: &ClassHash) -> StorageResult<Option<DeclaredClass>>;
    /// Returns the class hash a deployed contract currently instantiates.
    fn get_contract_class_hash(
        &self,
        address: ContractAddress,
    ) -> StorageResult<Option<ClassHash>>;
    /// Returns the current nonce of a deployed contract.
    fn get_contract_nonce(&self, address: ContractAddress) -> StorageResult<Option<Nonce>>;
    /// Returns the current value of a storage slot of a deployed contract;
    /// zero if the slot was never written.
    fn get_contract_storage(
        &self,
        address: ContractAddress,
        key: StorageKey,
    ) -> StorageResult<Option<Felt>>;
    /// Returns the class hash the contract instantiated at the end of the
    /// given block.
    fn get_contract_class_hash_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<Option<ClassHash>>;
    /// Returns the nonce of the contract at the end of the given block.
    fn get_contract_nonce_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<Option<Nonce>>;
    /// Returns the value of the storage slot at the end of the given block.
    fn get_contract_storage_at(
        &self,
        address: ContractAddress,
        key: StorageKey,
        block_number: BlockNumber,
    ) -> StorageResult<Option<Felt>>;
    /// Whether the contract was already deployed at the end of the given
    /// block.
    fn is_contract_deployed_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<bool>;
}

/// Interface for applying and reverting state updates.
pub trait StateStorageWriter
where
    Self: Sized,
{
    // To enforce that no commit happen after a failure, we consume and return Self on success.
    /// Applies the state diff of `block_number`, registering `declared_classes`
    /// in the class store, and advances the global root from
    /// `state_update.old_root` to `state_update.new_root`.
    fn append_state_update(
        self,
        block_number: BlockNumber,
        state_update: &StateUpdate,
        declared_classes: &IndexMap<ClassHash, ContractClass>,
    ) -> StorageResult<Self>;

    /// Undoes the state diff of `block_number`, the most recently applied
    /// block, restoring the global root to `state_update.old_root`.
    fn revert_state_update(
        self,
        block_number: BlockNumber,
        state_update: &StateUpdate,
    ) -> StorageResult<Self>;
}

impl<'env, Mode: TransactionKind> StateStorageReader for StorageTxn<'env, Mode> {
    fn state_root(&self) -> StorageResult<GlobalRoot> {
        let mut contracts_trie = open_contracts_trie(&self.txn, &self.tables)?;
        let contracts_root = contracts_trie.root()?;
        let mut classes_trie = open_classes_trie(&self.txn, &self.tables)?;
        let classes_root = classes_trie.root()?;
        if classes_root == Felt::ZERO {
            return Ok(GlobalRoot(contracts_root));
        }
        Ok(GlobalRoot(Poseidon::hash_array(&[*STATE_VERSION, contracts_root, classes_root])))
    }

    fn get_class(&self, class_hash: &ClassHash) -> StorageResult<Option<DeclaredClass>> {
        Ok(self.txn.get(&self.tables.declared_classes, class_hash)?)
    }

    fn get_contract_class_hash(
        &self,
        address: ContractAddress,
    ) -> StorageResult<Option<ClassHash>> {
        Ok(self.txn.get(&self.tables.contract_class_hashes, &address)?)
    }

    fn get_contract_nonce(&self, address: ContractAddress) -> StorageResult<Option<Nonce>> {
        let Some(contract) = bind_deployed(&self.txn, &self.tables, address)? else {
            return Ok(None);
        };
        Ok(Some(contract.nonce()?))
    }

    fn get_contract_storage(
        &self,
        address: ContractAddress,
        key: StorageKey,
    ) -> StorageResult<Option<Felt>> {
        let Some(contract) = bind_deployed(&self.txn, &self.tables, address)? else {
            return Ok(None);
        };
        Ok(Some(contract.storage(&key)?))
    }

    fn get_contract_class_hash_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<Option<ClassHash>> {
        if !self.is_contract_deployed_at(address, block_number)? {
            return Ok(None);
        }
        if let Some(class_hash) = self.class_hash_pre_image_at(address, block_number)? {
            return Ok(Some(class_hash));
        }
        self.get_contract_class_hash(address)
    }

    fn get_contract_nonce_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<Option<Nonce>> {
        if !self.is_contract_deployed_at(address, block_number)? {
            return Ok(None);
        }
        if let Some(nonce) = self.nonce_pre_image_at(address, block_number)? {
            return Ok(Some(nonce));
        }
        self.get_contract_nonce(address)
    }

    fn get_contract_storage_at(
        &self,
        address: ContractAddress,
        key: StorageKey,
        block_number: BlockNumber,
    ) -> StorageResult<Option<Felt>> {
        if !self.is_contract_deployed_at(address, block_number)? {
            return Ok(None);
        }
        if let Some(value) = self.storage_pre_image_at(address, key, block_number)? {
            return Ok(Some(value));
        }
        self.get_contract_storage(address, key)
    }

    fn is_contract_deployed_at(
        &self,
        address: ContractAddress,
        block_number: BlockNumber,
    ) -> StorageResult<bool> {
        Ok(self
            .txn
            .get(&self.tables.contract_deployment_blocks, &address)?
            .map(|deployed_at| deployed_at <= block_number)
            .unwrap_or(false))
    }
}

impl<'env> StateStorageWriter for StorageTxn<'env, RW> {
    fn append_state_update(
        self,
        block_number: BlockNumber,
        state_update: &StateUpdate,
        declared_classes: &IndexMap<ClassHash, ContractClass>,
    ) -> StorageResult<Self> {
        debug!("Applying state update of block {block_number}.");
        self.verify_state_root(state_update.old_root)?;

        for (class_hash, contract_class) in declared_classes {
            self.put_class(*class_hash, contract_class, block_number)?;
        }
        self.update_classes_trie(&state_update.state_diff.declared_v1_classes, false)?;

        {
            let mut contracts_trie = open_contracts_trie(&self.txn, &self.tables)?;
            for deployed in &state_update.state_diff.deployed_contracts {
                self.deploy_contract(
                    &mut contracts_trie,
                    deployed.address,
                    deployed.class_hash,
                    block_number,
                )?;
            }
            self.update_contracts(
                &mut contracts_trie,
                block_number,
                &state_update.state_diff,
                true,
            )?;
            contracts_trie.commit()?;
        }

        self.verify_state_root(state_update.new_root)?;
        Ok(self)
    }

    fn revert_state_update(
        self,
        block_number: BlockNumber,
        state_update: &StateUpdate,
    ) -> StorageResult<Self> {
        debug!("Reverting state update of block {block_number}.");
        self.verify_state_root(state_update.new_root)?;

        self.remove_declared_classes(block_number, &state_update.state_diff)?;
        self.update_classes_trie(&state_update.state_diff.declared_v1_classes, true)?;

        let reverse_diff = self.build_reverse_diff(block_number, &state_update.state_diff)?;
        {
            let mut contracts_trie = open_contracts_trie(&self.txn, &self.tables)?;
            self.update_contracts(&mut contracts_trie, block_number, &reverse_diff, false)?;
            for deployed in &state_update.state_diff.deployed_contracts {
                self.purge_contract(&mut contracts_trie, deployed.address)?;
            }
            contracts_trie.commit()?;
        }

        self.verify_state_root(state_update.old_root)?;
        Ok(self)
    }
}

impl<'env> StorageTxn<'env, RW> {
    fn verify_state_root(&self, expected: GlobalRoot) -> StorageResult<()> {
        let found = self.state_root()?;
        if found != expected {
            return Err(StorageError::MismatchedRoot { expected, found });
        }
        Ok(())
    }

    // First writer wins: re-declaring a class leaves the original entry, and
    // its declaration block, untouched.
    fn put_class(
        &self,
        class_hash: ClassHash,
        contract_class: &ContractClass,
        block_number: BlockNumber,
    ) -> StorageResult<()> {
        if self.txn.get(&self.tables.declared_classes, &class_hash)?.is_some() {
            return Ok(());
        }
        let declared = DeclaredClass {
            declared_at: block_number,
            contract_class: contract_class.clone(),
        };
        Ok(self.txn.insert(&self.tables.declared_classes, &class_hash, &declared)?)
    }

    // Only Cairo 1 declarations touch the classes trie; on revert their leaves
    // are zeroed out again.
    fn update_classes_trie(
        &self,
        declared_v1_classes: &[DeclaredV1Class],
        revert: bool,
    ) -> StorageResult<()> {
        let mut classes_trie = open_classes_trie(&self.txn, &self.tables)?;
        for declared in declared_v1_classes {
            let leaf_value = if revert {
                Felt::ZERO
            } else {
                Poseidon::hash(&CONTRACT_CLASS_LEAF_VERSION, &declared.compiled_class_hash.0)
            };
            classes_trie.put(&declared.class_hash.0, &leaf_value)?;
        }
        classes_trie.commit()
    }

    fn deploy_contract(
        &self,
        contracts_trie: &mut ContractsTrie<'_, RW>,
        address: ContractAddress,
        class_hash: ClassHash,
        block_number: BlockNumber,
    ) -> StorageResult<()> {
        let contract = Contract::deploy(&self.txn, &self.tables, address, class_hash)?;
        self.txn.insert(&self.tables.contract_deployment_blocks, &address, &block_number)?;
        self.update_contract_commitment(contracts_trie, &contract)
    }

    // Replacements, then nonces, then storage writes; deployments were handled
    // before this point.
    fn update_contracts(
        &self,
        contracts_trie: &mut ContractsTrie<'_, RW>,
        block_number: BlockNumber,
        diff: &StateDiff,
        log_changes: bool,
    ) -> StorageResult<()> {
        for replaced in &diff.replaced_classes {
            let contract = Contract::bind(&self.txn, &self.tables, replaced.address)?;
            let old_class_hash = contract.class_hash()?;
            contract.replace_class(&replaced.class_hash)?;
            self.update_contract_commitment(contracts_trie, &contract)?;
            if log_changes {
                self.log_contract_class_hash(replaced.address, block_number, &old_class_hash)?;
            }
        }

        for (address, nonce) in &diff.nonces {
            let contract = Contract::bind(&self.txn, &self.tables, *address)?;
            let old_nonce = contract.nonce()?;
            contract.update_nonce(nonce)?;
            self.update_contract_commitment(contracts_trie, &contract)?;
            if log_changes {
                self.log_contract_nonce(*address, block_number, &old_nonce)?;
            }
        }

        for (address, entries) in &diff.storage_diffs {
            let contract = Contract::bind(&self.txn, &self.tables, *address)?;
            let previous_values = contract.update_storage(entries)?;
            if log_changes {
                for (key, old_value) in &previous_values {
                    self.log_contract_storage(*address, *key, block_number, old_value)?;
                }
            }
            self.update_contract_commitment(contracts_trie, &contract)?;
        }

        Ok(())
    }

    fn update_contract_commitment(
        &self,
        contracts_trie: &mut ContractsTrie<'_, RW>,
        contract: &Contract<'_, RW>,
    ) -> StorageResult<()> {
        let storage_root = contract.storage_root()?;
        let class_hash = contract.class_hash()?;
        let nonce = contract.nonce()?;
        let commitment = calculate_contract_commitment(&storage_root, &class_hash, &nonce);
        contracts_trie.put(&contract.address().0.to_felt(), &commitment)?;
        Ok(())
    }

    fn remove_declared_classes(
        &self,
        block_number: BlockNumber,
        diff: &StateDiff,
    ) -> StorageResult<()> {
        let class_hashes = diff
            .declared_v0_classes
            .iter()
            .chain(diff.declared_v1_classes.iter().map(|declared| &declared.class_hash));
        for class_hash in class_hashes {
            let Some(declared) = self.txn.get(&self.tables.declared_classes, class_hash)? else {
                continue;
            };
            // A class listed by this diff but declared by an earlier block was
            // a re-declaration; the original declaration survives the revert.
            if declared.declared_at == block_number {
                self.txn.delete(&self.tables.declared_classes, class_hash)?;
            }
        }
        Ok(())
    }

    // For every mutation in `diff`, the value as of the end of the previous
    // block, read from the history logs (or the live state for slots the logs
    // no longer cover). The consumed log entries of `block_number` are
    // deleted. Reverting the genesis block reverses everything to zero.
    fn build_reverse_diff(
        &self,
        block_number: BlockNumber,
        diff: &StateDiff,
    ) -> StorageResult<StateDiff> {
        let mut reversed = StateDiff::default();

        for (address, entries) in &diff.storage_diffs {
            let mut reversed_entries = Vec::with_capacity(entries.len());
            let mut seen_keys = HashSet::new();
            for entry in entries {
                if !seen_keys.insert(entry.key) {
                    continue;
                }
                let mut value = Felt::ZERO;
                if let Some(previous_block) = block_number.prev() {
                    value = match self.storage_pre_image_at(*address, entry.key, previous_block)? {
                        Some(logged) => logged,
                        None => {
                            let trie =
                                open_contract_storage_trie(&self.txn, &self.tables, *address)?;
                            trie.get(&entry.key.0.to_felt())?
                        }
                    };
                }
                self.delete_contract_storage_log(*address, entry.key, block_number)?;
                reversed_entries.push(StorageEntry { key: entry.key, value });
            }
            reversed.storage_diffs.insert(*address, reversed_entries);
        }

        for address in diff.nonces.keys() {
            let mut nonce = Nonce::default();
            if let Some(previous_block) = block_number.prev() {
                nonce = match self.nonce_pre_image_at(*address, previous_block)? {
                    Some(logged) => logged,
                    None => {
                        self.txn.get(&self.tables.contract_nonces, address)?.unwrap_or_default()
                    }
                };
            }
            self.delete_contract_nonce_log(*address, block_number)?;
            reversed.nonces.insert(*address, nonce);
        }

        for replaced in &diff.replaced_classes {
            let mut class_hash = ClassHash::default();
            if let Some(previous_block) = block_number.prev() {
                class_hash = match self.class_hash_pre_image_at(replaced.address, previous_block)?
                {
                    Some(logged) => logged,
                    None => self
                        .txn
                        .get(&self.tables.contract_class_hashes, &replaced.address)?
                        .unwrap_or_default(),
                };
            }
            self.delete_contract_class_hash_log(replaced.address, block_number)?;
            reversed
                .replaced_classes
                .push(ReplacedClass { address: replaced.address, class_hash });
        }

        Ok(reversed)
    }

    fn purge_contract(
        &self,
        contracts_trie: &mut ContractsTrie<'_, RW>,
        address: ContractAddress,
    ) -> StorageResult<()> {
        self.txn.delete(&self.tables.contract_deployment_blocks, &address)?;
        contracts_trie.put(&address.0.to_felt(), &Felt::ZERO)?;
        let contract = Contract::bind(&self.txn, &self.tables, address)?;
        contract.purge()
    }
}

// Binds to the contract if it is deployed; for the readers an unknown address
// is an absent answer, not an error.
fn bind_deployed<'env, Mode: TransactionKind>(
    txn: &'env DbTransaction<'env, Mode>,
    tables: &'env Tables,
    address: ContractAddress,
) -> StorageResult<Option<Contract<'env, Mode>>> {
    match Contract::bind(txn, tables, address) {
        Ok(contract) => Ok(Some(contract)),
        Err(StorageError::UndeployedContract { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn calculate_contract_commitment(
    storage_root: &Felt,
    class_hash: &ClassHash,
    nonce: &Nonce,
) -> Felt {
    Pedersen::hash(
        &Pedersen::hash(&Pedersen::hash(&class_hash.0, storage_root), &nonce.0),
        &Felt::ZERO,
    )
}
