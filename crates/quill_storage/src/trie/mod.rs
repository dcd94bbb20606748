//! Height-251 binary Merkle-Patricia tries with path-compressed edges.
//!
//! A trie is persisted as a set of nodes keyed by the bitset of their full
//! path from the trie root. Stored nodes are either leaves (path length 251)
//! holding the leaf value, or binary nodes holding the paths of their two
//! children and their own binary hash. Edges are implicit in the gap between a
//! parent's path and a child's path: hashing a child pointer wraps the child's
//! hash with `H(child_hash, path_as_felt) + path_length`. A separate root-key
//! entry points at the topmost stored node, so reading the root of a sparse
//! trie costs a single node fetch; the gap from the empty path down to the
//! root key is hashed as one more edge.
//!
//! Mutations are buffered in an in-memory overlay and the hashes of the
//! touched ancestors are recomputed lazily, deepest first, when the root is
//! requested or the trie is committed. Inserting splits an existing pointer
//! with a new binary node; deleting a leaf removes its parent binary node and
//! reattaches the sibling, so stored nodes never move and edges stay maximal.

mod path;
#[cfg(test)]
#[path = "trie_test.rs"]
mod trie_test;

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use quill_types::{ContractAddress, Felt};
use starknet_types_core::hash::{Pedersen, Poseidon, StarkHash};

pub use self::path::TriePath;
use crate::db::{DbTransaction, TableId, TransactionKind, RW};
use crate::{StorageError, StorageResult, Tables};

/// Which of the two global tries a root-key entry belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrieKind {
    Contracts,
    Classes,
}

/// A persisted trie node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TrieNode {
    Leaf(Felt),
    Binary(BinaryNode),
}

/// An internal node. `hash` is the node's binary hash, excluding the edge
/// leading to the node; children are referenced by their full paths.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BinaryNode {
    pub hash: Felt,
    pub left: TriePath,
    pub right: TriePath,
}

impl BinaryNode {
    fn child(&self, right: bool) -> &TriePath {
        if right { &self.right } else { &self.left }
    }

    fn child_mut(&mut self, right: bool) -> &mut TriePath {
        if right { &mut self.right } else { &mut self.left }
    }
}

/// Key of a contract storage trie node: the owning contract first, so one
/// contract's nodes are contiguous under a cursor.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ContractNodeKey {
    pub address: ContractAddress,
    pub path: TriePath,
}

/// Read access to a trie's persisted nodes and root-key entry.
pub(crate) trait TrieStorage {
    fn node(&self, path: &TriePath) -> StorageResult<Option<TrieNode>>;
    fn root_path(&self) -> StorageResult<Option<TriePath>>;
}

/// Write access; available only under a RW transaction.
pub(crate) trait TrieStorageMut: TrieStorage {
    fn insert_node(&self, path: &TriePath, node: &TrieNode) -> StorageResult<()>;
    fn delete_node(&self, path: &TriePath) -> StorageResult<()>;
    fn set_root_path(&self, path: &TriePath) -> StorageResult<()>;
    fn delete_root_path(&self) -> StorageResult<()>;
}

/// Node storage of the two global tries.
pub(crate) struct GlobalTrieStorage<'env, Mode: TransactionKind> {
    txn: &'env DbTransaction<'env, Mode>,
    nodes: TableId<TriePath, TrieNode>,
    roots: TableId<TrieKind, TriePath>,
    kind: TrieKind,
}

impl<'env, Mode: TransactionKind> GlobalTrieStorage<'env, Mode> {
    pub(crate) fn open(
        txn: &'env DbTransaction<'env, Mode>,
        tables: &Tables,
        kind: TrieKind,
    ) -> Self {
        let nodes = match kind {
            TrieKind::Contracts => tables.contracts_trie_nodes,
            TrieKind::Classes => tables.classes_trie_nodes,
        };
        Self { txn, nodes, roots: tables.trie_roots, kind }
    }
}

impl<'env, Mode: TransactionKind> TrieStorage for GlobalTrieStorage<'env, Mode> {
    fn node(&self, path: &TriePath) -> StorageResult<Option<TrieNode>> {
        Ok(self.txn.get(&self.nodes, path)?)
    }

    fn root_path(&self) -> StorageResult<Option<TriePath>> {
        Ok(self.txn.get(&self.roots, &self.kind)?)
    }
}

impl<'env> TrieStorageMut for GlobalTrieStorage<'env, RW> {
    fn insert_node(&self, path: &TriePath, node: &TrieNode) -> StorageResult<()> {
        Ok(self.txn.upsert(&self.nodes, path, node)?)
    }

    fn delete_node(&self, path: &TriePath) -> StorageResult<()> {
        Ok(self.txn.delete(&self.nodes, path)?)
    }

    fn set_root_path(&self, path: &TriePath) -> StorageResult<()> {
        Ok(self.txn.upsert(&self.roots, &self.kind, path)?)
    }

    fn delete_root_path(&self) -> StorageResult<()> {
        Ok(self.txn.delete(&self.roots, &self.kind)?)
    }
}

/// Node storage of one contract's storage trie, keyed under the contract's
/// address.
pub(crate) struct ContractTrieStorage<'env, Mode: TransactionKind> {
    txn: &'env DbTransaction<'env, Mode>,
    nodes: TableId<ContractNodeKey, TrieNode>,
    roots: TableId<ContractAddress, TriePath>,
    address: ContractAddress,
}

impl<'env, Mode: TransactionKind> ContractTrieStorage<'env, Mode> {
    pub(crate) fn open(
        txn: &'env DbTransaction<'env, Mode>,
        tables: &Tables,
        address: ContractAddress,
    ) -> Self {
        Self {
            txn,
            nodes: tables.contract_storage_nodes,
            roots: tables.contract_storage_roots,
            address,
        }
    }

    fn node_key(&self, path: &TriePath) -> ContractNodeKey {
        ContractNodeKey { address: self.address, path: path.clone() }
    }
}

impl<'env, Mode: TransactionKind> TrieStorage for ContractTrieStorage<'env, Mode> {
    fn node(&self, path: &TriePath) -> StorageResult<Option<TrieNode>> {
        Ok(self.txn.get(&self.nodes, &self.node_key(path))?)
    }

    fn root_path(&self) -> StorageResult<Option<TriePath>> {
        Ok(self.txn.get(&self.roots, &self.address)?)
    }
}

impl<'env> TrieStorageMut for ContractTrieStorage<'env, RW> {
    fn insert_node(&self, path: &TriePath, node: &TrieNode) -> StorageResult<()> {
        Ok(self.txn.upsert(&self.nodes, &self.node_key(path), node)?)
    }

    fn delete_node(&self, path: &TriePath) -> StorageResult<()> {
        Ok(self.txn.delete(&self.nodes, &self.node_key(path))?)
    }

    fn set_root_path(&self, path: &TriePath) -> StorageResult<()> {
        Ok(self.txn.upsert(&self.roots, &self.address, path)?)
    }

    fn delete_root_path(&self) -> StorageResult<()> {
        Ok(self.txn.delete(&self.roots, &self.address)?)
    }
}

pub(crate) type ContractsTrie<'env, Mode> = Trie<GlobalTrieStorage<'env, Mode>, Pedersen>;
pub(crate) type ClassesTrie<'env, Mode> = Trie<GlobalTrieStorage<'env, Mode>, Poseidon>;
pub(crate) type ContractStorageTrie<'env, Mode> = Trie<ContractTrieStorage<'env, Mode>, Pedersen>;

pub(crate) fn open_contracts_trie<'env, Mode: TransactionKind>(
    txn: &'env DbTransaction<'env, Mode>,
    tables: &Tables,
) -> StorageResult<ContractsTrie<'env, Mode>> {
    Trie::new(GlobalTrieStorage::open(txn, tables, TrieKind::Contracts))
}

pub(crate) fn open_classes_trie<'env, Mode: TransactionKind>(
    txn: &'env DbTransaction<'env, Mode>,
    tables: &Tables,
) -> StorageResult<ClassesTrie<'env, Mode>> {
    Trie::new(GlobalTrieStorage::open(txn, tables, TrieKind::Classes))
}

pub(crate) fn open_contract_storage_trie<'env, Mode: TransactionKind>(
    txn: &'env DbTransaction<'env, Mode>,
    tables: &Tables,
    address: ContractAddress,
) -> StorageResult<ContractStorageTrie<'env, Mode>> {
    Trie::new(ContractTrieStorage::open(txn, tables, address))
}

/// A commitment trie over a node storage, hashing with `H`.
pub(crate) struct Trie<S, H: StarkHash> {
    storage: S,
    root_path: Option<TriePath>,
    committed_root_path: Option<TriePath>,
    // Pending writes and deletes, flushed on commit.
    nodes: HashMap<TriePath, TrieNode>,
    deleted: HashSet<TriePath>,
    // Binary nodes whose stored hash is out of date.
    stale_hashes: HashSet<TriePath>,
    _hash: PhantomData<H>,
}

impl<S: TrieStorage, H: StarkHash> Trie<S, H> {
    pub(crate) fn new(storage: S) -> StorageResult<Self> {
        let root_path = storage.root_path()?;
        Ok(Self {
            storage,
            committed_root_path: root_path.clone(),
            root_path,
            nodes: HashMap::new(),
            deleted: HashSet::new(),
            stale_hashes: HashSet::new(),
            _hash: PhantomData {},
        })
    }

    /// Returns the value at `key`, zero if the key is absent.
    pub(crate) fn get(&self, key: &Felt) -> StorageResult<Felt> {
        let key_path = TriePath::from_felt(key);
        let Some(root) = &self.root_path else {
            return Ok(Felt::ZERO);
        };
        let mut current = root.clone();
        loop {
            if !key_path.starts_with(&current) {
                return Ok(Felt::ZERO);
            }
            match self.node(&current)? {
                TrieNode::Leaf(value) => {
                    return if current == key_path {
                        Ok(value)
                    } else {
                        Err(truncated_leaf_error(&current))
                    };
                }
                TrieNode::Binary(binary) => {
                    if current.len() >= TriePath::MAX_LEN {
                        return Err(binary_at_leaf_depth_error(&current));
                    }
                    current = binary.child(key_path.bit(current.len())).clone();
                }
            }
        }
    }

    /// Returns the hash of the trie's root, zero for an empty trie.
    ///
    /// Recomputes any out-of-date internal hashes first; the results are kept
    /// in the overlay, so a following `commit` does not hash again.
    pub(crate) fn root(&mut self) -> StorageResult<Felt> {
        self.compute_hashes()?;
        match self.root_path.clone() {
            None => Ok(Felt::ZERO),
            Some(root) => self.subtree_hash(&root, 0),
        }
    }

    /// Sets the value of `key`. Setting zero deletes the leaf. Returns the
    /// previous value.
    pub(crate) fn put(&mut self, key: &Felt, value: &Felt) -> StorageResult<Felt> {
        let key_path = TriePath::from_felt(key);
        if *value == Felt::ZERO {
            return self.delete_leaf(&key_path);
        }

        let Some(root) = self.root_path.clone() else {
            // The trie is empty; the new leaf becomes the root node.
            self.insert_overlay(key_path.clone(), TrieNode::Leaf(*value));
            self.root_path = Some(key_path);
            return Ok(Felt::ZERO);
        };

        let mut visited: Vec<TriePath> = Vec::new();
        let mut current = root;
        loop {
            if !key_path.starts_with(&current) {
                break;
            }
            match self.node(&current)? {
                TrieNode::Leaf(old_value) => {
                    if current != key_path {
                        return Err(truncated_leaf_error(&current));
                    }
                    self.insert_overlay(key_path, TrieNode::Leaf(*value));
                    self.mark_stale(visited);
                    return Ok(old_value);
                }
                TrieNode::Binary(binary) => {
                    if current.len() >= TriePath::MAX_LEN {
                        return Err(binary_at_leaf_depth_error(&current));
                    }
                    visited.push(current.clone());
                    current = binary.child(key_path.bit(current.len())).clone();
                }
            }
        }

        // The pointer to `current` no longer matches the key. Fork it with a
        // binary node at the longest common prefix; the existing subtree keeps
        // its paths and the new leaf goes on the other side.
        let fork_len = key_path.common_prefix_len(&current);
        let fork_path = key_path.prefix(fork_len);
        let new_bit = key_path.bit(fork_len);
        let (left, right) =
            if new_bit { (current, key_path.clone()) } else { (key_path.clone(), current) };
        self.insert_overlay(key_path.clone(), TrieNode::Leaf(*value));
        self.insert_overlay(
            fork_path.clone(),
            TrieNode::Binary(BinaryNode { hash: Felt::ZERO, left, right }),
        );
        self.stale_hashes.insert(fork_path.clone());
        match visited.last().cloned() {
            Some(parent) => self.relink_child(&parent, key_path.bit(parent.len()), fork_path)?,
            None => self.root_path = Some(fork_path),
        }
        self.mark_stale(visited);
        Ok(Felt::ZERO)
    }

    fn delete_leaf(&mut self, key_path: &TriePath) -> StorageResult<Felt> {
        let Some(mut current) = self.root_path.clone() else {
            return Ok(Felt::ZERO);
        };
        let mut visited: Vec<TriePath> = Vec::new();
        let old_value = loop {
            if !key_path.starts_with(&current) {
                // The leaf does not exist.
                return Ok(Felt::ZERO);
            }
            match self.node(&current)? {
                TrieNode::Leaf(value) => {
                    if current != *key_path {
                        return Err(truncated_leaf_error(&current));
                    }
                    break value;
                }
                TrieNode::Binary(binary) => {
                    if current.len() >= TriePath::MAX_LEN {
                        return Err(binary_at_leaf_depth_error(&current));
                    }
                    visited.push(current.clone());
                    current = binary.child(key_path.bit(current.len())).clone();
                }
            }
        };

        self.delete_overlay(key_path);
        match visited.pop() {
            None => {
                // The leaf was the only node.
                self.root_path = None;
            }
            Some(parent_path) => {
                // The parent binary node becomes unary; delete it and attach
                // the sibling subtree in its place. Paths do not change, so
                // the sibling's edge absorbs the parent's position.
                let TrieNode::Binary(parent) = self.node(&parent_path)? else {
                    return Err(StorageError::DBInconsistency {
                        msg: format!("Trie node at {parent_path:?} should be binary."),
                    });
                };
                let sibling = parent.child(!key_path.bit(parent_path.len())).clone();
                self.delete_overlay(&parent_path);
                match visited.last().cloned() {
                    None => self.root_path = Some(sibling),
                    Some(grandparent) => {
                        self.relink_child(
                            &grandparent,
                            key_path.bit(grandparent.len()),
                            sibling,
                        )?;
                    }
                }
            }
        }
        self.mark_stale(visited);
        Ok(old_value)
    }

    fn node(&self, path: &TriePath) -> StorageResult<TrieNode> {
        self.node_opt(path)?.ok_or_else(|| StorageError::DBInconsistency {
            msg: format!("Missing trie node at {path:?}."),
        })
    }

    fn node_opt(&self, path: &TriePath) -> StorageResult<Option<TrieNode>> {
        if let Some(node) = self.nodes.get(path) {
            return Ok(Some(node.clone()));
        }
        if self.deleted.contains(path) {
            return Ok(None);
        }
        self.storage.node(path)
    }

    fn insert_overlay(&mut self, path: TriePath, node: TrieNode) {
        self.deleted.remove(&path);
        self.nodes.insert(path, node);
    }

    fn delete_overlay(&mut self, path: &TriePath) {
        self.nodes.remove(path);
        self.stale_hashes.remove(path);
        self.deleted.insert(path.clone());
    }

    fn relink_child(
        &mut self,
        parent_path: &TriePath,
        right: bool,
        new_child: TriePath,
    ) -> StorageResult<()> {
        let TrieNode::Binary(mut parent) = self.node(parent_path)? else {
            return Err(StorageError::DBInconsistency {
                msg: format!("Trie node at {parent_path:?} should be binary."),
            });
        };
        *parent.child_mut(right) = new_child;
        self.insert_overlay(parent_path.clone(), TrieNode::Binary(parent));
        Ok(())
    }

    fn mark_stale(&mut self, paths: Vec<TriePath>) {
        self.stale_hashes.extend(paths);
    }

    // Recomputes the hashes of the stale binary nodes, deepest first, so each
    // node sees up-to-date children.
    fn compute_hashes(&mut self) -> StorageResult<()> {
        if self.stale_hashes.is_empty() {
            return Ok(());
        }
        let mut stale: Vec<TriePath> = self.stale_hashes.drain().collect();
        stale.sort_by_key(|path| std::cmp::Reverse(path.len()));
        for path in stale {
            let Some(TrieNode::Binary(binary)) = self.node_opt(&path)? else {
                // The node was deleted after it was marked.
                continue;
            };
            let left = self.subtree_hash(&binary.left, path.len() + 1)?;
            let right = self.subtree_hash(&binary.right, path.len() + 1)?;
            self.nodes.insert(
                path,
                TrieNode::Binary(BinaryNode {
                    hash: H::hash(&left, &right),
                    left: binary.left,
                    right: binary.right,
                }),
            );
        }
        Ok(())
    }

    // The hash of the subtree hanging at `path`, as seen by an ancestor whose
    // own path (plus the direction bit) is `from_len` bits long: the node's
    // hash wrapped with the connecting edge.
    fn subtree_hash(&self, path: &TriePath, from_len: usize) -> StorageResult<Felt> {
        let hash = match self.node(path)? {
            TrieNode::Leaf(value) => value,
            TrieNode::Binary(binary) => binary.hash,
        };
        Ok(edge_hash::<H>(&hash, &path.suffix(from_len)))
    }
}

impl<S: TrieStorageMut, H: StarkHash> Trie<S, H> {
    /// Flushes the buffered nodes and re-persists the root-key entry. Clean
    /// tries commit as a no-op.
    pub(crate) fn commit(&mut self) -> StorageResult<()> {
        self.compute_hashes()?;
        for path in self.deleted.drain() {
            self.storage.delete_node(&path)?;
        }
        for (path, node) in self.nodes.drain() {
            self.storage.insert_node(&path, &node)?;
        }
        if self.root_path != self.committed_root_path {
            match &self.root_path {
                Some(root) => self.storage.set_root_path(root)?,
                None => self.storage.delete_root_path()?,
            }
            self.committed_root_path = self.root_path.clone();
        }
        Ok(())
    }
}

/// `H(child_hash, path) + path_length` for a non-empty edge; transparent for
/// an empty one.
fn edge_hash<H: StarkHash>(child_hash: &Felt, path: &TriePath) -> Felt {
    if path.is_empty() {
        return *child_hash;
    }
    H::hash(child_hash, &path.to_felt()) + Felt::from(path.len() as u64)
}

fn truncated_leaf_error(path: &TriePath) -> StorageError {
    StorageError::DBInconsistency {
        msg: format!("Trie leaf at non-maximal depth {}.", path.len()),
    }
}

fn binary_at_leaf_depth_error(path: &TriePath) -> StorageError {
    StorageError::DBInconsistency {
        msg: format!("Trie binary node at leaf depth {}.", path.len()),
    }
}
