#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;

use crate::block::BlockHash;
use crate::core::{ClassHash, CompiledClassHash, ContractAddress, GlobalRoot, Nonce, PatriciaKey};
use crate::TypesError;

/// A storage key in a StarkNet contract.
#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct StorageKey(pub PatriciaKey);

impl TryFrom<Felt> for StorageKey {
    type Error = TypesError;
    fn try_from(felt: Felt) -> Result<Self, Self::Error> {
        Ok(Self(PatriciaKey::new(felt)?))
    }
}

/// A single storage slot assignment in a StarkNet contract.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct StorageEntry {
    pub key: StorageKey,
    pub value: Felt,
}

/// A contract deployed in a block.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct DeployedContract {
    pub address: ContractAddress,
    pub class_hash: ClassHash,
}

/// A contract whose class was replaced in a block.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct ReplacedClass {
    pub address: ContractAddress,
    pub class_hash: ClassHash,
}

/// A Cairo 1 class declared in a block, together with the hash of its compiled
/// (Sierra to CASM) form.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct DeclaredV1Class {
    pub class_hash: ClassHash,
    pub compiled_class_hash: CompiledClassHash,
}

// Field names follow the feeder gateway's JSON: Cairo 0 declarations arrive as
// `old_declared_contracts` and Cairo 1 declarations as `declared_classes`.
/// The differences between two consecutive StarkNet states.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct StateDiff {
    pub storage_diffs: IndexMap<ContractAddress, Vec<StorageEntry>>,
    pub nonces: IndexMap<ContractAddress, Nonce>,
    pub deployed_contracts: Vec<DeployedContract>,
    #[serde(rename = "old_declared_contracts")]
    pub declared_v0_classes: Vec<ClassHash>,
    #[serde(rename = "declared_classes")]
    pub declared_v1_classes: Vec<DeclaredV1Class>,
    pub replaced_classes: Vec<ReplacedClass>,
}

/// A per-block state delta as returned by the feeder gateway, together with
/// the expected global roots before and after its application.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct StateUpdate {
    pub block_hash: BlockHash,
    pub old_root: GlobalRoot,
    pub new_root: GlobalRoot,
    pub state_diff: StateDiff,
}
