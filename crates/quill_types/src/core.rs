#[cfg(test)]
#[path = "core_test.rs"]
mod core_test;

use std::fmt::{self, Debug, Display};

use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;

use crate::TypesError;

/// 2**251, the exclusive upper bound of a commitment-trie key.
pub const PATRICIA_KEY_UPPER_BOUND: Felt =
    Felt::from_hex_unchecked("0x800000000000000000000000000000000000000000000000000000000000000");

/// A Felt in the valid key range of the commitment tries.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
#[serde(try_from = "Felt", into = "Felt")]
pub struct PatriciaKey(Felt);

impl PatriciaKey {
    pub fn new(felt: Felt) -> Result<Self, TypesError> {
        if felt >= PATRICIA_KEY_UPPER_BOUND {
            return Err(TypesError::OutOfRange { felt, bound: "[0x0, 2**251)" });
        }
        Ok(Self(felt))
    }

    pub fn key(&self) -> &Felt {
        &self.0
    }

    pub fn to_felt(self) -> Felt {
        self.0
    }
}

impl TryFrom<Felt> for PatriciaKey {
    type Error = TypesError;
    fn try_from(felt: Felt) -> Result<Self, Self::Error> {
        PatriciaKey::new(felt)
    }
}

impl From<PatriciaKey> for Felt {
    fn from(key: PatriciaKey) -> Self {
        key.0
    }
}

impl Debug for PatriciaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PatriciaKey").field(&self.0).finish()
    }
}

/// The address of a StarkNet contract.
#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct ContractAddress(pub PatriciaKey);

impl TryFrom<Felt> for ContractAddress {
    type Error = TypesError;
    fn try_from(felt: Felt) -> Result<Self, Self::Error> {
        Ok(Self(PatriciaKey::new(felt)?))
    }
}

/// The hash of a StarkNet [contract class](`crate::ContractClass`).
#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct ClassHash(pub Felt);

/// The hash of a Sierra class compiled to CASM.
#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct CompiledClassHash(pub Felt);

/// The nonce of a StarkNet contract.
#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct Nonce(pub Felt);

/// The commitment to the entire global state at a StarkNet block.
#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct GlobalRoot(pub Felt);

/// The identifier of a StarkNet network.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord)]
pub struct ChainId(pub String);

impl Default for ChainId {
    fn default() -> Self {
        ChainId("SN_MAIN".to_owned())
    }
}

impl Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
