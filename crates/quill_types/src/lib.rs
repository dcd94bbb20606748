//! Representations of canonical [`StarkNet`] components.
//!
//! [`StarkNet`]: https://starknet.io/

mod block;
mod class;
mod core;
mod state;

pub use starknet_types_core::felt::Felt;

pub use self::block::{BlockHash, BlockNumber};
pub use self::class::{
    ContractClass, DeprecatedContractClass, DeprecatedEntryPoint, EntryPointOffset,
    EntryPointSelector, EntryPointType, SierraContractClass, SierraEntryPoint,
};
pub use self::core::{
    ChainId, ClassHash, CompiledClassHash, ContractAddress, GlobalRoot, Nonce, PatriciaKey,
};
pub use self::state::{
    DeclaredV1Class, DeployedContract, ReplacedClass, StateDiff, StateUpdate, StorageEntry,
    StorageKey,
};

#[derive(thiserror::Error, Clone, Debug)]
pub enum TypesError {
    #[error("Felt {felt:#x} is out of range {bound}.")]
    OutOfRange { felt: Felt, bound: &'static str },
}
