#[cfg(test)]
#[path = "class_test.rs"]
mod class_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use starknet_types_core::felt::Felt;

/// A StarkNet contract class definition, in either of the two formats the
/// feeder gateway serves.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ContractClass {
    Deprecated(DeprecatedContractClass),
    Sierra(SierraContractClass),
}

impl Default for ContractClass {
    fn default() -> Self {
        ContractClass::Deprecated(DeprecatedContractClass::default())
    }
}

/// A Cairo 0 class: the compressed program and ABI are kept as the raw JSON
/// the gateway returned them in.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct DeprecatedContractClass {
    #[serde(default)]
    pub abi: serde_json::Value,
    pub program: serde_json::Value,
    pub entry_points_by_type: HashMap<EntryPointType, Vec<DeprecatedEntryPoint>>,
}

/// A Cairo 1 (Sierra) class.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SierraContractClass {
    pub sierra_program: Vec<Felt>,
    pub contract_class_version: String,
    pub entry_points_by_type: HashMap<EntryPointType, Vec<SierraEntryPoint>>,
    #[serde(default)]
    pub abi: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord)]
pub enum EntryPointType {
    #[serde(rename = "CONSTRUCTOR")]
    Constructor,
    #[serde(rename = "EXTERNAL")]
    External,
    #[serde(rename = "L1_HANDLER")]
    L1Handler,
}

impl Default for EntryPointType {
    fn default() -> Self {
        EntryPointType::External
    }
}

#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct EntryPointSelector(pub Felt);

#[derive(
    Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, PartialOrd, Ord,
)]
pub struct EntryPointOffset(pub usize);

/// An entry point of a Cairo 0 class.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct DeprecatedEntryPoint {
    pub selector: EntryPointSelector,
    pub offset: EntryPointOffset,
}

/// An entry point of a Sierra class.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct SierraEntryPoint {
    pub function_idx: usize,
    pub selector: EntryPointSelector,
}
