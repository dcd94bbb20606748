//! Data structs that are serialized into the database.

use quill_types::{BlockNumber, ContractClass};
use serde::{Deserialize, Serialize};

/// A class definition together with the block that declared it. Immutable once
/// written; deleted only when the declaring block is reverted.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct DeclaredClass {
    /// The block whose state diff declared the class.
    pub declared_at: BlockNumber,
    /// The class definition.
    pub contract_class: ContractClass,
}
