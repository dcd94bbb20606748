//! [`StorageSerde`] implementations for everything the tables store.
//!
//! Integers are fixed-width big-endian and felts are their canonical 32
//! bytes, so the concatenated fields of a composite key compare bytewise in
//! key order. Collections carry a fixed-width length prefix; they only ever
//! appear inside values, where ordering does not matter.

#[cfg(test)]
#[path = "serializers_test.rs"]
mod serializers_test;

use std::collections::HashMap;
use std::hash::Hash;

use quill_types::{
    BlockNumber, ClassHash, ContractAddress, ContractClass, DeprecatedContractClass,
    DeprecatedEntryPoint, EntryPointOffset, EntryPointSelector, EntryPointType, Felt, Nonce,
    PatriciaKey, SierraContractClass, SierraEntryPoint, StorageKey,
};

use crate::db::serialization::{StorageSerde, StorageSerdeError};
use crate::history::{ContractLogKey, StorageLogKey};
use crate::metadata::{LayoutVersion, MetadataKey};
use crate::state::data::DeclaredClass;
use crate::trie::{BinaryNode, ContractNodeKey, TrieKind, TrieNode, TriePath};

storage_serde! {
    pub struct BlockNumber(pub u64);
    pub struct ClassHash(pub Felt);
    pub struct Nonce(pub Felt);
    pub struct LayoutVersion(pub u32);
    pub struct EntryPointSelector(pub Felt);
    pub struct EntryPointOffset(pub usize);
    pub struct DeprecatedEntryPoint {
        pub selector: EntryPointSelector,
        pub offset: EntryPointOffset,
    }
    pub struct SierraEntryPoint {
        pub function_idx: usize,
        pub selector: EntryPointSelector,
    }
    pub struct DeprecatedContractClass {
        pub abi: serde_json::Value,
        pub program: serde_json::Value,
        pub entry_points_by_type: HashMap<EntryPointType, Vec<DeprecatedEntryPoint>>,
    }
    pub struct SierraContractClass {
        pub sierra_program: Vec<Felt>,
        pub contract_class_version: String,
        pub entry_points_by_type: HashMap<EntryPointType, Vec<SierraEntryPoint>>,
        pub abi: String,
    }
    pub struct DeclaredClass {
        pub declared_at: BlockNumber,
        pub contract_class: ContractClass,
    }
    pub struct BinaryNode {
        pub hash: Felt,
        pub left: TriePath,
        pub right: TriePath,
    }
    pub struct ContractNodeKey {
        pub address: ContractAddress,
        pub path: TriePath,
    }
    pub struct ContractLogKey {
        pub address: ContractAddress,
        pub block_number: BlockNumber,
    }
    pub struct StorageLogKey {
        pub address: ContractAddress,
        pub key: StorageKey,
        pub block_number: BlockNumber,
    }
}

// Newtypes encode as their inner value; structs encode field by field in
// declaration order. Enums are written out by hand below.
macro_rules! storage_serde {
    () => {};
    ($(pub)? struct $name:ident($(pub)? $ty:ty); $($rest:tt)*) => {
        impl StorageSerde for $name {
            fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
                self.0.serialize_into(res)
            }
            fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
                <$ty>::deserialize_from(bytes).map(Self)
            }
        }
        storage_serde!($($rest)*);
    };
    ($(pub)? struct $name:ident { $(pub $field:ident : $ty:ty ,)* } $($rest:tt)*) => {
        impl StorageSerde for $name {
            fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
                $(
                    self.$field.serialize_into(res)?;
                )*
                Ok(())
            }
            fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
                Some(Self {
                    $(
                        $field: <$ty>::deserialize_from(bytes)?,
                    )*
                })
            }
        }
        storage_serde!($($rest)*);
    };
}
pub(crate) use storage_serde;

////////////////////////////////////////////////////////////////////////
//  Enums, tagged with one byte.
////////////////////////////////////////////////////////////////////////

impl StorageSerde for ContractClass {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        match self {
            ContractClass::Deprecated(class) => {
                0u8.serialize_into(res)?;
                class.serialize_into(res)
            }
            ContractClass::Sierra(class) => {
                1u8.serialize_into(res)?;
                class.serialize_into(res)
            }
        }
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        match u8::deserialize_from(bytes)? {
            0 => Some(Self::Deprecated(DeprecatedContractClass::deserialize_from(bytes)?)),
            1 => Some(Self::Sierra(SierraContractClass::deserialize_from(bytes)?)),
            _ => None,
        }
    }
}

impl StorageSerde for EntryPointType {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        let tag: u8 = match self {
            EntryPointType::Constructor => 0,
            EntryPointType::External => 1,
            EntryPointType::L1Handler => 2,
        };
        tag.serialize_into(res)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        match u8::deserialize_from(bytes)? {
            0 => Some(Self::Constructor),
            1 => Some(Self::External),
            2 => Some(Self::L1Handler),
            _ => None,
        }
    }
}

impl StorageSerde for TrieNode {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        match self {
            TrieNode::Leaf(value) => {
                0u8.serialize_into(res)?;
                value.serialize_into(res)
            }
            TrieNode::Binary(binary) => {
                1u8.serialize_into(res)?;
                binary.serialize_into(res)
            }
        }
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        match u8::deserialize_from(bytes)? {
            0 => Some(Self::Leaf(Felt::deserialize_from(bytes)?)),
            1 => Some(Self::Binary(BinaryNode::deserialize_from(bytes)?)),
            _ => None,
        }
    }
}

impl StorageSerde for TrieKind {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        let tag: u8 = match self {
            TrieKind::Contracts => 0,
            TrieKind::Classes => 1,
        };
        tag.serialize_into(res)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        match u8::deserialize_from(bytes)? {
            0 => Some(Self::Contracts),
            1 => Some(Self::Classes),
            _ => None,
        }
    }
}

impl StorageSerde for MetadataKey {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        match self {
            MetadataKey::LayoutVersion => 0u8.serialize_into(res),
        }
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        match u8::deserialize_from(bytes)? {
            0 => Some(Self::LayoutVersion),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
//  Felts and their semantic wrappers.
////////////////////////////////////////////////////////////////////////

impl StorageSerde for Felt {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        Ok(res.write_all(&self.to_bytes_be())?)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let mut buffer = [0u8; 32];
        bytes.read_exact(&mut buffer).ok()?;
        Some(Felt::from_bytes_be(&buffer))
    }
}

impl StorageSerde for PatriciaKey {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        self.key().serialize_into(res)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        Self::new(Felt::deserialize_from(bytes)?).ok()
    }
}

impl StorageSerde for ContractAddress {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        self.0.serialize_into(res)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        Some(ContractAddress(PatriciaKey::deserialize_from(bytes)?))
    }
}

impl StorageSerde for StorageKey {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        self.0.serialize_into(res)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        Some(StorageKey(PatriciaKey::deserialize_from(bytes)?))
    }
}

// A path is encoded as its bit length (one byte, at most 251) followed by the
// bits packed MSB-first. Unused bits of the last byte are zero.
impl StorageSerde for TriePath {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        (self.len() as u8).serialize_into(res)?;
        Ok(res.write_all(&self.to_packed_bytes())?)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let len = usize::from(u8::deserialize_from(bytes)?);
        if len > TriePath::MAX_LEN {
            return None;
        }
        let mut buffer = vec![0u8; (len + 7) / 8];
        bytes.read_exact(&mut buffer).ok()?;
        TriePath::from_packed_bytes(&buffer, len)
    }
}

////////////////////////////////////////////////////////////////////////
//  Primitives and collections.
////////////////////////////////////////////////////////////////////////

impl StorageSerde for u8 {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        Ok(res.write_all(&[*self])?)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let mut byte = [0u8; 1];
        bytes.read_exact(&mut byte).ok()?;
        Some(byte[0])
    }
}

impl StorageSerde for u32 {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        Ok(res.write_all(&self.to_be_bytes())?)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let mut buffer = [0u8; 4];
        bytes.read_exact(&mut buffer).ok()?;
        Some(u32::from_be_bytes(buffer))
    }
}

impl StorageSerde for u64 {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        Ok(res.write_all(&self.to_be_bytes())?)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let mut buffer = [0u8; 8];
        bytes.read_exact(&mut buffer).ok()?;
        Some(u64::from_be_bytes(buffer))
    }
}

// Stored full-width so the encoding does not depend on the platform.
impl StorageSerde for usize {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        (*self as u64).serialize_into(res)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        usize::try_from(u64::deserialize_from(bytes)?).ok()
    }
}

impl StorageSerde for bool {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        u8::from(*self).serialize_into(res)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        match u8::deserialize_from(bytes)? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }
}

impl StorageSerde for String {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        write_len(self.len(), res)?;
        Ok(res.write_all(self.as_bytes())?)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let mut buffer = vec![0u8; read_len(bytes)?];
        bytes.read_exact(&mut buffer).ok()?;
        String::from_utf8(buffer).ok()
    }
}

impl<T: StorageSerde> StorageSerde for Option<T> {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        self.is_some().serialize_into(res)?;
        match self {
            Some(value) => value.serialize_into(res),
            None => Ok(()),
        }
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        if bool::deserialize_from(bytes)? {
            Some(Some(T::deserialize_from(bytes)?))
        } else {
            Some(None)
        }
    }
}

impl<T: StorageSerde> StorageSerde for Vec<T> {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        write_len(self.len(), res)?;
        for item in self {
            item.serialize_into(res)?;
        }
        Ok(())
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let len = read_len(bytes)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::deserialize_from(bytes)?);
        }
        Some(items)
    }
}

impl<K: StorageSerde + Eq + Hash, V: StorageSerde> StorageSerde for HashMap<K, V> {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        write_len(self.len(), res)?;
        for (key, value) in self.iter() {
            key.serialize_into(res)?;
            value.serialize_into(res)?;
        }
        Ok(())
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let len = read_len(bytes)?;
        let mut map = HashMap::with_capacity(len);
        for _ in 0..len {
            let key = K::deserialize_from(bytes)?;
            let value = V::deserialize_from(bytes)?;
            // A duplicate key means the buffer was not written by us.
            if map.insert(key, value).is_some() {
                return None;
            }
        }
        Some(map)
    }
}

// Class programs and ABIs are stored as the JSON text the gateway served.
impl StorageSerde for serde_json::Value {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
        let text = serde_json::to_vec(self)?;
        write_len(text.len(), res)?;
        Ok(res.write_all(&text)?)
    }

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self> {
        let mut buffer = vec![0u8; read_len(bytes)?];
        bytes.read_exact(&mut buffer).ok()?;
        serde_json::from_slice(&buffer).ok()
    }
}

// Collection lengths are a fixed-width u32; a stored collection holds at most
// 4G entries.
fn write_len(len: usize, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError> {
    u32::try_from(len).map_err(|_| StorageSerdeError::LengthOverflow)?.serialize_into(res)
}

fn read_len(bytes: &mut impl std::io::Read) -> Option<usize> {
    usize::try_from(u32::deserialize_from(bytes)?).ok()
}
