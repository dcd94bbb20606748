use crate::db::DbError;

/// The binary encoding of the types stored in the database.
///
/// Implementations must be deterministic and stable: the same value always
/// encodes to the same bytes, and the bytes of a composite key compare in the
/// same order as the key itself. Any change to an encoding is a layout change
/// and requires bumping [`LAYOUT_VERSION`](crate::LAYOUT_VERSION).
pub trait StorageSerde: Sized {
    fn serialize_into(&self, res: &mut impl std::io::Write) -> Result<(), StorageSerdeError>;

    fn deserialize_from(bytes: &mut impl std::io::Read) -> Option<Self>;
}

// The table layer speaks in whole buffers; these adapters allocate on encode
// and demand that decode consumes every byte.
pub(crate) trait StorageSerdeEx: StorageSerde {
    fn serialize(&self) -> Result<Vec<u8>, DbError>;

    fn deserialize(bytes: &[u8]) -> Option<Self>;
}

impl<T: StorageSerde> StorageSerdeEx for T {
    fn serialize(&self) -> Result<Vec<u8>, DbError> {
        let mut buffer = Vec::new();
        self.serialize_into(&mut buffer).map_err(|_| DbError::Encoding)?;
        Ok(buffer)
    }

    fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut reader = bytes;
        let value = Self::deserialize_from(&mut reader)?;
        // Trailing bytes mean the stored buffer does not hold this type.
        if !reader.is_empty() {
            return None;
        }
        Some(value)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StorageSerdeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("Collection too long to encode.")]
    LengthOverflow,
}
