use bitvec::prelude::{BitVec, Msb0};
use bitvec::view::BitView;
use quill_types::Felt;

/// The path from the root of a commitment trie to a node, as a bit string.
///
/// A full-height path (251 bits) addresses a leaf; shorter paths address
/// internal nodes. The empty path addresses the trie root position.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TriePath(BitVec<u8, Msb0>);

impl TriePath {
    /// The height of the commitment tries, and so the length of a leaf path.
    pub const MAX_LEN: usize = 251;

    /// The path to the leaf holding `felt`'s value: the low 251 bits of the
    /// felt, most significant first.
    pub fn from_felt(felt: &Felt) -> Self {
        let bytes = felt.to_bytes_be();
        Self(bytes.view_bits::<Msb0>()[256 - Self::MAX_LEN..].to_bitvec())
    }

    /// The path bits read as an unsigned integer.
    pub fn to_felt(&self) -> Felt {
        let mut bytes = [0u8; 32];
        let bits = bytes.view_bits_mut::<Msb0>();
        bits[256 - self.0.len()..].copy_from_bitslice(&self.0);
        Felt::from_bytes_be(&bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bit(&self, index: usize) -> bool {
        self.0[index]
    }

    pub fn starts_with(&self, prefix: &TriePath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    pub fn common_prefix_len(&self, other: &TriePath) -> usize {
        self.0
            .iter()
            .by_vals()
            .zip(other.0.iter().by_vals())
            .take_while(|(lhs, rhs)| lhs == rhs)
            .count()
    }

    pub fn prefix(&self, len: usize) -> TriePath {
        Self(self.0[..len].to_bitvec())
    }

    pub fn suffix(&self, from: usize) -> TriePath {
        Self(self.0[from..].to_bitvec())
    }

    /// The path bits packed MSB-first; unused bits of the last byte are zero.
    pub(crate) fn to_packed_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; (self.0.len() + 7) / 8];
        bytes.as_mut_slice().view_bits_mut::<Msb0>()[..self.0.len()]
            .copy_from_bitslice(&self.0);
        bytes
    }

    pub(crate) fn from_packed_bytes(bytes: &[u8], len: usize) -> Option<Self> {
        let bits = bytes.view_bits::<Msb0>();
        if bits.len() < len {
            return None;
        }
        Some(Self(bits[..len].to_bitvec()))
    }
}
