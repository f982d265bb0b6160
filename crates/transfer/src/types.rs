use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Opaque handle of one transfer.
///
/// A 128-bit value; its hyphenated text form is only used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(Uuid);

impl TransferId {
    /// The all-zero identifier. Never issued by an allocator.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns `true` for the all-zero identifier.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for TransferId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TransferId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Source of fresh transfer identifiers.
pub trait IdentifierAllocator: Send + Sync {
    /// Returns a new identifier. Must never return [`TransferId::nil`].
    fn new_identifier(&self) -> TransferId;
}

/// Allocates random (UUID v4) identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdAllocator;

impl IdentifierAllocator for RandomIdAllocator {
    fn new_identifier(&self) -> TransferId {
        TransferId(Uuid::new_v4())
    }
}

/// A numbered piece of file data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based sequence number within the transfer.
    pub number: u64,
    /// Raw chunk bytes.
    pub data: Vec<u8>,
    /// Set by the uploader on the final chunk of the file.
    pub is_last: bool,
}

impl Chunk {
    pub fn new(number: u64, data: Vec<u8>, is_last: bool) -> Self {
        Self {
            number,
            data,
            is_last,
        }
    }

    /// Size of the chunk payload in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_distinct_and_not_nil() {
        let alloc = RandomIdAllocator;
        let a = alloc.new_identifier();
        let b = alloc.new_identifier();
        assert_ne!(a, b);
        assert!(!a.is_nil());
        assert!(!b.is_nil());
    }

    #[test]
    fn text_form_parses_back() {
        let id = RandomIdAllocator.new_identifier();
        let text = id.to_string();
        assert_eq!(text.len(), 36);
        assert_eq!(text.parse::<TransferId>().unwrap(), id);
    }

    #[test]
    fn garbage_text_rejected() {
        assert!("".parse::<TransferId>().is_err());
        assert!("not-a-transfer".parse::<TransferId>().is_err());
    }

    #[test]
    fn nil_id() {
        let nil: TransferId = "00000000-0000-0000-0000-000000000000".parse().unwrap();
        assert!(nil.is_nil());
        assert_eq!(nil, TransferId::nil());
    }

    #[test]
    fn chunk_size() {
        let chunk = Chunk::new(0, b"hello".to_vec(), false);
        assert_eq!(chunk.size(), 5);
        assert!(Chunk::new(1, Vec::new(), true).data.is_empty());
    }
}
