//! Fixed layout types present in page buffers.
//!
//! All types use little endian integers and are unaligned, so they can be
//! read in place from any offset of a page buffer with zerocopy.

use std::fmt;

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Page number within the substrate address space. 0 is never a valid page.
pub type PageId = u32;

pub const PAGE_HEADER_SIZE: usize = std::mem::size_of::<PageHeader>();
pub const NODE_REPR_SIZE: usize = std::mem::size_of::<NodeRepr>();
/// Size of one entry in the page offset table
pub const NODE_OFFSET_SIZE: usize = std::mem::size_of::<U16>();

#[derive(
    Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(transparent)]
pub struct PageFlags(u8);

bitflags::bitflags! {
    impl PageFlags: u8 {
        const LEAF = 0b001;
        const BRANCH = 0b010;
        const OVERFLOW = 0b100;
    }
}

impl fmt::Debug for PageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

/// Header at offset 0 of every page
#[derive(Default, Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PageHeader {
    pub id: U32,
    /// End of the offset table, grows up
    pub lower: U16,
    /// Start of the node heap, grows down
    pub upper: U16,
    pub num_entries: U16,
    pub flags: PageFlags,
    pub _padding: [u8; 1],
}

/// Header of a node in the page node heap, followed by the key bytes and,
/// in leaf pages, the value bytes.
#[derive(Default, Debug, Clone, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct NodeRepr {
    /// Child page for branch nodes, 0 in leaf nodes
    pub page_number: U32,
    /// Value length for leaf nodes, 0 in branch nodes
    pub data_size: U32,
    pub key_size: U16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_sizes() {
        assert_eq!(PAGE_HEADER_SIZE, 12);
        assert_eq!(NODE_REPR_SIZE, 10);
        assert_eq!(NODE_OFFSET_SIZE, 2);
    }
}
