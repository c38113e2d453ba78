//! Slotted page layout and in-page node operations.
//!
//! A page starts with a [PageHeader], followed by the offset table which
//! grows up towards `lower`, while the node heap grows down from the end of
//! the page towards `upper`. The space between `lower` and `upper` is free.
//! Each offset table entry is the page relative position of a [NodeRepr]
//! followed by the key bytes and, for leaf nodes, the value bytes. Nodes are
//! padded to even sizes.
//!
//! The offset table keeps nodes in key order regardless of where their bytes
//! sit in the heap, so inserts and removals only memmove the table plus the
//! compacted heap region.

use std::cmp::Ordering;

use zerocopy::IntoBytes;

use crate::bytes::Bytes;
use crate::error::{error_capacity, Error};
use crate::repr::{
    NodeRepr, PageFlags, PageHeader, PageId, NODE_OFFSET_SIZE, NODE_REPR_SIZE, PAGE_HEADER_SIZE,
};
use crate::slice::{KeyComparer, Slice};
use crate::utils::EscapedBytes;
use crate::{PAGE_MAX_SPACE, PAGE_SIZE};

/// An in-memory copy of one substrate page.
///
/// Clones share the underlying buffer until one of them is mutated.
#[derive(Clone)]
pub struct Page {
    pub(crate) dirty: bool,
    raw_data: Bytes,
}

/// Borrowed view of one node of a page
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    pub key: &'a [u8],
    pub payload: NodePayload<'a>,
}

#[derive(Clone, Copy)]
pub enum NodePayload<'a> {
    /// Leaf node value
    Value(&'a [u8]),
    /// Branch node child page
    Child(PageId),
}

impl std::fmt::Debug for NodePayload<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodePayload::Value(v) => write!(f, "Value({:?})", EscapedBytes(v)),
            NodePayload::Child(id) => write!(f, "Child({id})"),
        }
    }
}

impl Page {
    pub(crate) fn new(id: PageId, flags: PageFlags) -> Self {
        let mut page = Page {
            dirty: true,
            raw_data: Bytes::new_zeroed(PAGE_SIZE),
        };
        *page.header_mut() = PageHeader {
            id: id.into(),
            lower: (PAGE_HEADER_SIZE as u16).into(),
            upper: (PAGE_SIZE as u16).into(),
            num_entries: 0.into(),
            flags,
            _padding: [0],
        };
        page
    }

    pub(crate) fn from_bytes(raw_data: Bytes) -> Result<Self, Error> {
        if raw_data.len() != PAGE_SIZE {
            return Err(Error::corruption("page buffer has unexpected length"));
        }
        let page = Page {
            dirty: false,
            raw_data,
        };
        page.check_structure()?;
        Ok(page)
    }

    #[inline]
    fn header(&self) -> &PageHeader {
        // The buffer is page sized and PageHeader is unaligned
        zerocopy::Ref::into_ref(
            zerocopy::Ref::<_, PageHeader>::from_prefix(self.raw_data.as_ref())
                .unwrap()
                .0,
        )
    }

    #[inline]
    fn header_mut(&mut self) -> &mut PageHeader {
        self.dirty = true;
        zerocopy::Ref::into_mut(
            zerocopy::Ref::<_, PageHeader>::from_prefix(self.raw_data.as_mut())
                .unwrap()
                .0,
        )
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.header().id.get()
    }

    /// Whether the page was mutated since it left the store. Substrates can
    /// skip persisting pages that come back clean from a no-op operation.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn flags(&self) -> PageFlags {
        self.header().flags
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags().contains(PageFlags::LEAF)
    }

    #[inline]
    pub fn is_branch(&self) -> bool {
        self.flags().contains(PageFlags::BRANCH)
    }

    #[inline]
    pub fn num_entries(&self) -> usize {
        self.header().num_entries.get() as usize
    }

    #[inline]
    pub(crate) fn raw_data(&self) -> &Bytes {
        &self.raw_data
    }

    /// Bytes between the offset table and the node heap
    #[inline]
    pub(crate) fn free_space(&self) -> usize {
        let header = self.header();
        header.upper.get() as usize - header.lower.get() as usize
    }

    /// Bytes used by the offset table and the node heap
    #[inline]
    pub(crate) fn occupied(&self) -> usize {
        PAGE_MAX_SPACE - self.free_space()
    }

    #[inline]
    fn offset_at(&self, pos: usize) -> usize {
        debug_assert!(pos < self.num_entries());
        let at = PAGE_HEADER_SIZE + pos * NODE_OFFSET_SIZE;
        u16::from_le_bytes(self.raw_data[at..at + NODE_OFFSET_SIZE].try_into().unwrap()) as usize
    }

    fn node_repr_at(&self, pos: usize) -> NodeRepr {
        let off = self.offset_at(pos);
        zerocopy::FromBytes::read_from_bytes(&self.raw_data[off..off + NODE_REPR_SIZE]).unwrap()
    }

    pub(crate) fn key_at(&self, pos: usize) -> &[u8] {
        let off = self.offset_at(pos);
        let repr = self.node_repr_at(pos);
        &self.raw_data[off + NODE_REPR_SIZE..][..repr.key_size.get() as usize]
    }

    pub fn node_at(&self, pos: usize) -> NodeRef<'_> {
        let off = self.offset_at(pos);
        let repr = self.node_repr_at(pos);
        let key_size = repr.key_size.get() as usize;
        let key = &self.raw_data[off + NODE_REPR_SIZE..][..key_size];
        let payload = if self.is_leaf() {
            let data_size = repr.data_size.get() as usize;
            NodePayload::Value(&self.raw_data[off + NODE_REPR_SIZE + key_size..][..data_size])
        } else {
            NodePayload::Child(repr.page_number.get())
        };
        NodeRef { key, payload }
    }

    /// Heap bytes occupied by the node at `pos`, including padding
    pub(crate) fn node_size_at(&self, pos: usize) -> usize {
        let repr = self.node_repr_at(pos);
        let raw = NODE_REPR_SIZE + repr.key_size.get() as usize + repr.data_size.get() as usize;
        raw + (raw & 1)
    }

    pub(crate) fn node_size_for(key_len: usize, value_len: usize) -> usize {
        let raw = NODE_REPR_SIZE + key_len + value_len;
        raw + (raw & 1)
    }

    pub(crate) fn has_space_for(&self, key_len: usize, value_len: usize) -> bool {
        Self::node_size_for(key_len, value_len) + NODE_OFFSET_SIZE <= self.free_space()
    }

    /// Binary search for `key`. `Ok` is an exact match, `Err` the position
    /// where it would be inserted.
    #[inline]
    pub(crate) fn search(&self, key: &[u8], cmp: &dyn KeyComparer) -> Result<usize, usize> {
        self.position_for(&Slice::Key(key), cmp)
    }

    /// Sentinel aware binary search. `BeforeAllKeys` resolves to `Err(0)`
    /// and `AfterAllKeys` to `Err(num_entries)` without inspecting any keys.
    pub(crate) fn position_for(&self, target: &Slice, cmp: &dyn KeyComparer) -> Result<usize, usize> {
        let mut lo = 0usize;
        let mut hi = self.num_entries();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match target.compare(self.key_at(mid), cmp) {
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(lo)
    }

    /// Inserts a node at offset table position `pos`, shifting later entries.
    /// Fails with [Error::Capacity] if the node plus its table entry does not
    /// fit in the free space. Callers split the page instead of relying on
    /// this error.
    pub(crate) fn add_node(
        &mut self,
        pos: usize,
        key: &[u8],
        payload: NodePayload<'_>,
    ) -> Result<(), Error> {
        debug_assert!(pos <= self.num_entries());
        let (page_number, value): (PageId, &[u8]) = match payload {
            NodePayload::Child(id) => (id, &[]),
            NodePayload::Value(v) => (0, v),
        };
        let size = Self::node_size_for(key.len(), value.len());
        if size + NODE_OFFSET_SIZE > self.free_space() {
            return Err(error_capacity!(
                "node of size {} doesn't fit in page {} with {} bytes free",
                size,
                self.id(),
                self.free_space()
            ));
        }
        let header = self.header();
        let lower = header.lower.get() as usize;
        let upper = header.upper.get() as usize - size;
        let num_entries = header.num_entries.get();

        let repr = NodeRepr {
            page_number: page_number.into(),
            data_size: (value.len() as u32).into(),
            key_size: (key.len() as u16).into(),
        };
        let table_at = PAGE_HEADER_SIZE + pos * NODE_OFFSET_SIZE;
        let data = self.raw_data.as_mut();
        data.copy_within(table_at..lower, table_at + NODE_OFFSET_SIZE);
        data[table_at..table_at + NODE_OFFSET_SIZE].copy_from_slice(&(upper as u16).to_le_bytes());
        data[upper..upper + NODE_REPR_SIZE].copy_from_slice(repr.as_bytes());
        data[upper + NODE_REPR_SIZE..][..key.len()].copy_from_slice(key);
        data[upper + NODE_REPR_SIZE + key.len()..][..value.len()].copy_from_slice(value);

        let header = self.header_mut();
        header.lower = ((lower + NODE_OFFSET_SIZE) as u16).into();
        header.upper = (upper as u16).into();
        header.num_entries = (num_entries + 1).into();
        Ok(())
    }

    /// Removes the node at offset table position `pos`, compacting the heap
    /// so the freed bytes return to the free space.
    pub(crate) fn remove_node(&mut self, pos: usize) {
        debug_assert!(pos < self.num_entries());
        let off = self.offset_at(pos);
        let size = self.node_size_at(pos);
        let header = self.header();
        let lower = header.lower.get() as usize;
        let upper = header.upper.get() as usize;
        let num_entries = header.num_entries.get();

        let data = self.raw_data.as_mut();
        // Close the hole by sliding the heap below the removed node up
        data.copy_within(upper..off, upper + size);
        // Table entry removal, then fix offsets that pointed below the hole
        let table_at = PAGE_HEADER_SIZE + pos * NODE_OFFSET_SIZE;
        data.copy_within(table_at + NODE_OFFSET_SIZE..lower, table_at);
        for i in 0..num_entries as usize - 1 {
            let at = PAGE_HEADER_SIZE + i * NODE_OFFSET_SIZE;
            let o = u16::from_le_bytes(data[at..at + NODE_OFFSET_SIZE].try_into().unwrap());
            if (o as usize) < off {
                data[at..at + NODE_OFFSET_SIZE]
                    .copy_from_slice(&(o + size as u16).to_le_bytes());
            }
        }

        let header = self.header_mut();
        header.lower = ((lower - NODE_OFFSET_SIZE) as u16).into();
        header.upper = ((upper + size) as u16).into();
        header.num_entries = (num_entries - 1).into();
    }

    /// Rewrites the node at `pos` with an empty key, keeping its payload.
    /// Branch pages use this to turn their first entry into the implicit
    /// lowest key after a split.
    pub(crate) fn blank_key_at(&mut self, pos: usize) -> Result<(), Error> {
        // Removing first makes room, an empty key node always fits after
        let payload = match self.node_at(pos).payload {
            NodePayload::Child(id) => NodePayload::Child(id),
            NodePayload::Value(_) => NodePayload::Value(&[]),
        };
        self.remove_node(pos);
        self.add_node(pos, &[], payload)
    }

    /// Copies the node at `src_pos` of `src` to the end of this page
    pub(crate) fn copy_node_from(&mut self, src: &Page, src_pos: usize) -> Result<(), Error> {
        let node = src.node_at(src_pos);
        self.add_node(self.num_entries(), node.key, node.payload)
    }

    /// Drops every node at position `from` and above. Rebuilds the page so
    /// the surviving nodes are compact in the heap.
    pub(crate) fn truncate(&mut self, from: usize) -> Result<(), Error> {
        debug_assert!(from <= self.num_entries());
        let mut trimmed = Page::new(self.id(), self.flags());
        for i in 0..from {
            trimmed.copy_node_from(self, i)?;
        }
        *self = trimmed;
        Ok(())
    }

    /// Bounds and layout checks over the raw buffer. Every page coming out
    /// of the substrate passes through here before any positional read, so a
    /// corrupt offset table surfaces as [Error::Corruption] instead of a
    /// panic deeper in.
    fn check_structure(&self) -> Result<(), Error> {
        use crate::error::error_corruption;
        let header = self.header();
        let lower = header.lower.get() as usize;
        let upper = header.upper.get() as usize;
        let num_entries = self.num_entries();
        if lower != PAGE_HEADER_SIZE + num_entries * NODE_OFFSET_SIZE
            || lower > upper
            || upper > PAGE_SIZE
        {
            return Err(error_corruption!("page {} has invalid bounds", self.id()));
        }
        if self.is_leaf() == self.is_branch() {
            return Err(error_corruption!("page {} has invalid flags", self.id()));
        }
        let mut heap_bytes = 0;
        for pos in 0..num_entries {
            let off = self.offset_at(pos);
            // Reject the offset before node_size_at dereferences the repr
            if off < upper
                || off + NODE_REPR_SIZE > PAGE_SIZE
                || off + self.node_size_at(pos) > PAGE_SIZE
            {
                return Err(error_corruption!(
                    "page {} node {} is out of bounds",
                    self.id(),
                    pos
                ));
            }
            heap_bytes += self.node_size_at(pos);
        }
        if heap_bytes != PAGE_SIZE - upper
            || heap_bytes + num_entries * NODE_OFFSET_SIZE != self.occupied()
        {
            return Err(error_corruption!("page {} heap isn't compact", self.id()));
        }
        Ok(())
    }

    /// Checks the in-page invariants, used by tree validation and tests
    pub(crate) fn validate(&self, cmp: &dyn KeyComparer) -> Result<(), Error> {
        use crate::error::error_corruption;
        self.check_structure()?;
        for pos in 1..self.num_entries() {
            if cmp.compare(self.key_at(pos - 1), self.key_at(pos)) != Ordering::Less {
                return Err(error_corruption!(
                    "page {} keys out of order at {}",
                    self.id(),
                    pos
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id())
            .field("flags", &self.flags())
            .field("num_entries", &self.num_entries())
            .field("free_space", &self.free_space())
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::LexicographicComparer;

    const CMP: LexicographicComparer = LexicographicComparer;

    #[test]
    fn test_add_search_remove() {
        let mut page = Page::new(1, PageFlags::LEAF);
        for (i, key) in [b"b", b"d", b"f"].iter().enumerate() {
            page.add_node(i, *key, NodePayload::Value(b"v")).unwrap();
        }
        // Out of order table position insert
        page.add_node(1, b"c", NodePayload::Value(b"w")).unwrap();
        assert_eq!(page.num_entries(), 4);
        assert_eq!(page.search(b"c", &CMP), Ok(1));
        assert_eq!(page.search(b"a", &CMP), Err(0));
        assert_eq!(page.search(b"e", &CMP), Err(3));
        assert_eq!(page.search(b"g", &CMP), Err(4));
        page.validate(&CMP).unwrap();

        let free_before = page.free_space();
        page.remove_node(1);
        assert_eq!(page.num_entries(), 3);
        assert_eq!(page.search(b"c", &CMP), Err(1));
        assert_eq!(page.search(b"d", &CMP), Ok(1));
        assert!(page.free_space() > free_before);
        page.validate(&CMP).unwrap();
    }

    #[test]
    fn test_node_padding() {
        // Odd raw sizes round up to even
        assert_eq!(Page::node_size_for(1, 0) % 2, 0);
        assert_eq!(Page::node_size_for(1, 0), Page::node_size_for(2, 0));
        let mut page = Page::new(1, PageFlags::LEAF);
        page.add_node(0, b"a", NodePayload::Value(b"")).unwrap();
        assert_eq!(page.node_size_at(0), Page::node_size_for(1, 0));
    }

    #[test]
    fn test_capacity_error() {
        let mut page = Page::new(1, PageFlags::LEAF);
        let big = vec![0u8; 2000];
        page.add_node(0, b"a", NodePayload::Value(&big)).unwrap();
        page.add_node(1, b"b", NodePayload::Value(&big)).unwrap();
        assert!(!page.has_space_for(1, 2000));
        let err = page.add_node(2, b"c", NodePayload::Value(&big));
        assert!(matches!(err, Err(Error::Capacity(_))));
        // Page is unchanged after the failed add
        assert_eq!(page.num_entries(), 2);
        page.validate(&CMP).unwrap();
    }

    #[test]
    fn test_truncate() {
        let mut page = Page::new(1, PageFlags::LEAF);
        for i in 0..10u8 {
            page.add_node(i as usize, &[i], NodePayload::Value(b"value"))
                .unwrap();
        }
        let fresh_free = Page::new(1, PageFlags::LEAF).free_space();
        page.truncate(4).unwrap();
        assert_eq!(page.num_entries(), 4);
        assert_eq!(page.key_at(3), &[3u8]);
        assert_eq!(
            page.free_space(),
            fresh_free - 4 * (Page::node_size_for(1, 5) + NODE_OFFSET_SIZE)
        );
        page.validate(&CMP).unwrap();
    }

    #[test]
    fn test_branch_payload() {
        let mut page = Page::new(9, PageFlags::BRANCH);
        page.add_node(0, b"", NodePayload::Child(3)).unwrap();
        page.add_node(1, b"m", NodePayload::Child(4)).unwrap();
        assert!(matches!(page.node_at(0).payload, NodePayload::Child(3)));
        assert!(matches!(page.node_at(1).payload, NodePayload::Child(4)));
        page.validate(&CMP).unwrap();
    }

    #[test]
    fn test_from_bytes_rejects_corrupt_buffers() {
        let mut page = Page::new(1, PageFlags::LEAF);
        page.add_node(0, b"a", NodePayload::Value(b"v")).unwrap();
        assert!(Page::from_bytes(page.raw_data().clone()).is_ok());

        let short = Bytes::new_zeroed(PAGE_SIZE - 1);
        assert!(matches!(Page::from_bytes(short), Err(Error::Corruption(_))));

        // All zeroes fails the header bounds check
        let zeroed = Bytes::new_zeroed(PAGE_SIZE);
        assert!(matches!(Page::from_bytes(zeroed), Err(Error::Corruption(_))));

        // Offset table entry pointing past the end of the buffer
        let mut raw = page.raw_data().clone();
        raw.as_mut()[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + NODE_OFFSET_SIZE]
            .copy_from_slice(&u16::MAX.to_le_bytes());
        assert!(matches!(Page::from_bytes(raw), Err(Error::Corruption(_))));

        // Offset table entry pointing into the free space
        let mut raw = page.raw_data().clone();
        raw.as_mut()[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + NODE_OFFSET_SIZE]
            .copy_from_slice(&(PAGE_HEADER_SIZE as u16).to_le_bytes());
        assert!(matches!(Page::from_bytes(raw), Err(Error::Corruption(_))));

        // `lower` claiming fewer table entries than `num_entries`
        let mut raw = page.raw_data().clone();
        raw.as_mut()[4..6].copy_from_slice(&(PAGE_HEADER_SIZE as u16).to_le_bytes());
        assert!(matches!(Page::from_bytes(raw), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_blank_key_at() {
        let mut page = Page::new(9, PageFlags::BRANCH);
        page.add_node(0, b"k", NodePayload::Child(7)).unwrap();
        page.add_node(1, b"z", NodePayload::Child(8)).unwrap();
        page.blank_key_at(0).unwrap();
        assert_eq!(page.key_at(0), b"");
        assert!(matches!(page.node_at(0).payload, NodePayload::Child(7)));
        page.validate(&CMP).unwrap();
    }
}
