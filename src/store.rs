use hashbrown::HashMap;

use crate::bytes::Bytes;
use crate::error::Error;
use crate::page::Page;
use crate::repr::{PageFlags, PageId};
use crate::PAGE_SIZE;

/// Paged storage substrate the tree runs on top of.
///
/// The substrate owns page allocation, copy-on-write and durability. During
/// a write operation the tree takes pages out of the substrate with
/// [PageStore::pop_page], mutates them in place and returns them with
/// [PageStore::stash_page]. A popped page must be a writable copy that is
/// exclusive to the current operation, so the substrate performs its
/// copy-on-write (if any) at pop time.
///
/// Implementations must be consistent: a stashed page is returned by later
/// reads and pops under its id until stashed again or reclaimed by the
/// substrate's own bookkeeping.
pub trait PageStore {
    /// Allocates a fresh writable page with the given flags under a new id
    fn allocate_page(&mut self, flags: PageFlags) -> Result<Page, Error>;

    /// Returns a read-only copy of the page
    fn read_page(&self, id: PageId) -> Result<Page, Error>;

    /// Takes the page out of the substrate for mutation
    fn pop_page(&mut self, id: PageId) -> Result<Page, Error>;

    /// Returns a page taken with [PageStore::pop_page] or created with
    /// [PageStore::allocate_page] back to the substrate
    fn stash_page(&mut self, page: Page) -> Result<(), Error>;
}

/// Heap backed substrate without durability, used by tests and as the
/// reference [PageStore] implementation.
#[derive(Debug, Default)]
pub struct MemPageStore {
    pages: HashMap<PageId, Bytes>,
    next_id: PageId,
}

impl MemPageStore {
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }
}

impl PageStore for MemPageStore {
    fn allocate_page(&mut self, flags: PageFlags) -> Result<Page, Error> {
        self.next_id += 1;
        Ok(Page::new(self.next_id, flags))
    }

    fn read_page(&self, id: PageId) -> Result<Page, Error> {
        let raw_data = self.pages.get(&id).ok_or(Error::PageNotFound(id))?;
        Page::from_bytes(raw_data.clone())
    }

    fn pop_page(&mut self, id: PageId) -> Result<Page, Error> {
        let raw_data = self.pages.remove(&id).ok_or(Error::PageNotFound(id))?;
        Page::from_bytes(raw_data)
    }

    fn stash_page(&mut self, page: Page) -> Result<(), Error> {
        debug_assert_eq!(page.raw_data().len(), PAGE_SIZE);
        self.pages.insert(page.id(), page.raw_data().clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_store_roundtrip() {
        let mut store = MemPageStore::default();
        let page = store.allocate_page(PageFlags::LEAF).unwrap();
        let id = page.id();
        assert!(page.is_dirty());
        store.stash_page(page).unwrap();
        assert_eq!(store.num_pages(), 1);
        let page = store.pop_page(id).unwrap();
        assert_eq!(store.num_pages(), 0);
        assert!(page.is_leaf());
        assert!(!page.is_dirty());
        store.stash_page(page).unwrap();
        assert!(store.read_page(id).unwrap().is_leaf());
        assert!(matches!(
            store.read_page(9999),
            Err(Error::PageNotFound(9999))
        ));
        assert!(matches!(
            store.pop_page(9999),
            Err(Error::PageNotFound(9999))
        ));
    }
}
