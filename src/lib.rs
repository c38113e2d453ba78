//! # Pagetree
//!
//! A copy-on-write B+Tree page index engine. It maps variable length byte
//! keys to variable length values over fixed size pages obtained from an
//! external paged storage substrate (see [PageStore]).
//!
//! The crate owns the tree structure only: descent, in-place page mutation
//! and page splitting. Page allocation, copy-on-write, durability and
//! transaction coordination belong to the substrate. The substrate must
//! guarantee a single active write operation per tree; read-only lookups
//! over an immutable snapshot may run concurrently.
//!
//! ```
//! use pagetree::{LexicographicComparer, MemPageStore, Tree};
//!
//! let mut store = MemPageStore::default();
//! let mut tree =
//!     Tree::create_or_open(&mut store, None, Box::new(LexicographicComparer)).unwrap();
//! tree.add(&mut store, b"k", b"v").unwrap();
//! assert_eq!(tree.get(&store, b"k").unwrap().unwrap().as_ref(), b"v");
//! ```

mod bytes;
mod cursor;
mod error;
mod page;
mod repr;
mod slice;
mod splitter;
mod store;
mod tree;
mod utils;


pub use crate::{
    bytes::Bytes,
    cursor::Cursor,
    error::Error,
    page::{NodePayload, NodeRef, Page},
    repr::{PageFlags, PageId},
    slice::{KeyComparer, LexicographicComparer, Slice},
    store::{MemPageStore, PageStore},
    tree::{Tree, TreeStats},
};

/// Size in bytes of every page handed out by the substrate.
pub const PAGE_SIZE: usize = 4096;

/// Byte budget available to nodes plus the offset table on a single page.
pub const PAGE_MAX_SPACE: usize = PAGE_SIZE - crate::repr::PAGE_HEADER_SIZE;
