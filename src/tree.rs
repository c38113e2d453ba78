use log::trace;

use crate::bytes::Bytes;
use crate::cursor::Cursor;
use crate::error::{error_corruption, error_validation, Error};
use crate::page::{NodePayload, Page};
use crate::repr::{PageFlags, PageId, NODE_OFFSET_SIZE};
use crate::slice::{KeyComparer, Slice};
use crate::splitter::PageSplitter;
use crate::store::PageStore;
use crate::utils::EscapedBytes;
use crate::PAGE_MAX_SPACE;

/// Structural counters of a [Tree]. `root` and `depth` are load bearing,
/// the page counters are informational.
///
/// The substrate persists this (at minimum `root`) between sessions and
/// hands it back via [Tree::create_or_open].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub root: PageId,
    pub depth: u32,
    pub page_count: u64,
    pub branch_pages: u64,
    pub leaf_pages: u64,
    pub overflow_pages: u64,
}

/// A copy-on-write B+Tree of byte string keys to byte string values over
/// pages owned by a [PageStore].
///
/// The tree requires external coordination, a single write operation
/// (`add`/`delete`) may run at a time. `get` only needs `&self` and a shared
/// snapshot of the store.
pub struct Tree {
    stats: TreeStats,
    cmp: Box<dyn KeyComparer + Send + Sync>,
}

impl Tree {
    /// Opens the tree rooted at `root`, or creates an empty tree when `root`
    /// is `None`. Opening walks the tree once to rebuild [TreeStats].
    pub fn create_or_open<S: PageStore>(
        store: &mut S,
        root: Option<PageId>,
        cmp: Box<dyn KeyComparer + Send + Sync>,
    ) -> Result<Tree, Error> {
        let stats = match root {
            None => {
                let page = store.allocate_page(PageFlags::LEAF)?;
                let stats = TreeStats {
                    root: page.id(),
                    depth: 1,
                    page_count: 1,
                    leaf_pages: 1,
                    ..Default::default()
                };
                trace!("created empty tree with root {}", page.id());
                store.stash_page(page)?;
                stats
            }
            Some(root) => Self::walk_stats(store, root)?,
        };
        Ok(Tree { stats, cmp })
    }

    fn walk_stats<S: PageStore>(store: &S, root: PageId) -> Result<TreeStats, Error> {
        let mut stats = TreeStats {
            root,
            ..Default::default()
        };
        let mut stack = vec![(root, 1u32)];
        while let Some((id, level)) = stack.pop() {
            let page = store.read_page(id)?;
            stats.page_count += 1;
            if page.is_branch() {
                stats.branch_pages += 1;
                for pos in 0..page.num_entries() {
                    match page.node_at(pos).payload {
                        NodePayload::Child(child) => stack.push((child, level + 1)),
                        NodePayload::Value(_) => {
                            return Err(error_corruption!(
                                "branch page {id} holds a value payload"
                            ))
                        }
                    }
                }
            } else if page.is_leaf() {
                stats.leaf_pages += 1;
                if stats.depth == 0 {
                    stats.depth = level;
                } else if stats.depth != level {
                    return Err(error_corruption!(
                        "leaf page {id} at level {level}, expected {}",
                        stats.depth
                    ));
                }
            } else {
                return Err(error_corruption!("page {id} is neither leaf nor branch"));
            }
        }
        Ok(stats)
    }

    #[inline]
    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    #[inline]
    pub fn root(&self) -> PageId {
        self.stats.root
    }

    /// Walks from the root to the leaf that covers `key`, popping every page
    /// on the path onto `cursor`. Returns the key's position in that leaf,
    /// `Ok` for an exact match and `Err` for the insert position.
    ///
    /// The pages on the cursor are detached from the store until returned
    /// with [Tree::apply], which callers must do even when they end up not
    /// mutating anything.
    pub fn find_page_for<S: PageStore>(
        &self,
        store: &mut S,
        key: &Slice,
        cursor: &mut Cursor,
    ) -> Result<Result<usize, usize>, Error> {
        let mut page = store.pop_page(self.stats.root)?;
        while page.is_branch() {
            if page.num_entries() == 0 {
                return Err(error_corruption!("branch page {} is empty", page.id()));
            }
            let pos = match key {
                Slice::BeforeAllKeys => 0,
                Slice::AfterAllKeys => page.num_entries() - 1,
                Slice::Key(key) => match page.search(key, &*self.cmp) {
                    Ok(pos) => pos,
                    // The first entry key is empty and sorts before
                    // everything, so 0 means the page lost it
                    Err(0) => {
                        return Err(error_corruption!(
                            "branch page {} is missing its leading empty key",
                            page.id()
                        ))
                    }
                    Err(pos) => pos - 1,
                },
            };
            let child = match page.node_at(pos).payload {
                NodePayload::Child(child) => child,
                NodePayload::Value(_) => {
                    return Err(error_corruption!(
                        "branch page {} holds a value payload",
                        page.id()
                    ))
                }
            };
            cursor.push(page);
            page = store.pop_page(child)?;
        }
        if !page.is_leaf() {
            return Err(error_corruption!(
                "search for {key:?} ended on non leaf page {}",
                page.id()
            ));
        }
        let result = page.position_for(key, &*self.cmp);
        cursor.push(page);
        Ok(result)
    }

    /// Inserts `key` with `value`, replacing the previous value if any.
    pub fn add<S: PageStore>(
        &mut self,
        store: &mut S,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), Error> {
        trace!(
            "add {:?} ({} value bytes) to tree {}",
            EscapedBytes(key),
            value.len(),
            self.stats.root
        );
        if key.is_empty() || key.len() > u16::MAX as usize {
            return Err(error_validation!("invalid key size {}", key.len()));
        }
        if value.len() > i32::MAX as usize {
            return Err(error_validation!("invalid value size {}", value.len()));
        }
        // A node must fit a fresh page by itself, multi page values aren't
        // supported
        let node_size = Page::node_size_for(key.len(), value.len()) + NODE_OFFSET_SIZE;
        if node_size > PAGE_MAX_SPACE {
            return Err(error_validation!(
                "key and value sizes {}/{} exceed the page node capacity",
                key.len(),
                value.len()
            ));
        }

        let mut cursor = Cursor::new(self.stats);
        let found = self.find_page_for(store, &Slice::Key(key), &mut cursor)?;
        let page = cursor.current_mut();
        let pos = match found {
            Ok(pos) => {
                // Updates are a remove plus insert
                page.remove_node(pos);
                pos
            }
            Err(pos) => pos,
        };
        let mut split = false;
        if page.has_space_for(key.len(), value.len()) {
            page.add_node(pos, key, NodePayload::Value(value))?;
        } else {
            split = true;
            let splitter = PageSplitter {
                key,
                value,
                current_index: pos,
            };
            splitter.execute(store, &mut cursor, &*self.cmp)?;
        }
        self.apply(store, cursor)?;
        if split && cfg!(debug_assertions) {
            self.validate(store)?;
        }
        Ok(())
    }

    /// Removes `key`. Deleting an absent key is a no-op.
    pub fn delete<S: PageStore>(&mut self, store: &mut S, key: &[u8]) -> Result<(), Error> {
        trace!("delete {:?} from tree {}", EscapedBytes(key), self.stats.root);
        let mut cursor = Cursor::new(self.stats);
        let found = self.find_page_for(store, &Slice::Key(key), &mut cursor)?;
        if let Ok(pos) = found {
            cursor.current_mut().remove_node(pos);
        }
        // Pages always return to the store, even on the no-op path
        self.apply(store, cursor)
    }

    /// Returns the value under `key`, sharing the page buffer instead of
    /// copying it out.
    pub fn get<S: PageStore>(&self, store: &S, key: &[u8]) -> Result<Option<Bytes>, Error> {
        let mut page = store.read_page(self.stats.root)?;
        while page.is_branch() {
            let pos = match page.search(key, &*self.cmp) {
                Ok(pos) => pos,
                Err(0) => {
                    return Err(error_corruption!(
                        "branch page {} is missing its leading empty key",
                        page.id()
                    ))
                }
                Err(pos) => pos - 1,
            };
            match page.node_at(pos).payload {
                NodePayload::Child(child) => page = store.read_page(child)?,
                NodePayload::Value(_) => {
                    return Err(error_corruption!(
                        "branch page {} holds a value payload",
                        page.id()
                    ))
                }
            }
        }
        match page.search(key, &*self.cmp) {
            Ok(pos) => match page.node_at(pos).payload {
                NodePayload::Value(value) => Ok(Some(page.raw_data().restrict(value))),
                NodePayload::Child(_) => Err(error_corruption!(
                    "leaf page {} holds a child payload",
                    page.id()
                )),
            },
            Err(_) => Ok(None),
        }
    }

    /// Stashes the operation's page stack back into the store and commits
    /// the stats delta.
    pub fn apply<S: PageStore>(&mut self, store: &mut S, mut cursor: Cursor) -> Result<(), Error> {
        while let Some(page) = cursor.pop() {
            store.stash_page(page)?;
        }
        self.stats = cursor.stats;
        Ok(())
    }

    /// Checks the tree structural invariants, leaf balance, per-page key
    /// order and space bounds, branch sentinel keys and the stats counters.
    pub fn validate<S: PageStore>(&self, store: &S) -> Result<(), Error> {
        let mut counted = TreeStats {
            root: self.stats.root,
            depth: self.stats.depth,
            ..Default::default()
        };
        let mut stack = vec![(self.stats.root, 1u32)];
        while let Some((id, level)) = stack.pop() {
            let page = store.read_page(id)?;
            page.validate(&*self.cmp)?;
            counted.page_count += 1;
            if page.is_branch() {
                counted.branch_pages += 1;
                if level >= self.stats.depth {
                    return Err(error_corruption!("branch page {id} at leaf level"));
                }
                if page.num_entries() == 0 || !page.key_at(0).is_empty() {
                    return Err(error_corruption!(
                        "branch page {id} is missing its leading empty key"
                    ));
                }
                for pos in 0..page.num_entries() {
                    match page.node_at(pos).payload {
                        NodePayload::Child(child) => stack.push((child, level + 1)),
                        NodePayload::Value(_) => {
                            return Err(error_corruption!(
                                "branch page {id} holds a value payload"
                            ))
                        }
                    }
                }
            } else {
                counted.leaf_pages += 1;
                if level != self.stats.depth {
                    return Err(error_corruption!(
                        "leaf page {id} at level {level}, expected {}",
                        self.stats.depth
                    ));
                }
            }
        }
        if counted != self.stats {
            return Err(error_corruption!(
                "stats mismatch, counted {counted:?} but tracking {:?}",
                self.stats
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").field("stats", &self.stats).finish()
    }
}
