use crate::page::Page;
use crate::tree::TreeStats;

/// Stack of pages from the tree root down to the page a write operation is
/// positioned at. Pages on the stack are detached from the substrate and
/// owned by the operation until it stashes them back.
///
/// The cursor also accumulates the stats delta of the operation, which the
/// tree folds into its own stats when the operation commits.
pub struct Cursor {
    pages: Vec<Page>,
    pub(crate) stats: TreeStats,
}

impl Cursor {
    /// Starts an empty cursor over the tree the stats came from
    pub fn new(stats: TreeStats) -> Self {
        Cursor {
            pages: Vec::new(),
            stats,
        }
    }

    /// Stats of the tree including this operation's delta so far
    #[inline]
    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    #[inline]
    pub(crate) fn push(&mut self, page: Page) {
        self.pages.push(page);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<Page> {
        self.pages.pop()
    }

    /// The page at the top of the stack, the deepest one visited, or `None`
    /// if the cursor hasn't been positioned yet
    #[inline]
    pub fn current(&self) -> Option<&Page> {
        self.pages.last()
    }

    /// Callers hold a non-empty stack, descent pushes the root before any use
    #[inline]
    pub(crate) fn current_mut(&mut self) -> &mut Page {
        self.pages.last_mut().unwrap()
    }

    /// Number of pages on the stack
    #[inline]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Records a freshly allocated page in the stats delta
    pub(crate) fn record_new_page(&mut self, page: &Page) {
        self.stats.page_count += 1;
        if page.is_leaf() {
            self.stats.leaf_pages += 1;
        } else if page.is_branch() {
            self.stats.branch_pages += 1;
        } else {
            self.stats.overflow_pages += 1;
        }
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("pages", &self.pages)
            .field("stats", &self.stats)
            .finish()
    }
}
