//! Page split handling for inserts that don't fit.
//!
//! A split pops the full page off the cursor, allocates a right sibling,
//! moves the upper half of the entries there and inserts a separator entry
//! for the sibling into the parent. When the parent is full as well the
//! separator becomes the pending entry of the next loop iteration, so splits
//! cascade up the cursor one level at a time. Splitting the root allocates a
//! new branch root seeded with an empty key entry for the old root, growing
//! the tree one level.
//!
//! Branch pages keep an empty key in their first entry. The separator that
//! divides a split branch page from its right sibling lives in the parent
//! only, so the sibling's first key is blanked after the move.

use std::borrow::Cow;

use log::trace;

use crate::cursor::Cursor;
use crate::error::{error_corruption, Error};
use crate::page::{NodePayload, Page};
use crate::repr::{PageFlags, PageId, NODE_OFFSET_SIZE};
use crate::slice::KeyComparer;
use crate::store::PageStore;
use crate::utils::EscapedBytes;
use crate::PAGE_MAX_SPACE;

pub(crate) struct PageSplitter<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
    /// Insert position of `key` in the full leaf at the top of the cursor
    pub current_index: usize,
}

impl PageSplitter<'_> {
    pub(crate) fn execute<S: PageStore>(
        self,
        store: &mut S,
        cursor: &mut Cursor,
        cmp: &dyn KeyComparer,
    ) -> Result<(), Error> {
        let mut pending_key = Cow::Borrowed(self.key);
        let mut pending_child: Option<PageId> = None;
        let mut current_index = self.current_index;
        // Receiving halves in bottom-up order, pushed back to the cursor
        // once the cascade settles
        let mut path_tail = Vec::new();
        loop {
            let mut page = cursor
                .pop()
                .ok_or_else(|| Error::corruption("split cascade ran out of cursor pages"))?;
            if cursor.len() == 0 {
                // Root split, the tree grows one level
                let mut root = store.allocate_page(PageFlags::BRANCH)?;
                cursor.record_new_page(&root);
                root.add_node(0, &[], NodePayload::Child(page.id()))?;
                cursor.stats.root = root.id();
                cursor.stats.depth += 1;
                trace!("split grew new root {} over page {}", root.id(), page.id());
                cursor.push(root);
            }
            let mut right = store.allocate_page(page.flags())?;
            cursor.record_new_page(&right);

            let num_entries = page.num_entries();
            let mut split_index = num_entries / 2;
            let mut new_position = current_index >= split_index;
            if page.is_leaf() {
                split_index = adjust_split_position(
                    &page,
                    pending_key.len(),
                    self.value.len(),
                    current_index,
                    split_index,
                    &mut new_position,
                );
            }
            // When the pending entry lands exactly on the split point it
            // becomes the separator itself and moves to the right sibling
            let sep_from_pending = current_index == split_index && new_position;
            let separator = if sep_from_pending {
                pending_key.to_vec()
            } else {
                page.key_at(split_index).to_vec()
            };
            trace!(
                "splitting page {} at {} of {} (separator {:?}, sibling {})",
                page.id(),
                split_index,
                num_entries,
                EscapedBytes(&separator),
                right.id()
            );

            for i in split_index..num_entries {
                right.copy_node_from(&page, i)?;
            }
            page.truncate(split_index)?;
            if page.is_branch() {
                // The separator moved up to the parent, the sibling's first
                // child covers everything below the next key
                if sep_from_pending {
                    right.add_node(
                        0,
                        &[],
                        NodePayload::Child(pending_child.ok_or_else(|| {
                            Error::corruption("leaf split can't seed a branch sibling")
                        })?),
                    )?;
                } else {
                    right.blank_key_at(0)?;
                }
            }

            let payload = match pending_child {
                Some(id) => NodePayload::Child(id),
                None => NodePayload::Value(self.value),
            };
            let insert_right = current_index > split_index || sep_from_pending;
            let right_id = right.id();
            let receiving = if insert_right {
                // The branch sep_from_pending entry was added above already
                if !(right.is_branch() && sep_from_pending) {
                    let pos = match right.search(&pending_key, cmp) {
                        Err(pos) => pos,
                        Ok(_) => {
                            return Err(error_corruption!(
                                "key {:?} already present in sibling {}",
                                EscapedBytes(&pending_key),
                                right_id
                            ))
                        }
                    };
                    right.add_node(pos, &pending_key, payload)?;
                }
                store.stash_page(page)?;
                right
            } else {
                page.add_node(current_index, &pending_key, payload)?;
                store.stash_page(right)?;
                page
            };
            path_tail.push(receiving);

            let parent = cursor.current_mut();
            let parent_pos = match parent.search(&separator, cmp) {
                Err(pos) => pos,
                Ok(_) => {
                    return Err(error_corruption!(
                        "separator {:?} already present in parent {}",
                        EscapedBytes(&separator),
                        parent.id()
                    ))
                }
            };
            if parent.has_space_for(separator.len(), 0) {
                parent.add_node(parent_pos, &separator, NodePayload::Child(right_id))?;
                break;
            }
            // Parent is full, the separator cascades up as the new pending
            pending_key = Cow::Owned(separator);
            pending_child = Some(right_id);
            current_index = parent_pos;
        }

        for page in path_tail.into_iter().rev() {
            cursor.push(page);
        }
        Ok(())
    }
}

/// Picks the actual split index around the naive middle so that the half
/// receiving the pending entry is guaranteed to fit it. Matters when entries
/// are large relative to the page, where splitting at the middle entry count
/// can leave either half short on bytes.
fn adjust_split_position(
    page: &Page,
    key_len: usize,
    value_len: usize,
    current_index: usize,
    split_index: usize,
    new_position: &mut bool,
) -> usize {
    let node_size = Page::node_size_for(key_len, value_len) + NODE_OFFSET_SIZE;
    if page.num_entries() >= 20 && node_size <= PAGE_MAX_SPACE / 16 {
        return split_index;
    }

    let mut page_size = node_size;
    if current_index <= split_index {
        *new_position = false;
        for i in 0..split_index {
            page_size += page.node_size_at(i) + NODE_OFFSET_SIZE;
            if page_size > PAGE_MAX_SPACE {
                if i <= current_index {
                    if i < current_index {
                        *new_position = true;
                    }
                    return current_index;
                }
                return i;
            }
        }
    } else {
        for i in (split_index..page.num_entries()).rev() {
            page_size += page.node_size_at(i) + NODE_OFFSET_SIZE;
            if page_size > PAGE_MAX_SPACE {
                if i >= current_index {
                    *new_position = false;
                    return current_index;
                }
                return i + 1;
            }
        }
    }
    split_index
}
