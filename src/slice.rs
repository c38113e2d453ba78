use std::cmp::Ordering;

use crate::utils::EscapedBytes;

/// Search target for tree descent. The sentinels compare below and above
/// every key without consulting the comparer, which lets callers position a
/// cursor at either end of the tree.
#[derive(Clone, Copy)]
pub enum Slice<'a> {
    /// Sorts before every key
    BeforeAllKeys,
    Key(&'a [u8]),
    /// Sorts after every key
    AfterAllKeys,
}

impl Slice<'_> {
    /// Compares against a stored key. The sentinels resolve without
    /// inspecting any bytes.
    pub fn compare(&self, other: &[u8], cmp: &dyn KeyComparer) -> Ordering {
        match self {
            Slice::BeforeAllKeys => Ordering::Less,
            Slice::Key(key) => cmp.compare(key, other),
            Slice::AfterAllKeys => Ordering::Greater,
        }
    }
}

impl<'a> From<&'a [u8]> for Slice<'a> {
    #[inline]
    fn from(key: &'a [u8]) -> Self {
        Slice::Key(key)
    }
}

impl std::fmt::Debug for Slice<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slice::BeforeAllKeys => write!(f, "BeforeAllKeys"),
            Slice::Key(key) => write!(f, "Key({:?})", EscapedBytes(key)),
            Slice::AfterAllKeys => write!(f, "AfterAllKeys"),
        }
    }
}

/// Key ordering used by a [Tree](crate::Tree). All pages of a tree must be
/// ordered by the same comparer for its lifetime.
pub trait KeyComparer {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain unsigned byte wise ordering
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicographicComparer;

impl KeyComparer for LexicographicComparer {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_ordering() {
        let cmp = LexicographicComparer;
        assert_eq!(Slice::BeforeAllKeys.compare(b"", &cmp), Ordering::Less);
        assert_eq!(Slice::BeforeAllKeys.compare(b"a", &cmp), Ordering::Less);
        assert_eq!(Slice::AfterAllKeys.compare(b"\xff\xff", &cmp), Ordering::Greater);
        assert_eq!(Slice::Key(b"b").compare(b"a", &cmp), Ordering::Greater);
        assert_eq!(Slice::Key(b"b").compare(b"b", &cmp), Ordering::Equal);
        assert_eq!(Slice::Key(b"b").compare(b"c", &cmp), Ordering::Less);
    }
}

