use triomphe::Arc;

/// Shared byte buffer
///
/// Roughly equivalent to an `Arc<Vec<u8>>` plus a sub-range, so that values
/// read out of a page can be returned without copying (see [Bytes::restrict]).
///
/// Implements `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`, `Borrow`,
/// `AsRef`, `Deref` as a `&[u8]`
#[derive(Clone)]
pub struct Bytes {
    backing: Arc<Vec<u8>>,
    start: usize,
    len: usize,
}

impl Bytes {
    pub(crate) fn new_zeroed(len: usize) -> Self {
        Self {
            backing: Arc::new(vec![0u8; len]),
            start: 0,
            len,
        }
    }

    /// Returns a `Bytes` over `reference`, which must point inside `self`.
    /// The backing buffer is shared, no bytes are copied.
    pub(crate) fn restrict(&self, reference: &[u8]) -> Self {
        let self_range = self.as_ref().as_ptr_range();
        let range = reference.as_ptr_range();
        if range.start < self_range.start || range.end > self_range.end {
            panic!("Invalid reference");
        }
        Self {
            backing: self.backing.clone(),
            start: self.start + (range.start as usize - self_range.start as usize),
            len: reference.len(),
        }
    }

    #[inline]
    pub(crate) fn as_mut(&mut self) -> &mut [u8] {
        self.make_unique();
        let start = self.start;
        let len = self.len;
        &mut Arc::get_mut(&mut self.backing).unwrap()[start..start + len]
    }

    #[inline]
    pub(crate) fn make_unique(&mut self) {
        if !self.is_unique() {
            #[cold]
            fn cold_make_unique(this: &mut Bytes) {
                this.backing = Arc::new(this.backing.as_ref().clone());
            }
            cold_make_unique(self);
        }
    }

    #[inline]
    pub(crate) fn is_unique(&self) -> bool {
        Arc::is_unique(&self.backing)
    }
}

impl std::fmt::Debug for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bytes({})", self.len)
    }
}

impl AsRef<[u8]> for Bytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.backing[self.start..self.start + self.len]
    }
}

impl std::ops::Deref for Bytes {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl std::borrow::Borrow<[u8]> for Bytes {
    #[inline]
    fn borrow(&self) -> &[u8] {
        self.as_ref()
    }
}

impl<T: AsRef<[u8]>> PartialEq<T> for Bytes {
    #[inline]
    fn eq(&self, other: &T) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl<T: AsRef<[u8]>> PartialOrd<T> for Bytes {
    #[inline]
    fn partial_cmp(&self, other: &T) -> Option<std::cmp::Ordering> {
        self.as_ref().partial_cmp(other.as_ref())
    }
}

impl std::cmp::Ord for Bytes {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_ref().cmp(other.as_ref())
    }
}

impl std::cmp::Eq for Bytes {}

impl std::hash::Hash for Bytes {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_ref().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_from(v: &[u8]) -> Bytes {
        let mut b = Bytes::new_zeroed(v.len());
        b.as_mut().copy_from_slice(v);
        b
    }

    #[test]
    fn test_shared_bytes() {
        let mut a = bytes_from(b"\x01");
        assert_eq!(a.len(), 1);
        assert_eq!(a[0], 1u8);
        a.as_mut().fill(0);
        assert_eq!(a[0], 0u8);
        assert!(a.is_unique());
        let b = a.clone();
        assert!(!a.is_unique());
        assert!(!b.is_unique());
        a.as_mut().fill(1);
        assert_eq!(a.as_ref(), b"\x01");
        assert_eq!(b.as_ref(), b"\0");
        assert!(a.is_unique());
    }

    #[test]
    fn test_restrict() {
        let a = bytes_from(b"hello world");
        let b = a.restrict(&a[6..]);
        assert_eq!(b.as_ref(), b"world");
        let c = b.restrict(&b[..0]);
        assert_eq!(c.as_ref(), b"");
    }

    #[test]
    #[should_panic(expected = "Invalid reference")]
    fn test_restrict_foreign() {
        let a = bytes_from(b"abc");
        a.restrict(b"xyz");
    }
}
