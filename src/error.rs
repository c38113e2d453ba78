use crate::repr::PageId;
use derive_more::{Display, Error};
use std::io;

/// String like type that occupies the same space as one usize
type TinyStr = Box<String>;

#[allow(missing_docs)]
#[derive(Debug, Display, Error)]
#[display("{:?}", self)]
#[non_exhaustive]
pub enum Error {
    /// Invalid argument, e.g. an oversized key or value.
    Validation(#[error(not(source))] TinyStr),
    /// The tree structure is inconsistent. Must abort the enclosing
    /// transaction, never silently repaired.
    Corruption(#[error(not(source))] TinyStr),
    /// A node was added to a page without room for it. This is a
    /// caller contract violation, not a runtime user error.
    Capacity(#[error(not(source))] TinyStr),
    /// The substrate has no page under this number.
    PageNotFound(#[error(not(source))] PageId),
    Io(io::Error),
}

impl Error {
    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(Box::new(msg.into()))
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        let kind = match &value {
            Error::Io(i) => i.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, value)
    }
}

macro_rules! error_validation {
    ($($arg:tt)*) => {{
        let msg = ::std::fmt::format(::std::format_args!($($arg)*));
        crate::Error::Validation(msg.into())
    }}
}

macro_rules! error_corruption {
    ($($arg:tt)*) => {{
        let msg = ::std::fmt::format(::std::format_args!($($arg)*));
        crate::Error::Corruption(msg.into())
    }}
}

macro_rules! error_capacity {
    ($($arg:tt)*) => {{
        let msg = ::std::fmt::format(::std::format_args!($($arg)*));
        crate::Error::Capacity(msg.into())
    }}
}

pub(crate) use error_capacity;
pub(crate) use error_corruption;
pub(crate) use error_validation;
