use std::io;

use thiserror::Error;

/// Errors reported by the event list and its ring buffers.
///
/// Each variant maps to the errno a C caller would expect,
/// see [`errno`][Error::errno].
#[derive(Debug, Error)]
pub enum Error {
    /// The request was malformed, nothing was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A fixed-capacity table ran out of room or an allocation failed.
    #[error("out of memory: {0}")]
    NoMemory(&'static str),

    /// The kernel rejected the operation.
    #[error(transparent)]
    Os(#[from] io::Error),
}

impl Error {
    /// Negative errno of this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -libc::EINVAL,
            Self::NoMemory(_) => -libc::ENOMEM,
            Self::Os(e) => -e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
