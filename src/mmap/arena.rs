use std::io::Result;
use std::os::fd::BorrowedFd;
use std::ptr::NonNull;
use std::slice;

use tracing::warn;

use crate::ffi::syscall::{mmap, munmap};

pub struct Arena {
    ptr: NonNull<u8>,
    len: usize,
}

impl Arena {
    pub fn new(fd: BorrowedFd<'_>, len: usize, prot: i32) -> Result<Self> {
        // https://github.com/torvalds/linux/blob/v6.13/kernel/events/core.c#L6582
        let flags = libc::MAP_SHARED;
        let ptr = unsafe { mmap::<u8>(len, prot, flags, fd) }?;
        // `mmap` never returns a null pointer on success without `MAP_FIXED`.
        let ptr = NonNull::new(ptr).ok_or_else(|| std::io::Error::other("null mapping"))?;
        Ok(Self { ptr, len })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.ptr.as_ptr(), self.len) } {
            warn!(len = self.len, "failed to unmap arena: {}", e);
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
