use std::borrow::{Borrow, Cow};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

/// Copy-on-write record.
///
/// Records that do not wrap around the end of the ring-buffer are borrowed in
/// place and release their space on drop, so drop them as early as possible
/// to keep the kernel from running out of room.
pub struct CowChunk<'a> {
    pub(in crate::mmap) tail: &'a AtomicU64,
    pub(in crate::mmap) new_tail: u64,
    pub(in crate::mmap) chunk: Cow<'a, [u8]>,
}

impl CowChunk<'_> {
    /// Record bytes, starting with the `perf_event_header`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.chunk
    }

    /// Record type from the header.
    pub fn ty(&self) -> u32 {
        match self.chunk.get(..4) {
            Some(ty) => u32::from_ne_bytes([ty[0], ty[1], ty[2], ty[3]]),
            None => 0,
        }
    }

    pub fn into_owned(mut self) -> Vec<u8> {
        match &mut self.chunk {
            Cow::Borrowed(b) => b.to_vec(),
            Cow::Owned(o) => mem::take(o),
        }
    }
}

impl Borrow<[u8]> for CowChunk<'_> {
    fn borrow(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl Drop for CowChunk<'_> {
    fn drop(&mut self) {
        if let Cow::Borrowed(_) = self.chunk {
            // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L723
            self.tail.store(self.new_tail, Ordering::Release);
        }
    }
}
