use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

pub use cow::CowChunk;

mod cow;

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L824
// struct perf_event_header {
//     u32 type; # 4 bytes
//     u16 misc; # 2 bytes
//     u16 size; # 2 bytes
// };
const SIZE_OFFSET: u64 = 6;

/// Data area of a ring-buffer, read forward from `tail` up to `head`.
///
/// Both positions are free-running byte counters, as the kernel keeps them.
pub(super) struct Rb<'a> {
    alloc: &'a [u8],
    tail: &'a AtomicU64,
    head: &'a AtomicU64,
}

impl<'a> Rb<'a> {
    pub fn new(alloc: &'a [u8], tail: &'a AtomicU64, head: &'a AtomicU64) -> Self {
        Self { alloc, tail, head }
    }

    fn size(&self) -> u64 {
        self.alloc.len() as u64
    }

    /// Copies `len` bytes starting at ring offset `at`, wrapping at the end.
    fn copy_wrapped(&self, at: u64, len: u64) -> Vec<u8> {
        let at = at as usize;
        let len = len as usize;
        let hi = &self.alloc[at..self.alloc.len().min(at + len)];
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(hi);
        buf.extend_from_slice(&self.alloc[..len - hi.len()]);
        buf
    }

    fn record_len(&self, at: u64) -> u64 {
        let size = self.size();
        let lo = (at + SIZE_OFFSET) % size;
        let hi = (at + SIZE_OFFSET + 1) % size;
        u16::from_ne_bytes([self.alloc[lo as usize], self.alloc[hi as usize]]) as u64
    }

    pub fn is_empty(&self) -> bool {
        // The tail is only written from this side.
        let tail = self.tail.load(Ordering::Relaxed);
        tail == self.head.load(Ordering::Acquire)
    }

    /// Pops the next record, header included.
    pub fn lending_pop(&self) -> Option<CowChunk<'a>> {
        let size = self.size();
        let tail = self.tail.load(Ordering::Relaxed);
        // About acquire:
        // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L720
        // https://github.com/torvalds/linux/blob/v6.13/kernel/events/ring_buffer.c#L99
        let head = self.head.load(Ordering::Acquire);
        if size == 0 || head.wrapping_sub(tail) < SIZE_OFFSET + 2 {
            return None;
        }

        let at = tail % size;
        let len = self.record_len(at);
        // A zero-sized header would never advance the tail.
        if len == 0 || len > head.wrapping_sub(tail) {
            return None;
        }
        let new_tail = tail.wrapping_add(len);

        let chunk = if at + len <= size {
            let alloc: &'a [u8] = self.alloc;
            Cow::Borrowed(&alloc[at as usize..(at + len) as usize])
        } else {
            let buf = self.copy_wrapped(at, len);
            // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L723
            self.tail.store(new_tail, Ordering::Release);
            Cow::Owned(buf)
        };

        Some(CowChunk {
            tail: self.tail,
            new_tail,
            chunk,
        })
    }
}
