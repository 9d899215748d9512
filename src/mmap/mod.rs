use std::os::fd::{BorrowedFd, RawFd};
use std::ptr::addr_of_mut;
use std::sync::atomic::AtomicU64;

use arena::Arena;
use rb::Rb;
use tracing::debug;

use crate::error::Result;
use crate::ffi::{Metadata, PAGE_SIZE};

mod arena;
pub mod rb;

pub use rb::CowChunk;

/// Parameters shared by every ring-buffer of one mapping call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MmapParams {
    /// Protection flags: overwritable ring-buffers are mapped read-only.
    pub prot: i32,
    /// Bytes of one mapping, the metadata page included.
    pub len: usize,
    /// Mask over the data area.
    pub mask: usize,
}

impl MmapParams {
    pub fn new(len: usize) -> Self {
        Self {
            prot: libc::PROT_READ | libc::PROT_WRITE,
            len,
            mask: len.saturating_sub(*PAGE_SIZE + 1),
        }
    }
}

/// How ring-buffers get mapped.
///
/// The event list decides which buffers exist and who shares them,
/// implementations of this trait only back a buffer with memory.
pub trait MmapOps {
    /// Called once per region, before its events are walked.
    ///
    /// `per_cpu` tells if `idx` is a CPU index or a thread index.
    fn idx(&mut self, _mp: &mut MmapParams, _idx: usize, _per_cpu: bool) {}

    /// Maps `map` for `output`, the descriptor all events of the region write into.
    fn mmap(&mut self, map: &mut Mmap, mp: &MmapParams, output: BorrowedFd<'_>) -> Result<()>;
}

/// Maps the kernel ring-buffer of the output descriptor.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultOps;

impl MmapOps for DefaultOps {
    fn mmap(&mut self, map: &mut Mmap, mp: &MmapParams, output: BorrowedFd<'_>) -> Result<()> {
        map.map(mp, output)
    }
}

/// Reference to a ring-buffer inside the event list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MmapRef {
    pub overwrite: bool,
    pub idx: usize,
}

/// One ring-buffer, shared by every event of its region.
///
/// The reference count is explicit. Mapping sets it to 2: one reference for
/// the event that created the buffer, and one held back so the consumer can
/// still drain records after every producer went away, see
/// [`consume`][Self::consume]. Every event redirected into the buffer takes
/// one more. The buffer is unmapped when the count drops to zero.
#[derive(Debug)]
pub struct Mmap {
    idx: usize,
    overwrite: bool,
    refcnt: usize,
    next: Option<usize>,
    fd: Option<RawFd>,
    cpu: i32,
    arena: Option<Arena>,
}

impl Mmap {
    pub(crate) fn init(idx: usize, overwrite: bool) -> Self {
        Self {
            idx,
            overwrite,
            refcnt: 0,
            next: None,
            fd: None,
            cpu: -1,
            arena: None,
        }
    }

    /// Region index.
    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn refcnt(&self) -> usize {
        self.refcnt
    }

    /// Next ring-buffer in traversal order.
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    /// Descriptor the buffer is mapped for.
    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// CPU of the region, `-1` in per-thread mode.
    pub fn cpu(&self) -> i32 {
        self.cpu
    }

    pub fn is_mapped(&self) -> bool {
        self.refcnt > 0
    }

    pub(crate) fn to_ref(&self) -> MmapRef {
        MmapRef {
            overwrite: self.overwrite,
            idx: self.idx,
        }
    }

    /// Claims the buffer for `fd`, the first event of the region.
    pub(crate) fn setup(&mut self, fd: RawFd, cpu: i32) {
        self.refcnt = 2;
        self.fd = Some(fd);
        self.cpu = cpu;
    }

    /// Backs the buffer with the kernel ring-buffer of `fd`.
    pub fn map(&mut self, mp: &MmapParams, fd: BorrowedFd<'_>) -> Result<()> {
        self.arena = Some(Arena::new(fd, mp.len, mp.prot)?);
        Ok(())
    }

    pub(crate) fn get(&mut self) {
        self.refcnt += 1;
    }

    pub(crate) fn put(&mut self) {
        debug_assert!(self.refcnt > 0, "ring-buffer reference count underflow");
        self.refcnt = self.refcnt.saturating_sub(1);
        if self.refcnt == 0 {
            self.munmap();
        }
    }

    pub(crate) fn munmap(&mut self) {
        if self.fd.is_some() {
            debug!(idx = self.idx, overwrite = self.overwrite, "unmap ring-buffer");
        }
        self.arena = None;
        self.fd = None;
        self.refcnt = 0;
    }

    fn rb(&self) -> Option<Rb<'_>> {
        let alloc = self.arena.as_ref()?.as_slice();
        let metadata = alloc.as_ptr() as *mut Metadata;
        // The metadata page is shared with the kernel, positions must be accessed atomically.
        let (tail, head) = unsafe {
            (
                AtomicU64::from_ptr(addr_of_mut!((*metadata).data_tail)),
                AtomicU64::from_ptr(addr_of_mut!((*metadata).data_head)),
            )
        };
        // https://github.com/torvalds/linux/blob/v6.13/kernel/events/core.c#L6212
        Some(Rb::new(alloc.get(*PAGE_SIZE..)?, tail, head))
    }

    /// Pops the next raw record.
    ///
    /// Overwritable ring-buffers are written backward and can not be read this way.
    pub fn read_event(&self) -> Option<CowChunk<'_>> {
        if self.overwrite {
            return None;
        }
        self.rb()?.lending_pop()
    }

    pub fn is_empty(&self) -> bool {
        self.rb().map_or(true, |rb| rb.is_empty())
    }

    /// Drops the reference held back for draining once every producer is gone
    /// and no record is left.
    pub fn consume(&mut self) {
        if self.refcnt == 1 && self.is_empty() {
            self.put();
        }
    }
}

/// All ring-buffers of one mode, linked in region order.
#[derive(Debug)]
pub struct Mmaps {
    maps: Vec<Mmap>,
    first: Option<usize>,
}

impl Mmaps {
    pub(crate) fn alloc(nr: usize, overwrite: bool) -> Self {
        let mut maps: Vec<Mmap> = Vec::with_capacity(nr);
        for idx in 0..nr {
            if let Some(prev) = maps.last_mut() {
                prev.next = Some(idx);
            }
            maps.push(Mmap::init(idx, overwrite));
        }
        Self { maps, first: None }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Mmap> {
        self.maps.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Mmap> {
        self.maps.get_mut(idx)
    }

    /// First ring-buffer in traversal order, set once region 0 is mapped.
    pub fn first(&self) -> Option<usize> {
        self.first
    }

    pub(crate) fn set_first(&mut self, idx: usize) {
        self.first = Some(idx);
    }

    /// Walks the buffers in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = &Mmap> {
        let mut next = self.first;
        std::iter::from_fn(move || {
            let map = self.maps.get(next?)?;
            next = map.next;
            Some(map)
        })
    }

    /// Number of buffers currently mapped.
    pub fn nr_mapped(&self) -> usize {
        self.maps.iter().filter(|it| it.is_mapped()).count()
    }

    pub(crate) fn munmap(&mut self) {
        self.maps.iter_mut().for_each(Mmap::munmap);
    }
}
