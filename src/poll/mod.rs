use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::thread;
use std::time::Duration;

use arrayvec::ArrayVec;
use libc::epoll_event;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ffi::syscall::{epoll_create1, epoll_ctl, epoll_wait};
use crate::mmap::MmapRef;

#[cfg(test)]
mod test;

/// Most events reported by a single wait.
pub const MAX_EVENTS: usize = 64;

/// Outcome of waiting for ring-buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Number of ready descriptors, 0 on timeout.
    Ready(usize),
    /// Every registered descriptor hung up, there is nothing left to wait for.
    Exhausted,
}

/// A descriptor registered for readiness.
#[derive(Clone, Copy, Debug)]
pub struct Registration<'a> {
    /// Slot in the registration table, stable until teardown.
    pub slot: usize,
    pub fd: BorrowedFd<'a>,
    /// Interest mask, `EPOLLERR | EPOLLHUP | EPOLLET` included.
    pub events: u32,
    pub mmap: MmapRef,
}

#[derive(Debug)]
struct Entry {
    fd: RawFd,
    events: u32,
    // `None` once evicted.
    mmap: Option<MmapRef>,
    // Buffer references released on eviction.
    refs: usize,
}

struct Epoll {
    fd: OwnedFd,
    events: Vec<epoll_event>,
}

impl std::fmt::Debug for Epoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Epoll").field("fd", &self.fd).finish()
    }
}

#[derive(Debug)]
enum Ctx {
    // The epoll instance is created with the first registration.
    Owned(Option<Epoll>),
    External,
}

pub(crate) enum Waited {
    /// No epoll instance to wait on, slept for the timeout instead.
    Slept,
    Exhausted,
    Events(ArrayVec<(usize, u32), MAX_EVENTS>),
}

/// Readiness multiplexer over the descriptors of mapped ring-buffers.
///
/// Either owns an epoll instance and waits on it, or, if
/// [external][Self::set_external], only keeps the registration table so the
/// caller can hand the descriptors to its own event loop.
#[derive(Debug, Default)]
pub struct Poll {
    external: bool,
    ctx: Option<Ctx>,
    entries: Vec<Entry>,
    cap: usize,
    nr: usize,
}

impl Poll {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chooses who waits on the descriptors. Takes effect on the next allocation.
    pub fn set_external(&mut self, external: bool) {
        self.external = external;
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Returns true if the live registration table is left to the caller.
    ///
    /// Unlike [`is_external`][Self::is_external], this reflects the mode the
    /// table was allocated in, not the one the next allocation will use.
    pub fn polled_externally(&self) -> bool {
        matches!(self.ctx, Some(Ctx::External))
    }

    pub fn is_alloc(&self) -> bool {
        self.ctx.is_some()
    }

    /// Number of live registrations.
    pub fn nr(&self) -> usize {
        self.nr
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Sets up the registration table for at most `cap` descriptors.
    pub(crate) fn alloc(&mut self, cap: usize) {
        self.ctx = Some(match self.external {
            true => Ctx::External,
            false => Ctx::Owned(None),
        });
        self.entries = Vec::with_capacity(cap);
        self.cap = cap;
        self.nr = 0;
    }

    /// Registers `fd` for `revent`, holding one reference to `mmap`.
    pub(crate) fn add(&mut self, fd: BorrowedFd<'_>, revent: u32, mmap: MmapRef) -> Result<usize> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or(Error::InvalidArgument("registration table is not allocated"))?;
        if self.entries.len() == self.cap {
            return Err(Error::NoMemory("registration table is full"));
        }

        let slot = self.entries.len();
        let events = revent | (libc::EPOLLERR | libc::EPOLLHUP | libc::EPOLLET) as u32;

        if let Ctx::Owned(epoll) = ctx {
            if epoll.is_none() {
                *epoll = Some(Epoll {
                    fd: epoll_create1(libc::EPOLL_CLOEXEC)?,
                    events: Vec::with_capacity(MAX_EVENTS),
                });
            }
            let Some(epoll) = epoll else {
                return Err(Error::InvalidArgument("no epoll instance"));
            };
            let mut event = epoll_event {
                events,
                u64: slot as _,
            };
            epoll_ctl(epoll.fd.as_fd(), libc::EPOLL_CTL_ADD, fd, Some(&mut event))?;
        }

        self.entries.push(Entry {
            fd: fd.as_raw_fd(),
            events,
            mmap: Some(mmap),
            refs: 1,
        });
        self.nr += 1;
        Ok(slot)
    }

    /// Makes the registration at `slot` release one more buffer reference on eviction.
    pub(crate) fn attach(&mut self, slot: usize) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.refs += 1;
        }
    }

    pub(crate) fn mmap_of(&self, slot: usize) -> Option<MmapRef> {
        self.entries.get(slot)?.mmap
    }

    /// Evicts the registration at `slot`.
    ///
    /// Returns the buffer and the number of references to release on it.
    pub(crate) fn del(&mut self, slot: usize) -> Option<(MmapRef, usize)> {
        let entry = self.entries.get_mut(slot)?;
        let mmap = entry.mmap.take()?;
        let refs = entry.refs;

        if let Some(Ctx::Owned(Some(epoll))) = &self.ctx {
            // Registered descriptors belong to open events, which stay open
            // until the registration table is torn down.
            let fd = unsafe { BorrowedFd::borrow_raw(entry.fd) };
            if let Err(e) = epoll_ctl(epoll.fd.as_fd(), libc::EPOLL_CTL_DEL, fd, None) {
                warn!(fd = entry.fd, "failed to disarm descriptor: {}", e);
            }
        }
        self.nr -= 1;
        debug!(slot, fd = entry.fd, live = self.nr, "evict registration");

        Some((mmap, refs))
    }

    pub(crate) fn wait(&mut self, timeout: i32) -> Result<Waited> {
        let epoll = match &mut self.ctx {
            Some(Ctx::External) => {
                return Err(Error::InvalidArgument("descriptors are polled externally"))
            }
            Some(Ctx::Owned(Some(epoll))) => epoll,
            // Nothing was ever registered.
            Some(Ctx::Owned(None)) | None => {
                return match timeout {
                    t if t < 0 => Ok(Waited::Exhausted),
                    0 => Ok(Waited::Slept),
                    t => {
                        thread::sleep(Duration::from_millis(t as _));
                        Ok(Waited::Slept)
                    }
                };
            }
        };
        if self.nr == 0 {
            return Ok(Waited::Exhausted);
        }

        epoll.events.clear();
        epoll.events.resize(MAX_EVENTS, epoll_event { events: 0, u64: 0 });
        let ready = epoll_wait(epoll.fd.as_fd(), &mut epoll.events, timeout)?;

        Ok(Waited::Events(
            ready
                .iter()
                .map(|it| (it.u64 as usize, it.events))
                .collect(),
        ))
    }

    /// Live registrations in slot order.
    pub fn registrations(&self) -> impl Iterator<Item = Registration<'_>> {
        self.entries.iter().enumerate().filter_map(|(slot, entry)| {
            Some(Registration {
                slot,
                // Same as in `del`: the descriptor outlives its registration.
                fd: unsafe { BorrowedFd::borrow_raw(entry.fd) },
                events: entry.events,
                mmap: entry.mmap?,
            })
        })
    }

    /// Evicts every registration and releases the epoll instance.
    ///
    /// Returns the buffer references to release. Calling it again is a no-op.
    pub(crate) fn free(&mut self) -> Vec<(MmapRef, usize)> {
        let evicted = (0..self.entries.len())
            .filter_map(|slot| self.del(slot))
            .collect();
        self.ctx = None;
        self.entries = vec![];
        self.cap = 0;
        self.nr = 0;
        evicted
    }
}
