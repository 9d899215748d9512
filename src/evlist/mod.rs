//! The event list: an ordered set of events sharing CPU and thread targets.

use tracing::debug;

use crate::config::{CpuMap, ThreadMap};
use crate::count::CountValues;
use crate::error::{Error, Result};
use crate::evsel::{Evsel, EvselHandle};
use crate::ffi::PAGE_SIZE;
use crate::kernel::{Kernel, Syscall};
use crate::mmap::{DefaultOps, Mmap, MmapOps, MmapParams, MmapRef, Mmaps};
use crate::poll::{Poll, Registration, Wait, Waited};
use crate::sid::SampleIdIndex;

mod layout;

/// Ordered set of events, opened and mapped together.
///
/// Events are owned by the list and addressed by [`EvselHandle`].
/// The list fans every event out over its CPU and thread targets, lays out
/// the ring-buffers they write into, and waits for those buffers to fill.
///
/// Dropping the list unmaps the ring-buffers, then closes and drops the events.
#[derive(Debug)]
pub struct Evlist<K: Kernel = Syscall> {
    kernel: K,

    // Removed events leave a hole, so handles stay valid.
    slots: Vec<Option<Evsel>>,
    entries: Vec<EvselHandle>,

    cpus: CpuMap,
    threads: ThreadMap,
    has_user_cpus: bool,
    all_cpus: Option<CpuMap>,

    nr_groups: usize,
    nr_mmaps: usize,
    mmap_len: usize,
    mmap: Option<Mmaps>,
    mmap_ovw: Option<Mmaps>,

    sid: SampleIdIndex,
    poll: Poll,
}

impl Evlist {
    pub fn new() -> Self {
        Self::with_kernel(Syscall)
    }
}

impl Default for Evlist {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> Evlist<K> {
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            slots: vec![],
            entries: vec![],
            cpus: CpuMap::any(),
            threads: ThreadMap::any(),
            has_user_cpus: false,
            all_cpus: None,
            nr_groups: 0,
            nr_mmaps: 0,
            mmap_len: 0,
            mmap: None,
            mmap_ovw: None,
            sid: SampleIdIndex::default(),
            poll: Poll::new(),
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Appends `evsel` and applies the targets of the list to it.
    pub fn add(&mut self, mut evsel: Evsel) -> EvselHandle {
        let handle = EvselHandle(self.slots.len());
        evsel.idx = self.entries.len();
        self.propagate(&mut evsel);
        self.slots.push(Some(evsel));
        self.entries.push(handle);
        handle
    }

    /// Takes `handle` out of the list.
    ///
    /// Other events keep their index and leader, call
    /// [`set_leader`][Self::set_leader] to rebuild them.
    /// Ring-buffers are unmapped first since the event may write into them.
    pub fn remove(&mut self, handle: EvselHandle) -> Option<Evsel> {
        let pos = self.entries.iter().position(|&it| it == handle)?;
        if self.is_mapped() {
            debug!(?handle, "unmap before removing event");
            self.munmap();
        }
        self.entries.remove(pos);
        self.slots.get_mut(handle.0)?.take()
    }

    /// Replaces the CPU and thread targets and applies them to every event.
    pub fn set_maps(&mut self, cpus: CpuMap, threads: ThreadMap) {
        self.cpus = cpus;
        self.threads = threads;
        if self.all_cpus.is_none() {
            self.all_cpus = Some(self.cpus.clone());
        }

        let mut slots = std::mem::take(&mut self.slots);
        for evsel in slots.iter_mut().flatten() {
            self.propagate(evsel);
        }
        self.slots = slots;
    }

    /// Targets `cpus` as asked by the user, overriding the CPUs events are restricted to.
    pub fn set_user_cpus(&mut self, cpus: CpuMap) {
        self.has_user_cpus = true;
        self.set_maps(cpus, self.threads.clone());
    }

    fn propagate(&mut self, evsel: &mut Evsel) {
        // Events with their own CPUs (e.g. from PMU sysfs) keep them,
        // unless the user asked for other CPUs.
        let own = match &evsel.own_cpus {
            Some(_) if self.has_user_cpus => None,
            Some(_) if !evsel.system_wide && self.cpus.is_any() => None,
            own => own.as_ref(),
        };
        evsel.cpus = own.unwrap_or(&self.cpus).clone();
        evsel.threads = self.threads.clone();

        self.all_cpus = Some(match &self.all_cpus {
            Some(all) => all.merge(&evsel.cpus),
            None => evsel.cpus.clone(),
        });
    }

    /// Makes the first event the leader of all events, renumbering them in order.
    pub fn set_leader(&mut self) {
        let Some(&leader) = self.entries.first() else {
            return;
        };
        let nr = self.entries.len();
        self.nr_groups = if nr > 1 { 1 } else { 0 };

        for (idx, &handle) in self.entries.iter().enumerate() {
            if let Some(Some(evsel)) = self.slots.get_mut(handle.0) {
                evsel.idx = idx;
                evsel.leader = Some(leader);
            }
        }
        if let Some(Some(evsel)) = self.slots.get_mut(leader.0) {
            evsel.nr_members = nr;
        }
    }

    /// Opens every event on all of its targets.
    ///
    /// On failure every event is closed again.
    pub fn open(&mut self) -> Result<()> {
        for pos in 0..self.entries.len() {
            if let Err(e) = self.open_at(pos) {
                debug!(pos, "failed to open event: {}", e);
                self.close();
                return Err(e);
            }
        }
        debug!(nr = self.entries.len(), "opened events");
        Ok(())
    }

    fn open_at(&mut self, pos: usize) -> Result<()> {
        let handle = self.entries[pos];
        let leader = self.evsel(handle).and_then(Evsel::leader);
        let group = match leader {
            Some(leader) if leader != handle => Some(
                self.evsel(leader)
                    .and_then(Evsel::raw_fds)
                    .ok_or(Error::InvalidArgument("group leader is not open"))?,
            ),
            _ => None,
        };
        match self.slots.get_mut(handle.0) {
            Some(Some(evsel)) => evsel.open(&self.kernel, group.as_ref()),
            _ => Ok(()),
        }
    }

    /// Closes every event, the last added first.
    ///
    /// Ring-buffers are unmapped first, their descriptors are about to go away.
    pub fn close(&mut self) {
        self.munmap();
        for &handle in self.entries.iter().rev() {
            if let Some(Some(evsel)) = self.slots.get_mut(handle.0) {
                evsel.close();
            }
        }
    }

    /// Enables every group leader along with its members.
    pub fn enable(&self) -> Result<()> {
        for evsel in self.leaders() {
            evsel.enable(&self.kernel)?;
        }
        Ok(())
    }

    pub fn disable(&self) -> Result<()> {
        for evsel in self.leaders() {
            evsel.disable(&self.kernel)?;
        }
        Ok(())
    }

    fn leaders(&self) -> impl Iterator<Item = &Evsel> {
        self.iter()
            .filter(|(handle, evsel)| evsel.leader.map_or(true, |it| it == *handle))
            .map(|(_, evsel)| evsel)
    }

    /// Size of a buffer able to hold a read of any event.
    pub fn max_read_size(&self) -> usize {
        self.iter()
            .map(|(_, evsel)| evsel.read_size())
            .fold(size_of::<CountValues>(), usize::max)
    }

    /// Read format of the first event.
    pub fn read_format(&self) -> Option<u64> {
        self.first()
            .and_then(|it| self.evsel(it))
            .map(Evsel::read_format)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events in list order.
    pub fn iter(&self) -> impl Iterator<Item = (EvselHandle, &Evsel)> {
        self.entries
            .iter()
            .filter_map(|&it| Some((it, self.evsel(it)?)))
    }

    pub fn evsel(&self, handle: EvselHandle) -> Option<&Evsel> {
        self.slots.get(handle.0)?.as_ref()
    }

    pub fn first(&self) -> Option<EvselHandle> {
        self.entries.first().copied()
    }

    pub fn last(&self) -> Option<EvselHandle> {
        self.entries.last().copied()
    }

    /// Event after `prev`, or the first one if `prev` is `None`.
    pub fn next(&self, prev: Option<EvselHandle>) -> Option<EvselHandle> {
        let Some(prev) = prev else {
            return self.first();
        };
        let pos = self.entries.iter().position(|&it| it == prev)?;
        self.entries.get(pos + 1).copied()
    }

    pub fn cpus(&self) -> &CpuMap {
        &self.cpus
    }

    pub fn threads(&self) -> &ThreadMap {
        &self.threads
    }

    pub fn has_user_cpus(&self) -> bool {
        self.has_user_cpus
    }

    /// Union of the CPUs of all events.
    pub fn all_cpus(&self) -> Option<&CpuMap> {
        self.all_cpus.as_ref()
    }

    pub fn nr_groups(&self) -> usize {
        self.nr_groups
    }

    /// Number of regions of the last mapping.
    pub fn nr_mmaps(&self) -> usize {
        self.nr_mmaps
    }

    /// Bytes of one ring-buffer mapping, the metadata page included.
    pub fn mmap_len(&self) -> usize {
        self.mmap_len
    }

    pub fn sample_ids(&self) -> &SampleIdIndex {
        &self.sid
    }

    pub fn poll_state(&self) -> &Poll {
        &self.poll
    }

    /// Maps one ring-buffer of `pages` data pages per region.
    ///
    /// `pages` must be a power of two.
    pub fn mmap(&mut self, pages: usize) -> Result<()> {
        if !pages.is_power_of_two() {
            return Err(Error::InvalidArgument("pages must be a power of two"));
        }
        let len = pages
            .checked_add(1)
            .and_then(|it| it.checked_mul(*PAGE_SIZE))
            .ok_or(Error::InvalidArgument("mapping size overflow"))?;
        self.mmap_ops(&mut DefaultOps, MmapParams::new(len))
    }

    /// Lays out the ring-buffers and maps them with `ops`.
    ///
    /// Nothing stays mapped if any step fails.
    pub fn mmap_ops<O: MmapOps>(&mut self, ops: &mut O, mut mp: MmapParams) -> Result<()> {
        if self.is_mapped() {
            return Err(Error::InvalidArgument("ring-buffers are already mapped"));
        }
        let (prev_len, prev_nr) = (self.mmap_len, self.nr_mmaps);
        self.mmap_len = mp.len;
        self.nr_mmaps = match self.cpus.is_any() {
            true => self.threads.len(),
            false => self.cpus.len(),
        };

        let mut nr_ids = 0;
        for evsel in self.slots.iter_mut().flatten() {
            if evsel.has_id() && evsel.sample_id.is_none() {
                evsel.alloc_id(evsel.cpus.len(), evsel.threads.len());
            }
            if evsel.has_id() {
                nr_ids += evsel.cpus.len() * evsel.threads.len();
            }
        }
        self.sid.reserve(nr_ids);

        if !self.poll.is_alloc() {
            let cap = self.entries.len() * self.cpus.len() * self.threads.len();
            self.poll.alloc(cap);
        }

        debug!(
            nr_mmaps = self.nr_mmaps,
            len = mp.len,
            per_cpu = !self.cpus.is_any(),
            "map ring-buffers"
        );

        let mut layout = layout::Layout {
            kernel: &self.kernel,
            ops,
            mp: &mut mp,
            slots: &mut self.slots,
            entries: &self.entries,
            cpus: &self.cpus,
            threads: &self.threads,
            nr_mmaps: self.nr_mmaps,
            mmap: &mut self.mmap,
            mmap_ovw: &mut self.mmap_ovw,
            sid: &mut self.sid,
            poll: &mut self.poll,
        };
        let result = match self.cpus.is_any() {
            true => layout.per_thread(),
            false => layout.per_cpu(),
        };
        if let Err(e) = result {
            debug!("failed to map ring-buffers: {}", e);
            self.munmap();
            self.mmap_len = prev_len;
            self.nr_mmaps = prev_nr;
            return Err(e);
        }
        Ok(())
    }

    fn is_mapped(&self) -> bool {
        self.mmap.is_some() || self.mmap_ovw.is_some()
    }

    /// Drops every registration, unmaps every ring-buffer and forgets all sample IDs.
    pub fn munmap(&mut self) {
        for (r, refs) in self.poll.free() {
            if let Some(map) = self.get_mmap_mut(r) {
                (0..refs).for_each(|_| map.put());
            }
        }
        for maps in [&mut self.mmap, &mut self.mmap_ovw] {
            if let Some(mut maps) = maps.take() {
                maps.munmap();
            }
        }
        self.sid.clear();
        for evsel in self.slots.iter_mut().flatten() {
            if evsel.has_id() {
                evsel.free_id();
            }
        }
    }

    pub fn mmaps_of(&self, overwrite: bool) -> Option<&Mmaps> {
        match overwrite {
            true => self.mmap_ovw.as_ref(),
            false => self.mmap.as_ref(),
        }
    }

    /// Ring-buffers of one mode in traversal order.
    pub fn mmaps(&self, overwrite: bool) -> impl Iterator<Item = &Mmap> {
        self.mmaps_of(overwrite).into_iter().flat_map(Mmaps::iter)
    }

    /// Index of the ring-buffer after `prev`, or of the first one if `prev` is `None`.
    pub fn next_mmap(&self, prev: Option<usize>, overwrite: bool) -> Option<usize> {
        let maps = self.mmaps_of(overwrite)?;
        match prev {
            Some(prev) => maps.get(prev)?.next(),
            None => maps.first(),
        }
    }

    pub fn get_mmap(&self, r: MmapRef) -> Option<&Mmap> {
        self.mmaps_of(r.overwrite)?.get(r.idx)
    }

    pub fn get_mmap_mut(&mut self, r: MmapRef) -> Option<&mut Mmap> {
        let maps = match r.overwrite {
            true => self.mmap_ovw.as_mut(),
            false => self.mmap.as_mut(),
        };
        maps?.get_mut(r.idx)
    }

    /// Event and CPU a sample ID was resolved for.
    pub fn id_to_evsel(&self, id: u64) -> Option<(&Evsel, i32)> {
        let sid = self.sid.lookup(id)?;
        Some((self.evsel(sid.evsel)?, sid.cpu))
    }

    /// Leaves waiting on the descriptors to the caller, see [`foreach_fd`][Self::foreach_fd].
    ///
    /// Takes effect on the next mapping.
    pub fn set_poll_external(&mut self, external: bool) {
        self.poll.set_external(external);
    }

    /// Waits up to `timeout` milliseconds for ring-buffers to fill, `-1` waits forever.
    ///
    /// `handle` is called for every ready ring-buffer. Descriptors that hung
    /// up are evicted, and once none are left [`Wait::Exhausted`] is returned.
    pub fn poll_mmap(&mut self, timeout: i32, mut handle: impl FnMut(&mut Mmap)) -> Result<Wait> {
        let ready = match self.poll.wait(timeout)? {
            Waited::Slept => return Ok(Wait::Ready(0)),
            Waited::Exhausted => return Ok(Wait::Exhausted),
            Waited::Events(ready) => ready,
        };

        for &(slot, revents) in &ready {
            let r = self.poll.mmap_of(slot);
            if let Some(map) = r.and_then(|r| self.get_mmap_mut(r)) {
                handle(map);
            }
            if revents & libc::EPOLLHUP as u32 > 0 {
                self.evict(slot);
            }
        }

        Ok(match self.poll.nr() {
            0 => Wait::Exhausted,
            _ => Wait::Ready(ready.len()),
        })
    }

    pub fn poll(&mut self, timeout: i32) -> Result<Wait> {
        self.poll_mmap(timeout, |_| ())
    }

    /// Calls `f` for every live registration, stopping at the first error.
    ///
    /// Only allowed when the ring-buffers were mapped for
    /// [external polling][Self::set_poll_external].
    pub fn foreach_fd(&self, mut f: impl FnMut(Registration<'_>) -> Result<()>) -> Result<()> {
        if !self.poll.polled_externally() {
            return Err(Error::InvalidArgument("descriptors are not polled externally"));
        }
        self.poll.registrations().try_for_each(|it| f(it))
    }

    /// Drops the registration at `slot`, releasing the ring-buffer references it holds.
    pub fn evict(&mut self, slot: usize) {
        if let Some((r, refs)) = self.poll.del(slot) {
            if let Some(map) = self.get_mmap_mut(r) {
                (0..refs).for_each(|_| map.put());
            }
        }
    }

    /// Closes and drops every event.
    pub fn purge(&mut self) {
        self.close();
        self.entries.clear();
        self.slots.clear();
        self.nr_groups = 0;
    }
}

impl<K: Kernel> Drop for Evlist<K> {
    fn drop(&mut self) {
        self.munmap();
        self.close();
        self.purge();
    }
}
