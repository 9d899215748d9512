use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use crate::config::attr::from;
use crate::config::{CpuMap, Event, Opts, ThreadMap};
use crate::count::{read_size, Stat};
use crate::error::{Error, Result};
use crate::ffi::{self, Attr};
use crate::kernel::Kernel;
use crate::sid::SampleId;

#[cfg(test)]
mod test;
mod xyarray;

pub use xyarray::Xyarray;

/// Stable reference to an event inside an [`Evlist`][crate::evlist::Evlist].
///
/// Handles stay valid when other events are removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvselHandle(pub(crate) usize);

/// One event, opened once per (CPU, thread) of its targets.
#[derive(Debug)]
pub struct Evsel {
    pub(crate) attr: Attr,
    pub(crate) idx: usize,

    // CPUs the event is restricted to by nature (e.g. an uncore PMU from sysfs),
    // kept unless the event list is given CPUs by the user.
    pub(crate) own_cpus: Option<CpuMap>,
    pub(crate) cpus: CpuMap,
    pub(crate) threads: ThreadMap,
    pub(crate) system_wide: bool,

    pub(crate) leader: Option<EvselHandle>,
    pub(crate) nr_members: usize,

    pub(crate) fds: Option<Xyarray<Option<OwnedFd>>>,
    pub(crate) sample_id: Option<Xyarray<Option<SampleId>>>,
    pub(crate) ids: Vec<u64>,
}

impl Evsel {
    pub fn new(event: Event, opts: &Opts) -> Self {
        Self::from_attr(from(event, opts))
    }

    pub fn from_attr(attr: Attr) -> Self {
        Self {
            attr,
            idx: 0,
            own_cpus: None,
            cpus: CpuMap::any(),
            threads: ThreadMap::any(),
            system_wide: false,
            leader: None,
            nr_members: 1,
            fds: None,
            sample_id: None,
            ids: vec![],
        }
    }

    /// Restricts the event to `cpus`.
    pub fn with_cpus(mut self, cpus: CpuMap) -> Self {
        self.cpus = cpus.clone();
        self.own_cpus = Some(cpus);
        self
    }

    /// Marks the event as monitoring whole CPUs rather than the threads of the list.
    ///
    /// Such an event is opened on the first thread only and is not polled.
    pub fn with_system_wide(mut self, system_wide: bool) -> Self {
        self.system_wide = system_wide;
        self
    }

    pub fn attr(&self) -> &Attr {
        &self.attr
    }

    /// Position in the event list at the time of insertion.
    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn cpus(&self) -> &CpuMap {
        &self.cpus
    }

    pub fn own_cpus(&self) -> Option<&CpuMap> {
        self.own_cpus.as_ref()
    }

    pub fn threads(&self) -> &ThreadMap {
        &self.threads
    }

    pub fn is_system_wide(&self) -> bool {
        self.system_wide
    }

    pub fn leader(&self) -> Option<EvselHandle> {
        self.leader
    }

    pub fn nr_members(&self) -> usize {
        self.nr_members
    }

    pub fn read_format(&self) -> u64 {
        self.attr.read_format
    }

    /// Returns true if the records go into an overwritable ring-buffer.
    pub fn is_overwrite(&self) -> bool {
        self.attr.has(ffi::ATTR_WRITE_BACKWARD)
    }

    pub(crate) fn has_id(&self) -> bool {
        self.attr.read_format & ffi::PERF_FORMAT_ID > 0
    }

    pub fn is_open(&self) -> bool {
        self.fds.is_some()
    }

    pub fn fd(&self, cpu: usize, thread: usize) -> Option<BorrowedFd<'_>> {
        let fd = self.fds.as_ref()?.get(cpu, thread)?;
        fd.as_ref().map(|it| it.as_fd())
    }

    /// Sample IDs in the order they were resolved during mapping.
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn sample_id(&self, cpu: usize, thread: usize) -> Option<&SampleId> {
        self.sample_id.as_ref()?.get(cpu, thread)?.as_ref()
    }

    /// Bytes returned by [`read`][Self::read].
    pub fn read_size(&self) -> usize {
        read_size(self.attr.read_format, self.nr_members)
    }

    pub(crate) fn raw_fds(&self) -> Option<Xyarray<Option<RawFd>>> {
        let fds = self.fds.as_ref()?;
        let mut raw = Xyarray::new(fds.x_len(), fds.y_len());
        for cpu in 0..fds.x_len() {
            for thread in 0..fds.y_len() {
                if let (Some(Some(fd)), Some(slot)) =
                    (fds.get(cpu, thread), raw.get_mut(cpu, thread))
                {
                    *slot = Some(fd.as_raw_fd());
                }
            }
        }
        Some(raw)
    }

    /// Opens the event on every (CPU, thread) of its targets.
    ///
    /// `group` holds the descriptors of the group leader at the same positions.
    /// Nothing stays open if any of them fails.
    pub(crate) fn open<K: Kernel>(
        &mut self,
        kernel: &K,
        group: Option<&Xyarray<Option<RawFd>>>,
    ) -> Result<()> {
        if self.fds.is_some() {
            return Err(Error::InvalidArgument("event is already open"));
        }

        let (nr_cpus, nr_threads) = (self.cpus.len(), self.threads.len());
        let mut fds = Xyarray::new(nr_cpus, nr_threads);

        for cpu in 0..nr_cpus {
            for thread in 0..nr_threads {
                let group_fd = match group {
                    Some(group) => match group.get(cpu, thread) {
                        Some(&Some(fd)) => fd,
                        // The leader is not open on this position.
                        _ => return Err(io::Error::from_raw_os_error(libc::EBADF).into()),
                    },
                    None => -1,
                };
                let pid = self.threads.pid(thread);
                let fd = kernel.open(&self.attr, pid, self.cpus.cpu(cpu), group_fd)?;
                if let Some(slot) = fds.get_mut(cpu, thread) {
                    *slot = Some(fd);
                }
            }
        }

        self.fds = Some(fds);
        Ok(())
    }

    /// Closes every descriptor of the event.
    pub(crate) fn close(&mut self) {
        self.fds = None;
    }

    pub(crate) fn alloc_id(&mut self, nr_cpus: usize, nr_threads: usize) {
        self.sample_id = Some(Xyarray::new(nr_cpus, nr_threads));
        self.ids = Vec::with_capacity(nr_cpus * nr_threads);
    }

    pub(crate) fn free_id(&mut self) {
        self.sample_id = None;
        self.ids = vec![];
    }

    /// Reads the counter of one (CPU, thread) position.
    pub fn read<K: Kernel>(&self, kernel: &K, cpu: usize, thread: usize) -> Result<Stat> {
        let fd = self
            .fd(cpu, thread)
            .ok_or(Error::InvalidArgument("event is not open at this position"))?;
        let mut buf = vec![0; self.read_size()];
        let len = kernel.read(fd, &mut buf)?;
        Stat::from_bytes(&buf[..len], self.attr.read_format)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof).into())
    }

    pub(crate) fn enable<K: Kernel>(&self, kernel: &K) -> Result<()> {
        let group = self.nr_members > 1;
        self.each_fd(|fd| kernel.enable(fd, group))
    }

    pub(crate) fn disable<K: Kernel>(&self, kernel: &K) -> Result<()> {
        let group = self.nr_members > 1;
        self.each_fd(|fd| kernel.disable(fd, group))
    }

    fn each_fd(&self, mut f: impl FnMut(BorrowedFd<'_>) -> io::Result<()>) -> Result<()> {
        let Some(fds) = &self.fds else {
            return Ok(());
        };
        for fd in fds.iter().flatten() {
            f(fd.as_fd())?;
        }
        Ok(())
    }
}
