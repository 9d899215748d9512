use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use tracing::debug;

use crate::config::{CpuMap, ThreadMap};
use crate::count::Stat;
use crate::error::{Error, Result};
use crate::evsel::{Evsel, EvselHandle};
use crate::ffi;
use crate::kernel::Kernel;
use crate::mmap::{MmapOps, MmapParams, Mmaps};
use crate::poll::Poll;
use crate::sid::{SampleId, SampleIdIndex};

// Descriptors every event of a region writes into, one per mode.
#[derive(Default)]
struct Output {
    normal: Option<RawFd>,
    overwrite: Option<RawFd>,
}

/// One mapping pass over the events of a list.
pub(super) struct Layout<'a, K, O> {
    pub kernel: &'a K,
    pub ops: &'a mut O,
    pub mp: &'a mut MmapParams,
    pub slots: &'a mut [Option<Evsel>],
    pub entries: &'a [EvselHandle],
    pub cpus: &'a CpuMap,
    pub threads: &'a ThreadMap,
    pub nr_mmaps: usize,
    pub mmap: &'a mut Option<Mmaps>,
    pub mmap_ovw: &'a mut Option<Mmaps>,
    pub sid: &'a mut SampleIdIndex,
    pub poll: &'a mut Poll,
}

impl<K: Kernel, O: MmapOps> Layout<'_, K, O> {
    /// One region per CPU, shared by every thread on it.
    pub fn per_cpu(&mut self) -> Result<()> {
        for cpu in 0..self.cpus.len() {
            let mut output = Output::default();
            self.ops.idx(self.mp, cpu, true);
            for thread in 0..self.threads.len() {
                self.per_evsel(cpu, cpu, thread, &mut output)?;
            }
        }
        Ok(())
    }

    /// One region per thread, for lists without CPU targets.
    pub fn per_thread(&mut self) -> Result<()> {
        for thread in 0..self.threads.len() {
            let mut output = Output::default();
            self.ops.idx(self.mp, thread, false);
            self.per_evsel(thread, 0, thread, &mut output)?;
        }
        Ok(())
    }

    fn per_evsel(&mut self, idx: usize, cpu_idx: usize, thread: usize, output: &mut Output) -> Result<()> {
        let list_cpu = self.cpus.cpu(cpu_idx);
        let list_format = self.read_format();
        // Registration of this (region, thread), shared by the events that follow.
        let mut poll_slot = None;

        for &handle in self.entries {
            let Some(Some(evsel)) = self.slots.get(handle.0) else {
                continue;
            };
            // Opened on the first thread only.
            if evsel.system_wide && thread > 0 {
                continue;
            }
            let Some(cpu) = evsel.cpus.idx(list_cpu) else {
                continue;
            };
            let fd = evsel
                .fd(cpu, thread)
                .ok_or(Error::InvalidArgument("event is not open"))?;

            let overwrite = evsel.is_overwrite();
            let (maps, out) = match overwrite {
                true => (&mut *self.mmap_ovw, &mut output.overwrite),
                false => (&mut *self.mmap, &mut output.normal),
            };
            let nr_mmaps = self.nr_mmaps;
            let maps = maps.get_or_insert_with(|| Mmaps::alloc(nr_mmaps, overwrite));
            let map = maps
                .get_mut(idx)
                .ok_or(Error::InvalidArgument("region out of range"))?;

            self.mp.prot = match overwrite {
                true => libc::PROT_READ,
                false => libc::PROT_READ | libc::PROT_WRITE,
            };

            let created = match *out {
                None => {
                    *out = Some(fd.as_raw_fd());
                    map.setup(fd.as_raw_fd(), list_cpu);
                    self.ops.mmap(map, self.mp, fd)?;
                    debug!(idx, overwrite, fd = fd.as_raw_fd(), "create ring-buffer");
                    true
                }
                Some(output) => {
                    // The output belongs to an event of this list opened on the same region.
                    let output = unsafe { BorrowedFd::borrow_raw(output) };
                    self.kernel.set_output(fd, output)?;
                    map.get();
                    debug!(idx, overwrite, fd = fd.as_raw_fd(), "redirect into ring-buffer");
                    false
                }
            };
            let r = map.to_ref();
            if created && idx == 0 {
                maps.set_first(idx);
            }

            // Overwritable ring-buffers are drained on demand. System-wide
            // sharers are woken through the registration of their CPU and
            // their reference is released with the whole ring-buffer.
            if !overwrite {
                if created || (poll_slot.is_none() && !evsel.system_wide) {
                    poll_slot = Some(self.poll.add(fd, libc::EPOLLIN as _, r)?);
                } else if let (Some(slot), false) = (poll_slot, evsel.system_wide) {
                    self.poll.attach(slot);
                }
            }

            if evsel.has_id() {
                let id = resolve_id(self.kernel, evsel, fd, list_format)?;
                let sid = SampleId {
                    id,
                    evsel: handle,
                    cpu: evsel.cpus.cpu(cpu),
                    tid: evsel.threads.pid(thread),
                    idx,
                };
                self.sid.insert(sid);
                if let Some(Some(evsel)) = self.slots.get_mut(handle.0) {
                    evsel.ids.push(id);
                    if let Some(entry) = evsel
                        .sample_id
                        .as_mut()
                        .and_then(|it| it.get_mut(cpu, thread))
                    {
                        *entry = Some(sid);
                    }
                }
            }
        }

        Ok(())
    }

    fn read_format(&self) -> u64 {
        self.entries
            .first()
            .and_then(|it| self.slots.get(it.0)?.as_ref())
            .map_or(0, Evsel::read_format)
    }
}

/// Sample ID of `fd`, read back the legacy way on kernels without `PERF_EVENT_IOC_ID`.
fn resolve_id<K: Kernel>(
    kernel: &K,
    evsel: &Evsel,
    fd: BorrowedFd<'_>,
    list_format: u64,
) -> Result<u64> {
    match kernel.id(fd) {
        Ok(id) => return Ok(id),
        Err(e) if e.raw_os_error() == Some(libc::ENOTTY) => (),
        Err(e) => return Err(e.into()),
    }

    // Group reads hold the IDs of all members.
    if list_format & ffi::PERF_FORMAT_GROUP > 0 {
        return Err(Error::InvalidArgument("no sample id for group reads"));
    }
    let mut buf = vec![0; evsel.read_size()];
    let len = kernel.read(fd, &mut buf)?;
    Stat::from_bytes(&buf[..len], evsel.read_format())
        .and_then(|it| it.id)
        .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof).into())
}
