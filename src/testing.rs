//! Stand-ins for the kernel, so event lists can be driven without `CAP_PERFMON`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::{Error, Result};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use crate::ffi::{self, Attr};
use crate::kernel::Kernel;
use crate::mmap::{Mmap, MmapOps, MmapParams};

/// Hands out pipes as event descriptors.
///
/// The read end goes to the event, the write end stays here: writing to it
/// makes the event readable, dropping it makes the event hang up.
#[derive(Debug, Default)]
pub struct MockKernel {
    writers: RefCell<HashMap<RawFd, OwnedFd>>,
    read_formats: RefCell<HashMap<RawFd, u64>>,
    ids: RefCell<HashMap<RawFd, u64>>,
    next_id: Cell<u64>,

    /// Fails the open with this index (counted from 0) with `EMFILE`.
    pub fail_open_at: Cell<Option<usize>>,
    /// Fails `PERF_EVENT_IOC_ID` with `ENOTTY` like kernels before `linux-3.12`.
    pub legacy_id: Cell<bool>,

    /// `(pid, cpu, group_fd)` of every open.
    pub opens: RefCell<Vec<(i32, i32, i32)>>,
    /// `(fd, output)` of every redirection.
    pub outputs: RefCell<Vec<(RawFd, RawFd)>>,
    /// `(fd, group)` of every enable.
    pub enabled: RefCell<Vec<(RawFd, bool)>>,
    pub disabled: RefCell<Vec<(RawFd, bool)>>,
}

impl MockKernel {
    /// Makes `fd` readable.
    pub fn wake(&self, fd: RawFd) {
        if let Some(writer) = self.writers.borrow().get(&fd) {
            let n = unsafe { libc::write(writer.as_raw_fd(), [0u8].as_ptr() as _, 1) };
            assert_eq!(n, 1);
        }
    }

    /// Makes `fd` report `EPOLLHUP`.
    pub fn hangup(&self, fd: RawFd) {
        self.writers.borrow_mut().remove(&fd);
    }

    pub fn id_of(&self, fd: RawFd) -> Option<u64> {
        self.ids.borrow().get(&fd).copied()
    }
}

impl Kernel for MockKernel {
    fn open(&self, attr: &Attr, pid: i32, cpu: i32, group_fd: i32) -> Result<OwnedFd> {
        let nth = self.opens.borrow().len();
        self.opens.borrow_mut().push((pid, cpu, group_fd));
        if self.fail_open_at.get() == Some(nth) {
            return Err(Error::from_raw_os_error(libc::EMFILE));
        }

        let mut fds = [0; 2];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) } == -1 {
            return Err(Error::last_os_error());
        }
        let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        let fd = reader.as_raw_fd();
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.writers.borrow_mut().insert(fd, writer);
        self.read_formats.borrow_mut().insert(fd, attr.read_format);
        self.ids.borrow_mut().insert(fd, id);
        Ok(reader)
    }

    fn set_output(&self, fd: BorrowedFd<'_>, output: BorrowedFd<'_>) -> Result<()> {
        self.outputs
            .borrow_mut()
            .push((fd.as_raw_fd(), output.as_raw_fd()));
        Ok(())
    }

    fn id(&self, fd: BorrowedFd<'_>) -> Result<u64> {
        if self.legacy_id.get() {
            return Err(Error::from_raw_os_error(libc::ENOTTY));
        }
        self.id_of(fd.as_raw_fd())
            .ok_or_else(|| Error::from_raw_os_error(libc::EBADF))
    }

    // Counter value 42, every optional field set to its position.
    fn read(&self, fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize> {
        let fd = fd.as_raw_fd();
        let read_format = self.read_formats.borrow().get(&fd).copied().unwrap_or(0);
        let id = self.id_of(fd).unwrap_or(0);

        let mut words = vec![42];
        if read_format & ffi::PERF_FORMAT_TOTAL_TIME_ENABLED > 0 {
            words.push(1000);
        }
        if read_format & ffi::PERF_FORMAT_TOTAL_TIME_RUNNING > 0 {
            words.push(500);
        }
        if read_format & ffi::PERF_FORMAT_ID > 0 {
            words.push(id);
        }
        if read_format & ffi::PERF_FORMAT_LOST > 0 {
            words.push(0);
        }

        let bytes: Vec<u8> = words.iter().flat_map(|it| it.to_ne_bytes()).collect();
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }

    fn enable(&self, fd: BorrowedFd<'_>, group: bool) -> Result<()> {
        self.enabled.borrow_mut().push((fd.as_raw_fd(), group));
        Ok(())
    }

    fn disable(&self, fd: BorrowedFd<'_>, group: bool) -> Result<()> {
        self.disabled.borrow_mut().push((fd.as_raw_fd(), group));
        Ok(())
    }
}

/// Records mappings instead of performing them.
#[derive(Debug, Default)]
pub struct FakeOps {
    /// `(idx, overwrite, output)` of every mapping.
    pub maps: Vec<(usize, bool, RawFd)>,
    /// `(idx, per_cpu)` of every region.
    pub regions: Vec<(usize, bool)>,
    /// Fails the mapping with this index (counted from 0).
    pub fail_at: Option<usize>,
}

impl MmapOps for FakeOps {
    fn idx(&mut self, _mp: &mut MmapParams, idx: usize, per_cpu: bool) {
        self.regions.push((idx, per_cpu));
    }

    fn mmap(&mut self, map: &mut Mmap, _mp: &MmapParams, output: BorrowedFd<'_>) -> crate::Result<()> {
        if self.fail_at == Some(self.maps.len()) {
            return Err(crate::Error::NoMemory("injected"));
        }
        self.maps
            .push((map.idx(), map.is_overwrite(), output.as_raw_fd()));
        Ok(())
    }
}
