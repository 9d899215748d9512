//! The kernel side of an event: opening it and the ioctls the event list needs.

use std::io::Result;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};

use crate::ffi::syscall::{ioctl_arg, ioctl_argp, perf_event_open, read};
use crate::ffi::{self, Attr};

/// Operations the event list performs on event descriptors.
///
/// [`Syscall`] talks to the running kernel. Other implementations can
/// stand in for it, e.g. to drive the event list without `CAP_PERFMON`.
pub trait Kernel {
    /// Opens `attr` on (`pid`, `cpu`), joining the group of `group_fd` unless it is `-1`.
    fn open(&self, attr: &Attr, pid: i32, cpu: i32, group_fd: i32) -> Result<OwnedFd>;

    /// Redirects the records of `fd` into the ring-buffer mapped for `output`.
    fn set_output(&self, fd: BorrowedFd<'_>, output: BorrowedFd<'_>) -> Result<()>;

    /// Returns the sample ID the kernel assigned to `fd`.
    ///
    /// Kernels before `linux-3.12` fail with `ENOTTY`.
    fn id(&self, fd: BorrowedFd<'_>) -> Result<u64>;

    fn read(&self, fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize>;

    /// Enables `fd`, and all of its group members if `group` is set.
    fn enable(&self, fd: BorrowedFd<'_>, group: bool) -> Result<()>;

    fn disable(&self, fd: BorrowedFd<'_>, group: bool) -> Result<()>;
}

/// The running kernel, reached through `perf_event_open(2)` and `ioctl(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Syscall;

impl Kernel for Syscall {
    fn open(&self, attr: &Attr, pid: i32, cpu: i32, group_fd: i32) -> Result<OwnedFd> {
        perf_event_open(attr, pid, cpu, group_fd, ffi::PERF_FLAG_FD_CLOEXEC)
    }

    fn set_output(&self, fd: BorrowedFd<'_>, output: BorrowedFd<'_>) -> Result<()> {
        let output = output.as_raw_fd();
        ioctl_arg(fd, ffi::PERF_EVENT_IOC_SET_OUTPUT, output as _)?;
        Ok(())
    }

    fn id(&self, fd: BorrowedFd<'_>) -> Result<u64> {
        let mut id = 0;
        ioctl_argp(fd, ffi::PERF_EVENT_IOC_ID, &mut id)?;
        Ok(id)
    }

    fn read(&self, fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize> {
        read(fd, buf)
    }

    fn enable(&self, fd: BorrowedFd<'_>, group: bool) -> Result<()> {
        let flags = if group { ffi::PERF_IOC_FLAG_GROUP } else { 0 };
        ioctl_arg(fd, ffi::PERF_EVENT_IOC_ENABLE, flags)?;
        Ok(())
    }

    fn disable(&self, fd: BorrowedFd<'_>, group: bool) -> Result<()> {
        let flags = if group { ffi::PERF_IOC_FLAG_GROUP } else { 0 };
        ioctl_arg(fd, ffi::PERF_EVENT_IOC_DISABLE, flags)?;
        Ok(())
    }
}
