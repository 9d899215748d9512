use std::io::{Error, Result};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use libc::epoll_event;

use super::Attr;

pub fn perf_event_open(
    attr: &Attr,
    pid: i32,
    cpu: i32,
    group_fd: i32,
    flags: u64,
) -> Result<OwnedFd> {
    let num = libc::SYS_perf_event_open;
    let fd = unsafe { libc::syscall(num, attr as *const Attr, pid, cpu, group_fd, flags) };
    if fd != -1 {
        Ok(unsafe { OwnedFd::from_raw_fd(fd as _) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ioctl_arg(fd: BorrowedFd<'_>, op: u64, arg: u64) -> Result<i32> {
    let result = unsafe { libc::ioctl(fd.as_raw_fd(), op as _, arg) };
    if result != -1 {
        Ok(result)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn ioctl_argp<T>(fd: BorrowedFd<'_>, op: u64, argp: &mut T) -> Result<i32> {
    let result = unsafe { libc::ioctl(fd.as_raw_fd(), op as _, argp as *mut T) };
    if result != -1 {
        Ok(result)
    } else {
        Err(Error::last_os_error())
    }
}

pub fn read(fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize> {
    let count = buf.len();
    let buf = buf.as_mut_ptr() as _;
    let bytes = unsafe { libc::read(fd.as_raw_fd(), buf, count) };
    if bytes != -1 {
        Ok(bytes as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn mmap<T>(len: usize, prot: i32, flags: i32, fd: BorrowedFd<'_>) -> Result<*mut T> {
    let ptr = libc::mmap(std::ptr::null_mut(), len, prot, flags, fd.as_raw_fd(), 0);
    if ptr != libc::MAP_FAILED {
        Ok(ptr as _)
    } else {
        Err(Error::last_os_error())
    }
}

pub unsafe fn munmap<T>(ptr: *mut T, len: usize) -> Result<()> {
    let result = libc::munmap(ptr as _, len);
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn epoll_create1(flags: i32) -> Result<OwnedFd> {
    let fd = unsafe { libc::epoll_create1(flags) };
    if fd != -1 {
        Ok(unsafe { OwnedFd::from_raw_fd(fd as _) })
    } else {
        Err(Error::last_os_error())
    }
}

pub fn epoll_ctl(
    epoll: BorrowedFd<'_>,
    op: i32,
    fd: BorrowedFd<'_>,
    event: Option<&mut epoll_event>,
) -> Result<()> {
    let event = match event {
        Some(event) => event as *mut epoll_event,
        // Since `linux-2.6.9` the event pointer is ignored for `EPOLL_CTL_DEL`.
        None => std::ptr::null_mut(),
    };
    let result = unsafe { libc::epoll_ctl(epoll.as_raw_fd(), op, fd.as_raw_fd(), event) };
    if result != -1 {
        Ok(())
    } else {
        Err(Error::last_os_error())
    }
}

pub fn epoll_wait<'a>(
    epoll: BorrowedFd<'_>,
    events: &'a mut [epoll_event],
    timeout: i32,
) -> Result<&'a [epoll_event]> {
    let len = unsafe {
        libc::epoll_wait(
            epoll.as_raw_fd(),
            events.as_mut_ptr(),
            events.len() as _,
            timeout,
        )
    };
    if len != -1 {
        Ok(&events[..len as _])
    } else {
        Err(Error::last_os_error())
    }
}
