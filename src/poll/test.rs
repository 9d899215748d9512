use std::os::fd::{AsFd, FromRawFd, OwnedFd};
use std::time::{Duration, Instant};

use super::{Poll, Waited};
use crate::mmap::MmapRef;
use crate::Error;

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0; 2];
    let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
    assert_eq!(ret, 0);
    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

const IN: u32 = libc::EPOLLIN as _;
const HUP: u32 = libc::EPOLLHUP as _;

fn mmap_ref(idx: usize) -> MmapRef {
    MmapRef {
        overwrite: false,
        idx,
    }
}

#[test]
fn test_add_before_alloc() {
    let (r, _w) = pipe();
    let mut poll = Poll::new();
    let err = poll.add(r.as_fd(), IN, mmap_ref(0)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_add_full() {
    let (r, _w) = pipe();
    let mut poll = Poll::new();
    poll.alloc(1);
    assert_eq!(poll.add(r.as_fd(), IN, mmap_ref(0)).unwrap(), 0);

    let (r2, _w2) = pipe();
    let err = poll.add(r2.as_fd(), IN, mmap_ref(1)).unwrap_err();
    assert!(matches!(err, Error::NoMemory(_)));
    assert_eq!(err.errno(), -libc::ENOMEM);
    assert_eq!(poll.nr(), 1);
}

#[test]
fn test_wait_without_epoll() {
    let mut poll = Poll::new();
    poll.alloc(4);

    let now = Instant::now();
    assert!(matches!(poll.wait(0).unwrap(), Waited::Slept));
    assert!(matches!(poll.wait(20).unwrap(), Waited::Slept));
    assert!(now.elapsed() >= Duration::from_millis(20));

    assert!(matches!(poll.wait(-1).unwrap(), Waited::Exhausted));
}

#[test]
fn test_wait_ready() {
    let (r, w) = pipe();
    let mut poll = Poll::new();
    poll.alloc(2);
    let slot = poll.add(r.as_fd(), IN, mmap_ref(0)).unwrap();

    let Waited::Events(ready) = poll.wait(0).unwrap() else {
        panic!("expected events");
    };
    assert!(ready.is_empty());

    let n = unsafe { libc::write(std::os::fd::AsRawFd::as_raw_fd(&w), [1u8].as_ptr() as _, 1) };
    assert_eq!(n, 1);
    let Waited::Events(ready) = poll.wait(0).unwrap() else {
        panic!("expected events");
    };
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].0, slot);
    assert!(ready[0].1 & IN > 0);
    assert_eq!(poll.mmap_of(slot), Some(mmap_ref(0)));
}

#[test]
fn test_hangup_evicts() {
    let (r, w) = pipe();
    let mut poll = Poll::new();
    poll.alloc(2);
    let slot = poll.add(r.as_fd(), IN, mmap_ref(0)).unwrap();
    poll.attach(slot);

    drop(w);
    let Waited::Events(ready) = poll.wait(0).unwrap() else {
        panic!("expected events");
    };
    assert_eq!(ready.len(), 1);
    assert!(ready[0].1 & HUP > 0);

    assert_eq!(poll.del(slot), Some((mmap_ref(0), 2)));
    assert_eq!(poll.del(slot), None);
    assert_eq!(poll.nr(), 0);
    assert!(matches!(poll.wait(-1).unwrap(), Waited::Exhausted));
}

#[test]
fn test_external() {
    let (r, _w) = pipe();
    let mut poll = Poll::new();
    poll.set_external(true);
    poll.alloc(2);
    poll.add(r.as_fd(), IN, mmap_ref(3)).unwrap();

    let err = poll.wait(0).err().unwrap();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let regs: Vec<_> = poll.registrations().collect();
    assert_eq!(regs.len(), 1);
    assert_eq!(regs[0].mmap, mmap_ref(3));
    assert_eq!(regs[0].events, IN | HUP | (libc::EPOLLERR | libc::EPOLLET) as u32);
}

#[test]
fn test_free_is_idempotent() {
    let (r, _w) = pipe();
    let mut poll = Poll::new();
    poll.set_external(true);
    poll.alloc(2);
    poll.add(r.as_fd(), IN, mmap_ref(0)).unwrap();

    assert_eq!(poll.free(), vec![(mmap_ref(0), 1)]);
    assert!(!poll.is_alloc());
    assert_eq!(poll.nr(), 0);
    assert!(poll.free().is_empty());
    assert!(poll.is_external());
}

#[test]
fn test_external_takes_effect_on_alloc() {
    let mut poll = Poll::new();
    poll.alloc(1);
    poll.set_external(true);
    assert!(poll.is_external());
    assert!(!poll.polled_externally());

    poll.free();
    assert!(!poll.polled_externally());
    poll.alloc(1);
    assert!(poll.polled_externally());
}
