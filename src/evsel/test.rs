use std::os::fd::AsRawFd;

use super::Evsel;
use crate::config::{CpuMap, Event, Opts, StatFormat, ThreadMap};
use crate::testing::MockKernel;
use crate::Error;

fn evsel(cpus: &[u32], threads: &[u32]) -> Evsel {
    let opts = Opts {
        stat_format: StatFormat {
            id: true,
            time_enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut evsel = Evsel::new(Event::CPU_CLOCK, &opts);
    evsel.cpus = CpuMap::new(cpus.iter().copied());
    evsel.threads = ThreadMap::new(threads.iter().copied());
    evsel
}

#[test]
fn test_open_every_position() {
    let kernel = MockKernel::default();
    let mut evsel = evsel(&[0, 2], &[10, 11]);
    evsel.open(&kernel, None).unwrap();

    assert!(evsel.is_open());
    assert_eq!(
        *kernel.opens.borrow(),
        vec![(10, 0, -1), (11, 0, -1), (10, 2, -1), (11, 2, -1)]
    );
    assert!(evsel.fd(1, 1).is_some());
    assert!(evsel.fd(2, 0).is_none());

    let err = evsel.open(&kernel, None).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    evsel.close();
    assert!(!evsel.is_open());
    assert!(evsel.fd(0, 0).is_none());
}

#[test]
fn test_open_group() {
    let kernel = MockKernel::default();
    let mut leader = evsel(&[0, 1], &[10]);
    leader.open(&kernel, None).unwrap();
    let group = leader.raw_fds().unwrap();

    let mut member = evsel(&[0, 1], &[10]);
    member.open(&kernel, Some(&group)).unwrap();

    let opens = kernel.opens.borrow();
    assert_eq!(opens[2].2, leader.fd(0, 0).unwrap().as_raw_fd());
    assert_eq!(opens[3].2, leader.fd(1, 0).unwrap().as_raw_fd());
}

#[test]
fn test_open_group_leader_missing() {
    let kernel = MockKernel::default();
    let mut leader = evsel(&[0], &[10]);
    leader.open(&kernel, None).unwrap();
    let group = leader.raw_fds().unwrap();

    // The member has one more CPU than its leader.
    let mut member = evsel(&[0, 1], &[10]);
    let err = member.open(&kernel, Some(&group)).unwrap_err();
    assert_eq!(err.errno(), -libc::EBADF);
    assert!(!member.is_open());
}

#[test]
fn test_open_rollback() {
    let kernel = MockKernel::default();
    kernel.fail_open_at.set(Some(2));
    let mut evsel = evsel(&[0, 1], &[10, 11]);

    let err = evsel.open(&kernel, None).unwrap_err();
    assert_eq!(err.errno(), -libc::EMFILE);
    assert!(!evsel.is_open());
    assert_eq!(kernel.opens.borrow().len(), 3);
}

#[test]
fn test_read() {
    let kernel = MockKernel::default();
    let mut evsel = evsel(&[0], &[10]);
    assert!(evsel.read(&kernel, 0, 0).is_err());

    evsel.open(&kernel, None).unwrap();
    let fd = evsel.fd(0, 0).unwrap().as_raw_fd();
    let stat = evsel.read(&kernel, 0, 0).unwrap();
    assert_eq!(stat.count, 42);
    assert_eq!(stat.time_enabled, Some(1000));
    assert_eq!(stat.time_running, None);
    assert_eq!(stat.id, kernel.id_of(fd));
}

#[test]
fn test_enable_group_flag() {
    let kernel = MockKernel::default();
    let mut evsel = evsel(&[0, 1], &[10]);
    evsel.open(&kernel, None).unwrap();

    evsel.enable(&kernel).unwrap();
    assert!(kernel.enabled.borrow().iter().all(|&(_, group)| !group));

    evsel.nr_members = 2;
    evsel.disable(&kernel).unwrap();
    let disabled = kernel.disabled.borrow();
    assert_eq!(disabled.len(), 2);
    assert!(disabled.iter().all(|&(_, group)| group));
}

#[test]
fn test_sample_id_table() {
    let mut evsel = evsel(&[0, 1], &[10, 11]);
    assert!(evsel.has_id());
    evsel.alloc_id(2, 2);
    assert!(evsel.sample_id(1, 1).is_none());
    evsel.free_id();
    assert!(evsel.ids().is_empty());
}
