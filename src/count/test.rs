use super::{read_size, Stat};
use crate::ffi;

fn bytes(vals: &[u64]) -> Vec<u8> {
    vals.iter().flat_map(|it| it.to_ne_bytes()).collect()
}

#[test]
fn test_read_size_single() {
    assert_eq!(read_size(0, 1), 8);
    let fmt = ffi::PERF_FORMAT_TOTAL_TIME_ENABLED | ffi::PERF_FORMAT_ID;
    assert_eq!(read_size(fmt, 4), 24);
}

#[test]
fn test_read_size_group() {
    let fmt = ffi::PERF_FORMAT_GROUP | ffi::PERF_FORMAT_ID | ffi::PERF_FORMAT_TOTAL_TIME_RUNNING;
    // nr + time_running + 3 * (value + id)
    assert_eq!(read_size(fmt, 3), 8 + 8 + 3 * 16);
    // A group format on a lone event still reads one member.
    assert_eq!(read_size(fmt, 0), 8 + 8 + 16);
}

#[test]
fn test_stat_from_bytes_single() {
    let fmt = ffi::PERF_FORMAT_TOTAL_TIME_ENABLED
        | ffi::PERF_FORMAT_TOTAL_TIME_RUNNING
        | ffi::PERF_FORMAT_ID;
    let buf = bytes(&[100, 7, 6, 42]);
    let stat = Stat::from_bytes(&buf, fmt).unwrap();
    assert_eq!(stat.count, 100);
    assert_eq!(stat.time_enabled, Some(7));
    assert_eq!(stat.time_running, Some(6));
    assert_eq!(stat.id, Some(42));
    assert_eq!(stat.lost_records, None);
}

#[test]
fn test_stat_from_bytes_group() {
    let fmt = ffi::PERF_FORMAT_GROUP | ffi::PERF_FORMAT_ID;
    let buf = bytes(&[2, 10, 1, 20, 2]);
    let stat = Stat::from_bytes(&buf, fmt).unwrap();
    assert_eq!(stat.count, 10);
    assert_eq!(stat.id, Some(1));
    assert_eq!(stat.siblings.len(), 1);
    assert_eq!(stat.siblings[0].count, 20);
    assert_eq!(stat.siblings[0].id, Some(2));
}

#[test]
fn test_stat_from_short_buffer() {
    let fmt = ffi::PERF_FORMAT_ID;
    assert!(Stat::from_bytes(&bytes(&[1]), fmt).is_none());
    let group = ffi::PERF_FORMAT_GROUP;
    assert!(Stat::from_bytes(&bytes(&[3, 1]), group).is_none());
}
