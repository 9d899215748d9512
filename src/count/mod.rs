mod stat;
#[cfg(test)]
mod test;

pub use stat::*;

use crate::ffi;

/// One counter value with its optional fields, the smallest useful read buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CountValues {
    pub val: u64,
    pub ena: u64,
    pub run: u64,
    pub id: u64,
    pub lost: u64,
}

/// Bytes a single `read(2)` on an event returns with `read_format`.
///
/// `nr_members` is only used when the format has `PERF_FORMAT_GROUP`.
pub fn read_size(read_format: u64, nr_members: usize) -> usize {
    let group_size = match read_format & ffi::PERF_FORMAT_GROUP > 0 {
        true => nr_members.max(1),
        false => 1,
    };
    Stat::read_buf_size(group_size, read_format)
}
