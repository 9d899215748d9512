use std::sync::LazyLock;

pub mod syscall;

pub static PAGE_SIZE: LazyLock<usize> = LazyLock::new(|| {
    let name = libc::_SC_PAGE_SIZE;
    let size = unsafe { libc::sysconf(name) };
    size as _
});

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L344
pub const PERF_FORMAT_TOTAL_TIME_ENABLED: u64 = 1 << 0;
pub const PERF_FORMAT_TOTAL_TIME_RUNNING: u64 = 1 << 1;
pub const PERF_FORMAT_ID: u64 = 1 << 2;
pub const PERF_FORMAT_GROUP: u64 = 1 << 3;
pub const PERF_FORMAT_LOST: u64 = 1 << 4;

pub const PERF_FLAG_FD_CLOEXEC: u64 = 1 << 3;
pub const PERF_IOC_FLAG_GROUP: u64 = 1;

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_TRACEPOINT: u32 = 2;

#[cfg(any(
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "mips",
    target_arch = "mips64",
    target_arch = "sparc",
    target_arch = "sparc64"
))]
mod ioc {
    pub const NONE: u64 = 1;
    pub const READ: u64 = 2;
    pub const DIR_SHIFT: u64 = 29;
}

#[cfg(not(any(
    target_arch = "powerpc",
    target_arch = "powerpc64",
    target_arch = "mips",
    target_arch = "mips64",
    target_arch = "sparc",
    target_arch = "sparc64"
)))]
mod ioc {
    pub const NONE: u64 = 0;
    pub const READ: u64 = 2;
    pub const DIR_SHIFT: u64 = 30;
}

const fn ioc(dir: u64, nr: u64, size: u64) -> u64 {
    (dir << ioc::DIR_SHIFT) | (size << 16) | ((b'$' as u64) << 8) | nr
}

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L560
pub const PERF_EVENT_IOC_ENABLE: u64 = ioc(ioc::NONE, 0, 0);
pub const PERF_EVENT_IOC_DISABLE: u64 = ioc(ioc::NONE, 1, 0);
pub const PERF_EVENT_IOC_SET_OUTPUT: u64 = ioc(ioc::NONE, 5, 0);
pub const PERF_EVENT_IOC_ID: u64 = ioc(ioc::READ, 7, size_of::<*mut u64>() as _);

/// Mirror of `struct perf_event_attr` up to `PERF_ATTR_SIZE_VER8`.
///
/// Bit fields of the kernel struct are packed into [`flags`][Self::flags].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
    pub aux_sample_size: u32,
    pub __reserved_3: u32,
    pub sig_data: u64,
    pub config3: u64,
}

// Bit positions inside `Attr::flags`.
pub const ATTR_DISABLED: u64 = 1 << 0;
pub const ATTR_INHERIT: u64 = 1 << 1;
pub const ATTR_WATERMARK: u64 = 1 << 14;
pub const ATTR_SAMPLE_ID_ALL: u64 = 1 << 18;
pub const ATTR_WRITE_BACKWARD: u64 = 1 << 27;

impl Attr {
    pub fn has(&self, flag: u64) -> bool {
        self.flags & flag > 0
    }

    pub fn set(&mut self, flag: u64, on: bool) {
        match on {
            true => self.flags |= flag,
            false => self.flags &= !flag,
        }
    }
}

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L580
// Only the ring-buffer positions are accessed, the rest of the
// first page is opaque to us.
#[repr(C)]
pub struct Metadata {
    pub __head: [u8; 1024],
    pub data_head: u64,
    pub data_tail: u64,
}
