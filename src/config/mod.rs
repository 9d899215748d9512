use crate::ffi;

pub(crate) mod attr;
mod target;

pub use target::*;

/// Event type and config, the part of the attribute that selects what to count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub ty: u32,
    pub config: u64,
}

impl Event {
    pub const CPU_CYCLES: Self = Self::hw(0);
    pub const INSTRUCTIONS: Self = Self::hw(1);

    pub const CPU_CLOCK: Self = Self::sw(0);
    pub const TASK_CLOCK: Self = Self::sw(1);
    pub const CONTEXT_SWITCHES: Self = Self::sw(3);
    /// Counts nothing, used to carry side-band records.
    pub const DUMMY: Self = Self::sw(9);

    const fn hw(config: u64) -> Self {
        Self {
            ty: ffi::PERF_TYPE_HARDWARE,
            config,
        }
    }

    const fn sw(config: u64) -> Self {
        Self {
            ty: ffi::PERF_TYPE_SOFTWARE,
            config,
        }
    }

    /// Tracepoint by its ID from `tracing/events/*/*/id`.
    pub const fn tracepoint(id: u64) -> Self {
        Self {
            ty: ffi::PERF_TYPE_TRACEPOINT,
            config: id,
        }
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Opts {
    pub stat_format: StatFormat,

    /// Start the counter enabled.
    pub enable: bool,
    /// Count child tasks created after the counter was opened.
    pub inherit: bool,
    /// Sample every `n` events, 0 disables sampling.
    pub sample_period: u64,
    pub sample_type: u64,
    pub sample_id_all: bool,

    /// Write records backward into an overwritable ring-buffer.
    ///
    /// Such ring-buffers are never polled for readiness, the consumer
    /// drains them on demand.
    pub overwrite: bool,

    /// Wake up the poller every `n` bytes instead of every record.
    pub wakeup_watermark: Option<u32>,
}

/// Controls the read format of the counter.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatFormat {
    /// Contains the event ID, required to route samples from a shared ring-buffer.
    pub id: bool,

    pub time_enabled: bool,

    pub time_running: bool,

    /// Since `linux-6.0`: <https://github.com/torvalds/linux/commit/119a784c81270eb88e573174ed2209225d646656>
    pub lost_records: bool,

    /// Contains sibling event counts.
    pub siblings: bool,
}

impl StatFormat {
    pub(crate) fn as_read_format(&self) -> u64 {
        let mut val = 0;
        macro_rules! when {
            ($field:ident, $flag:ident) => {
                if self.$field {
                    val |= ffi::$flag;
                }
            };
        }
        when!(id, PERF_FORMAT_ID);
        when!(time_enabled, PERF_FORMAT_TOTAL_TIME_ENABLED);
        when!(time_running, PERF_FORMAT_TOTAL_TIME_RUNNING);
        when!(lost_records, PERF_FORMAT_LOST);
        when!(siblings, PERF_FORMAT_GROUP);
        val
    }
}
