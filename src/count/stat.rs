use crate::ffi;

/// Counter statistics as laid out by the read format.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stat {
    pub count: u64,
    pub id: Option<u64>,
    pub time_enabled: Option<u64>,
    pub time_running: Option<u64>,
    pub lost_records: Option<u64>,
    pub siblings: Vec<SiblingStat>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SiblingStat {
    pub count: u64,
    pub id: Option<u64>,
    pub lost_records: Option<u64>,
}

// Native-endian u64 words of a read buffer.
struct Words<'a>(std::slice::ChunksExact<'a, u8>);

impl Words<'_> {
    fn next(&mut self) -> Option<u64> {
        let word = self.0.next()?;
        Some(u64::from_ne_bytes(word.try_into().ok()?))
    }

    fn next_if(&mut self, read_format: u64, flag: u64) -> Option<Option<u64>> {
        match read_format & flag > 0 {
            true => self.next().map(Some),
            false => Some(None),
        }
    }
}

impl Stat {
    // https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L344
    // struct read_format {
    //     {
    //         u64 value;
    //         { u64 time_enabled; } && PERF_FORMAT_TOTAL_TIME_ENABLED
    //         { u64 time_running; } && PERF_FORMAT_TOTAL_TIME_RUNNING
    //         { u64 id;           } && PERF_FORMAT_ID
    //         { u64 lost;         } && PERF_FORMAT_LOST
    //     } && !PERF_FORMAT_GROUP
    //     {
    //         u64 nr;
    //         { u64 time_enabled; } && PERF_FORMAT_TOTAL_TIME_ENABLED
    //         { u64 time_running; } && PERF_FORMAT_TOTAL_TIME_RUNNING
    //         {
    //             u64 value;
    //             { u64 id;   } && PERF_FORMAT_ID
    //             { u64 lost; } && PERF_FORMAT_LOST
    //         } cntr[nr];
    //     } && PERF_FORMAT_GROUP
    // };

    /// Parses a buffer filled by `read(2)` on a counter.
    ///
    /// Returns `None` if the buffer is shorter than the format requires.
    pub fn from_bytes(buf: &[u8], read_format: u64) -> Option<Self> {
        let mut words = Words(buf.chunks_exact(size_of::<u64>()));
        let fmt = read_format;

        if fmt & ffi::PERF_FORMAT_GROUP == 0 {
            let count = words.next()?;
            let time_enabled = words.next_if(fmt, ffi::PERF_FORMAT_TOTAL_TIME_ENABLED)?;
            let time_running = words.next_if(fmt, ffi::PERF_FORMAT_TOTAL_TIME_RUNNING)?;
            let id = words.next_if(fmt, ffi::PERF_FORMAT_ID)?;
            let lost_records = words.next_if(fmt, ffi::PERF_FORMAT_LOST)?;
            return Some(Self {
                count,
                id,
                time_enabled,
                time_running,
                lost_records,
                siblings: vec![],
            });
        }

        let nr = words.next()?;
        let time_enabled = words.next_if(fmt, ffi::PERF_FORMAT_TOTAL_TIME_ENABLED)?;
        let time_running = words.next_if(fmt, ffi::PERF_FORMAT_TOTAL_TIME_RUNNING)?;

        let mut members = (0..nr.max(1)).map(|_| {
            Some(SiblingStat {
                count: words.next()?,
                id: words.next_if(fmt, ffi::PERF_FORMAT_ID)?,
                lost_records: words.next_if(fmt, ffi::PERF_FORMAT_LOST)?,
            })
        });
        let leader = members.next()??;
        let siblings = members.collect::<Option<Vec<_>>>()?;

        Some(Self {
            count: leader.count,
            id: leader.id,
            time_enabled,
            time_running,
            lost_records: leader.lost_records,
            siblings,
        })
    }

    pub(crate) fn read_buf_size(group_size: usize, read_format: u64) -> usize {
        let word = size_of::<u64>();
        let has = |flag: u64| (read_format & flag > 0) as usize;

        let header = has(ffi::PERF_FORMAT_GROUP)
            + has(ffi::PERF_FORMAT_TOTAL_TIME_ENABLED)
            + has(ffi::PERF_FORMAT_TOTAL_TIME_RUNNING);
        let member = 1 + has(ffi::PERF_FORMAT_ID) + has(ffi::PERF_FORMAT_LOST);

        (header + group_size * member) * word
    }
}
