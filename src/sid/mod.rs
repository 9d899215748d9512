use std::collections::HashMap;

use tracing::warn;

use crate::evsel::EvselHandle;


/// Where a sample ID came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleId {
    pub id: u64,
    pub evsel: EvselHandle,
    /// CPU the event was opened on, `-1` for any CPU.
    pub cpu: i32,
    /// Thread the event was opened on, `-1` for any thread.
    pub tid: i32,
    /// Index of the ring-buffer the event writes into.
    pub idx: usize,
}

/// Routes sample IDs read from a ring-buffer back to their events.
///
/// Rebuilt on every mapping, IDs are not stable across remaps.
#[derive(Debug, Default)]
pub struct SampleIdIndex {
    entries: HashMap<u64, SampleId>,
}

impl SampleIdIndex {
    /// Creates an index that holds `capacity` IDs without rehashing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn reserve(&mut self, capacity: usize) {
        self.entries.reserve(capacity.saturating_sub(self.entries.len()));
    }

    pub fn insert(&mut self, sid: SampleId) {
        if let Some(old) = self.entries.insert(sid.id, sid) {
            // The kernel hands out unique IDs, so this is a driver bug.
            warn!(id = sid.id, old = ?old.evsel, new = ?sid.evsel, "duplicate sample id");
        }
    }

    pub fn lookup(&self, id: u64) -> Option<&SampleId> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
