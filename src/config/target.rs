use std::io::{Error, Result};
use std::rc::Rc;

/// Ordered set of CPUs an event is opened on.
///
/// Cloning only bumps a reference count, so the same map is cheaply shared
/// between an event list and all of its events.
#[derive(Clone, Debug)]
pub struct CpuMap(Rc<[i32]>);

impl CpuMap {
    /// Creates a sorted, deduplicated map.
    ///
    /// An empty set of CPUs yields [`any`][Self::any]. CPUs beyond `i32::MAX`
    /// are dropped, so they never alias the `-1` of "any".
    pub fn new(cpus: impl IntoIterator<Item = u32>) -> Self {
        let mut cpus = cpus.into_iter().peekable();
        if cpus.peek().is_none() {
            return Self::any();
        }
        let mut cpus: Vec<i32> = cpus.filter_map(|it| i32::try_from(it).ok()).collect();
        cpus.sort_unstable();
        cpus.dedup();
        Self(cpus.into())
    }

    /// The "any CPU" map, which holds a single `-1` entry.
    ///
    /// Events opened on it follow their thread to whatever CPU it runs on.
    pub fn any() -> Self {
        Self(Rc::new([-1]))
    }

    /// All online CPUs.
    pub fn online() -> Result<Self> {
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if n < 1 {
            return Err(Error::last_os_error());
        }
        Ok(Self::new(0..n as u32))
    }

    /// Returns true if this map does not restrict the CPU.
    pub fn is_any(&self) -> bool {
        self.0.first() == Some(&-1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// CPU at `idx`, or `-1` if out of range.
    pub fn cpu(&self, idx: usize) -> i32 {
        self.0.get(idx).copied().unwrap_or(-1)
    }

    /// Index of `cpu` in this map.
    pub fn idx(&self, cpu: i32) -> Option<usize> {
        self.0.binary_search(&cpu).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().copied()
    }

    /// Sorted union of both maps.
    pub fn merge(&self, other: &Self) -> Self {
        if self.ptr_eq(other) {
            return self.clone();
        }
        let mut cpus: Vec<i32> = self.iter().chain(other.iter()).collect();
        cpus.sort_unstable();
        cpus.dedup();
        Self(cpus.into())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles to this map.
    pub fn refs(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl PartialEq for CpuMap {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for CpuMap {}

/// Ordered set of threads (or processes) an event is opened on.
#[derive(Clone, Debug)]
pub struct ThreadMap(Rc<[i32]>);

impl ThreadMap {
    /// Keeps the given order, the position of a pid is its thread index.
    ///
    /// An empty set of pids yields [`any`][Self::any]. Pids beyond `i32::MAX`
    /// are dropped.
    pub fn new(pids: impl IntoIterator<Item = u32>) -> Self {
        let mut pids = pids.into_iter().peekable();
        if pids.peek().is_none() {
            return Self::any();
        }
        Self(pids.filter_map(|it| i32::try_from(it).ok()).collect())
    }

    /// The "any thread" map, which holds a single `-1` entry.
    ///
    /// Used for CPU-wide monitoring.
    pub fn any() -> Self {
        Self(Rc::new([-1]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Pid at `idx`, or `-1` if out of range.
    pub fn pid(&self, idx: usize) -> i32 {
        self.0.get(idx).copied().unwrap_or(-1)
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.0.iter().copied()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn refs(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl PartialEq for ThreadMap {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ThreadMap {}
