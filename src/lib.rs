//! Event lists on top of the `perf_event_open` system call.
//!
//! An [`Evlist`][evlist::Evlist] fans a set of events out over CPU and thread
//! targets, lays out the ring-buffers they write into so events on the same
//! CPU share one buffer, routes sample IDs back to their events and waits
//! for the buffers to fill.
//!
//! ## Example
//!
//! Sample context switches of every online CPU into one ring-buffer per CPU.
//!
//! ```rust,no_run
//! use perf_evlist::config::{CpuMap, Event, Opts, StatFormat, ThreadMap};
//! use perf_evlist::evlist::Evlist;
//! use perf_evlist::evsel::Evsel;
//! use perf_evlist::poll::Wait;
//!
//! let mut opts = Opts::default();
//! opts.sample_period = 1;
//! opts.sample_id_all = true;
//! opts.stat_format = StatFormat {
//!     id: true,
//!     ..Default::default()
//! };
//!
//! let mut evlist = Evlist::new();
//! evlist.add(Evsel::new(Event::CONTEXT_SWITCHES, &opts));
//! evlist.add(Evsel::new(Event::TASK_CLOCK, &opts));
//! evlist.set_maps(CpuMap::online().unwrap(), ThreadMap::any());
//!
//! evlist.open().unwrap();
//! evlist.mmap(8).unwrap(); // 8 data pages per CPU.
//! evlist.enable().unwrap();
//!
//! loop {
//!     let wait = evlist
//!         .poll_mmap(100, |map| {
//!             while let Some(record) = map.read_event() {
//!                 println!("cpu {}: record type {}", map.cpu(), record.ty());
//!             }
//!         })
//!         .unwrap();
//!     if wait == Wait::Exhausted {
//!         break;
//!     }
//! }
//! ```
//!
//! ## Kernel compatibility
//!
//! Any Linux kernel since 4.0 is supported. Sample IDs are read back through
//! `read(2)` on kernels without `PERF_EVENT_IOC_ID`.

pub mod config;
pub mod count;
mod error;
pub mod evlist;
pub mod evsel;
mod ffi;
pub mod kernel;
pub mod mmap;
pub mod poll;
pub mod sid;
#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use ffi::Attr;
