//! Time a unit of work and sample CPU and kernel performance counters around it.
//!
//! The workload is either a closure running in this process or an external
//! program spawned for the measurement. Every trial produces one
//! [`BenchmarkRecord`] holding the elapsed wall time and fourteen cumulative
//! counter values.
//!
//! ```no_run
//! use perfbench::{bench, Resolution};
//!
//! let record = bench::benchmark(Resolution::Microseconds, || {
//!     (0..1_000_000u64).sum::<u64>()
//! })?;
//! println!("{} instructions in {} us", record.instructions, record.time);
//! # Ok::<(), perfbench::Error>(())
//! ```
//!
//! Counters are Linux `perf_event` counters and are subject to
//! `/proc/sys/kernel/perf_event_paranoid`. Counters the kernel refuses are
//! reported as zero by the orchestration functions.

use std::fmt;

#[cfg(target_os = "linux")]
#[path = "linux/mod.rs"]
pub mod arch;

pub mod bench;
pub mod chrono;
pub mod clock;
pub mod counter;
pub mod error;
pub mod group;
pub mod process;
pub mod record;

pub use crate::bench::Bencher;
pub use crate::clock::{ClockSource, Resolution, Stopwatch, WallClock};
pub use crate::counter::{Counter, CounterKind};
pub use crate::error::{Error, Result};
pub use crate::group::EventGroup;
pub use crate::record::BenchmarkRecord;

pub type Pid = libc::pid_t;

/// Whose activity a counter observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The calling thread.
    Caller,
    /// Another process, referenced by id and never owned.
    Process(Pid),
}

impl Subject {
    /// The `pid` argument for `perf_event_open`.
    pub fn pid(self) -> Pid {
        match self {
            Subject::Caller => 0,
            Subject::Process(pid) => pid,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Subject::Caller => write!(f, "caller"),
            Subject::Process(pid) => write!(f, "pid {}", pid),
        }
    }
}

/// Abstract trait to control performance counters.
pub trait AbstractPerfCounter {
    fn reset(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn read(&self) -> Result<u64>;
}
