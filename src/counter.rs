//! Counter kinds and the single-counter handle.

use std::fmt;

use log::debug;

use crate::arch::{
    CacheEvent, CacheId, Domain, Event, HardwareEventType, PerfCounter, SoftwareEventType,
};
use crate::error::Result;
use crate::{AbstractPerfCounter, Pid, Subject};

/// What a counter measures and in which domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterKind {
    pub event: Event,
    pub domain: Domain,
}

const fn hw(e: HardwareEventType, domain: Domain) -> CounterKind {
    CounterKind {
        event: Event::Hardware(e),
        domain,
    }
}

const fn sw(e: SoftwareEventType, domain: Domain) -> CounterKind {
    CounterKind {
        event: Event::Software(e),
        domain,
    }
}

const fn cache(c: CacheId) -> CounterKind {
    CounterKind {
        event: Event::Cache(CacheEvent::accesses(c)),
        domain: Domain::User,
    }
}

impl CounterKind {
    pub const fn new(event: Event, domain: Domain) -> CounterKind {
        CounterKind { event, domain }
    }

    pub const CYCLES: CounterKind = hw(HardwareEventType::CPUCycles, Domain::User);
    pub const INSTRUCTIONS: CounterKind = hw(HardwareEventType::Instructions, Domain::User);
    pub const CACHE_MISSES: CounterKind = hw(HardwareEventType::CacheMisses, Domain::User);
    pub const BRANCHES: CounterKind = hw(HardwareEventType::BranchInstructions, Domain::User);
    pub const BRANCH_MISSES: CounterKind = hw(HardwareEventType::BranchMisses, Domain::User);
    pub const REF_CYCLES: CounterKind = hw(HardwareEventType::RefCPUCycles, Domain::User);

    pub const CPU_TIME: CounterKind = sw(SoftwareEventType::CpuClock, Domain::User);
    // The scheduler raises these with kernel registers, so excluding the
    // kernel would drop every one of them.
    pub const CONTEXT_SWITCHES: CounterKind =
        sw(SoftwareEventType::ContextSwitches, Domain::Everything);
    pub const MIGRATIONS: CounterKind = sw(SoftwareEventType::CpuMigrations, Domain::Everything);

    pub const L1D: CounterKind = cache(CacheId::L1D);
    pub const L1I: CounterKind = cache(CacheId::L1I);
    pub const LAST_LEVEL: CounterKind = cache(CacheId::LL);
    pub const NODE: CounterKind = cache(CacheId::NODE);
    pub const BPU: CounterKind = cache(CacheId::BPU);

    pub const KERNEL_CYCLES: CounterKind = hw(HardwareEventType::CPUCycles, Domain::Kernel);
    pub const KERNEL_INSTRUCTIONS: CounterKind =
        hw(HardwareEventType::Instructions, Domain::Kernel);
    pub const KERNEL_CACHE_MISSES: CounterKind =
        hw(HardwareEventType::CacheMisses, Domain::Kernel);
    pub const KERNEL_BRANCHES: CounterKind =
        hw(HardwareEventType::BranchInstructions, Domain::Kernel);
    pub const KERNEL_BRANCH_MISSES: CounterKind =
        hw(HardwareEventType::BranchMisses, Domain::Kernel);
    pub const KERNEL_REF_CYCLES: CounterKind =
        hw(HardwareEventType::RefCPUCycles, Domain::Kernel);

    pub const ALL_CYCLES: CounterKind = hw(HardwareEventType::CPUCycles, Domain::Everything);
    pub const ALL_INSTRUCTIONS: CounterKind =
        hw(HardwareEventType::Instructions, Domain::Everything);
    pub const ALL_CACHE_MISSES: CounterKind =
        hw(HardwareEventType::CacheMisses, Domain::Everything);
    pub const ALL_BRANCHES: CounterKind =
        hw(HardwareEventType::BranchInstructions, Domain::Everything);
    pub const ALL_BRANCH_MISSES: CounterKind =
        hw(HardwareEventType::BranchMisses, Domain::Everything);
    pub const ALL_REF_CYCLES: CounterKind =
        hw(HardwareEventType::RefCPUCycles, Domain::Everything);
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.event, self.domain)
    }
}

/// The fourteen counters sampled by a full benchmark, in record order.
pub const STANDARD_KINDS: [CounterKind; 14] = [
    CounterKind::CYCLES,
    CounterKind::INSTRUCTIONS,
    CounterKind::CACHE_MISSES,
    CounterKind::BRANCHES,
    CounterKind::BRANCH_MISSES,
    CounterKind::REF_CYCLES,
    CounterKind::CPU_TIME,
    CounterKind::CONTEXT_SWITCHES,
    CounterKind::MIGRATIONS,
    CounterKind::L1D,
    CounterKind::L1I,
    CounterKind::LAST_LEVEL,
    CounterKind::NODE,
    CounterKind::BPU,
];

/// A single counter whose descriptor lives exactly as long as the handle.
#[derive(Debug)]
pub struct Counter {
    kind: CounterKind,
    inner: PerfCounter,
}

impl Counter {
    /// Configures the counter and opens it for the calling thread.
    pub fn new(kind: CounterKind) -> Result<Counter> {
        let mut c = Counter::quiet(kind);
        c.open()?;
        Ok(c)
    }

    /// Configures the counter but leaves opening to the caller, e.g. to open
    /// a whole group in one pass.
    pub fn quiet(kind: CounterKind) -> Counter {
        Counter {
            kind,
            inner: PerfCounter::new(kind.event, kind.domain),
        }
    }

    pub fn kind(&self) -> CounterKind {
        self.kind
    }

    pub fn binding(&self) -> &PerfCounter {
        &self.inner
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Opens the counter for the calling thread.
    pub fn open(&mut self) -> Result<()> {
        self.inner.open(Subject::Caller).map(|_| ())
    }

    /// Moves the counter to process `pid`.
    pub fn reopen(&mut self, pid: Pid) -> Result<()> {
        self.inner.reopen(Subject::Process(pid)).map(|_| ())
    }

    /// Moves the counter back to the calling thread.
    pub fn reopen_caller(&mut self) -> Result<()> {
        self.inner.reopen(Subject::Caller).map(|_| ())
    }

    #[inline(always)]
    pub fn begin(&self) -> Result<()> {
        self.inner.start()
    }

    #[inline(always)]
    pub fn end(&self) -> Result<()> {
        self.inner.stop()
    }

    pub fn read(&self) -> Result<u64> {
        self.inner.read()
    }

    /// Current value of the counter, zero if it cannot be read.
    ///
    /// Does not change the running state.
    pub fn retrieve(&self) -> u64 {
        match self.inner.read() {
            Ok(v) => v,
            Err(e) => {
                debug!("{} reads as zero: {}", self.kind, e);
                0
            }
        }
    }

    /// Counts the events of one call of `f`.
    pub fn measure<F, R>(&self, f: F) -> Result<u64>
    where
        F: FnOnce() -> R,
    {
        self.begin()?;
        std::hint::black_box(f());
        self.end()?;
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn standard_kinds_are_distinct() {
        let set: HashSet<CounterKind> = STANDARD_KINDS.iter().copied().collect();
        assert_eq!(set.len(), STANDARD_KINDS.len());
    }

    #[test]
    fn presets() {
        assert_eq!(CounterKind::CYCLES.domain, Domain::User);
        assert_eq!(CounterKind::KERNEL_CYCLES.domain, Domain::Kernel);
        assert_eq!(CounterKind::ALL_CYCLES.domain, Domain::Everything);
        assert_eq!(CounterKind::CYCLES.event, CounterKind::ALL_CYCLES.event);
        assert_eq!(CounterKind::CPU_TIME.domain, Domain::User);
        assert_eq!(
            CounterKind::NODE.event,
            Event::Cache(CacheEvent::accesses(CacheId::NODE))
        );
    }

    #[test]
    fn scheduler_events_keep_kernel_mode() {
        use crate::arch::EventAttrFlags;

        for kind in [CounterKind::CONTEXT_SWITCHES, CounterKind::MIGRATIONS].iter() {
            assert_eq!(kind.domain, Domain::Everything);
            let flags = Counter::quiet(*kind).binding().attr().flags();
            assert!(!flags.contains(EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL));
            assert!(!flags.contains(EventAttrFlags::EVENT_ATTR_EXCLUDE_USER));
            assert!(flags.contains(EventAttrFlags::EVENT_ATTR_EXCLUDE_HV));
        }
    }

    #[test]
    fn quiet_handle_is_closed_and_reads_zero() {
        let c = Counter::quiet(CounterKind::CONTEXT_SWITCHES);
        assert!(!c.is_open());
        assert!(c.read().is_err());
        assert_eq!(c.retrieve(), 0);
        assert_eq!(c.kind(), CounterKind::CONTEXT_SWITCHES);
    }
}
