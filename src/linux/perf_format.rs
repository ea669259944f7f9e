//! Kernel-facing data formats for `perf_event_open`.
//!
//! # References
//!  * http://man7.org/linux/man-pages/man2/perf_event_open.2.html
//!  * include/uapi/linux/perf_event.h

use std::fmt;
use std::mem;

use bitflags::*;

/// `PERF_ATTR_SIZE_VER5`, the layout of [`EventAttr`] below.
pub const PERF_ATTR_SIZE_VER5: u32 = 112;

pub const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;
pub const PERF_EVENT_IOC_DISABLE: libc::c_ulong = 0x2401;
pub const PERF_EVENT_IOC_RESET: libc::c_ulong = 0x2403;

/// Close the counter descriptor on exec, so spawned subjects don't inherit it.
pub const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EventAttr {
    pub attr_type: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period_freq: u64,
    pub sample_type: u64,
    pub read_format: u64,
    /// Raw bits of [`EventAttrFlags`].
    pub settings: u64,

    pub wakeup_events_watermark: u32,
    pub bp_type: u32,

    pub config1_or_bp_addr: u64,
    pub config2_or_bp_len: u64,

    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clock_id: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub reserved: u32,
}

impl EventAttr {
    /// Counting-mode attributes for `event` restricted to `domain`.
    ///
    /// Counters always start disabled and pinned to the PMU; the exclusion
    /// bits come from the domain and, for the all-modes domain, from the
    /// event family.
    pub fn for_event(event: Event, domain: Domain) -> EventAttr {
        let mut attr = EventAttr::default();
        attr.attr_type = u32::from(event.attr_type());
        attr.size = PERF_ATTR_SIZE_VER5;
        attr.config = event.config();
        attr.settings = (EventAttrFlags::EVENT_ATTR_DISABLED
            | EventAttrFlags::EVENT_ATTR_PINNED
            | domain.exclusions(event.attr_type()))
        .bits();
        attr
    }

    pub fn attr_type(&self) -> EventAttrType {
        EventAttrType::new(self.attr_type)
    }

    pub fn flags(&self) -> EventAttrFlags {
        EventAttrFlags::from_bits_truncate(self.settings)
    }
}

impl Default for EventAttr {
    fn default() -> EventAttr {
        unsafe { mem::zeroed::<EventAttr>() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAttrType {
    Hardware,
    Software,
    TracePoint,
    HwCache,
    Raw,
    Breakpoint,
    Unknown(u32),
}

impl EventAttrType {
    pub fn new(attr_type: u32) -> EventAttrType {
        match attr_type {
            0 => EventAttrType::Hardware,
            1 => EventAttrType::Software,
            2 => EventAttrType::TracePoint,
            3 => EventAttrType::HwCache,
            4 => EventAttrType::Raw,
            5 => EventAttrType::Breakpoint,
            _ => EventAttrType::Unknown(attr_type),
        }
    }

    fn id(self) -> u32 {
        match self {
            EventAttrType::Hardware => 0,
            EventAttrType::Software => 1,
            EventAttrType::TracePoint => 2,
            EventAttrType::HwCache => 3,
            EventAttrType::Raw => 4,
            EventAttrType::Breakpoint => 5,
            EventAttrType::Unknown(id) => id,
        }
    }
}

impl From<EventAttrType> for u32 {
    fn from(t: EventAttrType) -> u32 {
        t.id()
    }
}

bitflags! {
    pub struct EventAttrFlags: u64 {
        /// off by default
        const EVENT_ATTR_DISABLED       =  1 << 0;
        /// children inherit it
        const EVENT_ATTR_INHERIT        =  1 << 1;
        /// must always be on PMU
        const EVENT_ATTR_PINNED         =  1 << 2;
        /// only group on PMU
        const EVENT_ATTR_EXCLUSIVE      =  1 << 3;
        /// don't count user
        const EVENT_ATTR_EXCLUDE_USER   =  1 << 4;
        /// ditto kernel
        const EVENT_ATTR_EXCLUDE_KERNEL =  1 << 5;
        /// ditto hypervisor
        const EVENT_ATTR_EXCLUDE_HV     =  1 << 6;
        /// don't count when idle
        const EVENT_ATTR_EXCLUDE_IDLE   =  1 << 7;
        /// next exec enables
        const EVENT_ATTR_ENABLE_ON_EXEC =  1 << 12;
        /// don't count in host
        const EVENT_ATTR_EXCLUDE_HOST   =  1 << 19;
        /// don't count in guest
        const EVENT_ATTR_EXCLUDE_GUEST  =  1 << 20;
    }
}

/// Execution contexts a counter accumulates over. Fixed when the binding is
/// configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// User mode only.
    User,
    /// Kernel mode only.
    Kernel,
    /// Hypervisor mode only.
    Hypervisor,
    /// Every mode.
    Everything,
}

impl Domain {
    /// Exclusion bits implied by this domain for a counter of family `family`.
    pub fn exclusions(self, family: EventAttrType) -> EventAttrFlags {
        match self {
            Domain::User => {
                EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL | EventAttrFlags::EVENT_ATTR_EXCLUDE_HV
            }
            Domain::Kernel => {
                EventAttrFlags::EVENT_ATTR_EXCLUDE_USER | EventAttrFlags::EVENT_ATTR_EXCLUDE_HV
            }
            Domain::Hypervisor => {
                EventAttrFlags::EVENT_ATTR_EXCLUDE_USER | EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL
            }
            Domain::Everything => match family {
                EventAttrType::Hardware => EventAttrFlags::empty(),
                _ => EventAttrFlags::EVENT_ATTR_EXCLUDE_HV,
            },
        }
    }
}

impl Default for Domain {
    fn default() -> Domain {
        Domain::User
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Domain::User => "user",
            Domain::Kernel => "kernel",
            Domain::Hypervisor => "hypervisor",
            Domain::Everything => "all",
        };
        f.write_str(name)
    }
}

/// Generalized hardware events (`PERF_TYPE_HARDWARE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareEventType {
    CPUCycles = 0,
    Instructions = 1,
    CacheReferences = 2,
    CacheMisses = 3,
    BranchInstructions = 4,
    BranchMisses = 5,
    BusCycles = 6,
    StalledCyclesFrontend = 7,
    StalledCyclesBackend = 8,
    RefCPUCycles = 9,
}

/// Kernel software events (`PERF_TYPE_SOFTWARE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoftwareEventType {
    CpuClock = 0,
    TaskClock = 1,
    PageFaults = 2,
    ContextSwitches = 3,
    CpuMigrations = 4,
    PageFaultsMin = 5,
    PageFaultsMaj = 6,
    AlignmentFaults = 7,
    EmulationFaults = 8,
    Dummy = 9,
    BpfOutput = 10,
    CgroupSwitches = 11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheId {
    L1D = 0,
    L1I = 1,
    LL = 2,
    DTLB = 3,
    ITLB = 4,
    BPU = 5,
    NODE = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOpId {
    Read = 0,
    Write = 1,
    Prefetch = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOpResultId {
    Access = 0,
    Miss = 1,
}

/// A hardware cache event (`PERF_TYPE_HW_CACHE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheEvent {
    pub cache: CacheId,
    pub op: CacheOpId,
    pub result: CacheOpResultId,
}

impl CacheEvent {
    /// Read accesses of `cache`, the kernel's zero encoding for op and result.
    pub const fn accesses(cache: CacheId) -> CacheEvent {
        CacheEvent {
            cache,
            op: CacheOpId::Read,
            result: CacheOpResultId::Access,
        }
    }

    pub const fn new(cache: CacheId, op: CacheOpId, result: CacheOpResultId) -> CacheEvent {
        CacheEvent { cache, op, result }
    }

    pub fn config(&self) -> u64 {
        (self.cache as u64) | ((self.op as u64) << 8) | ((self.result as u64) << 16)
    }
}

/// One (category, sub-event) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    Hardware(HardwareEventType),
    Software(SoftwareEventType),
    Cache(CacheEvent),
}

impl Event {
    pub fn attr_type(&self) -> EventAttrType {
        match *self {
            Event::Hardware(_) => EventAttrType::Hardware,
            Event::Software(_) => EventAttrType::Software,
            Event::Cache(_) => EventAttrType::HwCache,
        }
    }

    pub fn config(&self) -> u64 {
        match *self {
            Event::Hardware(e) => e as u64,
            Event::Software(e) => e as u64,
            Event::Cache(e) => e.config(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Event::Hardware(e) => write!(f, "hardware:{:?}", e),
            Event::Software(e) => write!(f, "software:{:?}", e),
            Event::Cache(e) => write!(f, "cache:{:?}:{:?}:{:?}", e.cache, e.op, e.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_layout_matches_kernel_ver5() {
        assert_eq!(mem::size_of::<EventAttr>(), PERF_ATTR_SIZE_VER5 as usize);
    }

    #[test]
    fn user_hardware_counter() {
        let attr = EventAttr::for_event(Event::Hardware(HardwareEventType::CPUCycles), Domain::User);
        assert_eq!(attr.attr_type(), EventAttrType::Hardware);
        assert_eq!(attr.config, 0);
        assert_eq!(
            attr.flags(),
            EventAttrFlags::EVENT_ATTR_DISABLED
                | EventAttrFlags::EVENT_ATTR_PINNED
                | EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL
                | EventAttrFlags::EVENT_ATTR_EXCLUDE_HV
        );
    }

    #[test]
    fn domains_map_to_exclusions() {
        let ev = Event::Software(SoftwareEventType::ContextSwitches);
        let kernel = EventAttr::for_event(ev, Domain::Kernel).flags();
        assert!(kernel.contains(EventAttrFlags::EVENT_ATTR_EXCLUDE_USER));
        assert!(!kernel.contains(EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL));

        let vm = EventAttr::for_event(ev, Domain::Hypervisor).flags();
        assert!(vm.contains(
            EventAttrFlags::EVENT_ATTR_EXCLUDE_USER | EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL
        ));
        assert!(!vm.contains(EventAttrFlags::EVENT_ATTR_EXCLUDE_HV));

        let all_sw = EventAttr::for_event(ev, Domain::Everything).flags();
        assert!(all_sw.contains(EventAttrFlags::EVENT_ATTR_EXCLUDE_HV));
        assert!(!all_sw.intersects(
            EventAttrFlags::EVENT_ATTR_EXCLUDE_USER | EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL
        ));

        let all_hw = EventAttr::for_event(
            Event::Hardware(HardwareEventType::Instructions),
            Domain::Everything,
        )
        .flags();
        assert_eq!(
            all_hw,
            EventAttrFlags::EVENT_ATTR_DISABLED | EventAttrFlags::EVENT_ATTR_PINNED
        );
    }

    #[test]
    fn cache_config_encoding() {
        let ev = CacheEvent::new(CacheId::LL, CacheOpId::Write, CacheOpResultId::Miss);
        assert_eq!(ev.config(), 2 | (1 << 8) | (1 << 16));
        assert_eq!(CacheEvent::accesses(CacheId::NODE).config(), 6);

        let attr = EventAttr::for_event(Event::Cache(ev), Domain::User);
        assert_eq!(attr.attr_type, 3);
        assert_eq!(attr.config, ev.config());
    }

    #[test]
    fn software_ids() {
        assert_eq!(Event::Software(SoftwareEventType::CgroupSwitches).config(), 11);
        assert_eq!(Event::Hardware(HardwareEventType::RefCPUCycles).config(), 9);
        assert_eq!(u32::from(EventAttrType::Software), 1);
    }
}
