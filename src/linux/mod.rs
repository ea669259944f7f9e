//! Linux `perf_event_open` backend.
//!
//! A [`PerfCounter`] owns at most one counter descriptor configured for one
//! (event, domain) pair. Configuration happens once; the descriptor can be
//! opened, closed and reopened against a different [`Subject`] without
//! touching the configuration.

use std::io;
use std::os::unix::io::RawFd;

use log::debug;

use crate::error::{Error, Result};
use crate::{AbstractPerfCounter, Pid, Subject};

pub mod perf_format;

pub use self::perf_format::{
    CacheEvent, CacheId, CacheOpId, CacheOpResultId, Domain, Event, EventAttr, EventAttrFlags,
    EventAttrType, HardwareEventType, SoftwareEventType,
};

use self::perf_format::{
    PERF_EVENT_IOC_DISABLE, PERF_EVENT_IOC_ENABLE, PERF_EVENT_IOC_RESET, PERF_FLAG_FD_CLOEXEC,
};

fn perf_event_open(
    hw_event: &EventAttr,
    pid: Pid,
    cpu: libc::c_int,
    group_fd: libc::c_int,
    flags: libc::c_ulong,
) -> io::Result<RawFd> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            hw_event as *const EventAttr,
            pid,
            cpu,
            group_fd,
            flags,
        )
    };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as RawFd)
    }
}

fn ioctl(fd: RawFd, request: libc::c_ulong) -> Result<()> {
    let ret = unsafe { libc::ioctl(fd, request as _, 0) };
    if ret == -1 {
        Err(Error::Control(io::Error::last_os_error()))
    } else {
        Ok(())
    }
}

fn read_counter(fd: RawFd) -> Result<u64> {
    let mut value: u64 = 0;
    let n = unsafe {
        libc::read(
            fd,
            &mut value as *mut u64 as *mut libc::c_void,
            std::mem::size_of::<u64>(),
        )
    };
    if n < 0 {
        return Err(Error::Read(io::Error::last_os_error()));
    }
    // A pinned counter the PMU could not schedule reads as end-of-file.
    if n as usize != std::mem::size_of::<u64>() {
        return Err(Error::Read(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "short read from counter descriptor",
        )));
    }
    Ok(value)
}

/// Builder for a [`PerfCounter`].
///
/// ```no_run
/// use perfbench::arch::{Domain, HardwareEventType, PerfCounterBuilderLinux};
/// use perfbench::AbstractPerfCounter;
///
/// let pc = PerfCounterBuilderLinux::from_hardware_event(HardwareEventType::Instructions)
///     .in_domain(Domain::User)
///     .finish()
///     .expect("Could not create counter");
///
/// pc.start().expect("Can not start the counter");
/// pc.stop().expect("Can not stop the counter");
/// println!("{:?}", pc.read());
/// ```
#[derive(Debug, Clone)]
pub struct PerfCounterBuilderLinux {
    event: Event,
    domain: Domain,
    subject: Subject,
}

impl PerfCounterBuilderLinux {
    pub fn from_event(event: Event) -> PerfCounterBuilderLinux {
        PerfCounterBuilderLinux {
            event,
            domain: Domain::default(),
            subject: Subject::Caller,
        }
    }

    pub fn from_hardware_event(event: HardwareEventType) -> PerfCounterBuilderLinux {
        PerfCounterBuilderLinux::from_event(Event::Hardware(event))
    }

    pub fn from_software_event(event: SoftwareEventType) -> PerfCounterBuilderLinux {
        PerfCounterBuilderLinux::from_event(Event::Software(event))
    }

    pub fn from_cache_event(event: CacheEvent) -> PerfCounterBuilderLinux {
        PerfCounterBuilderLinux::from_event(Event::Cache(event))
    }

    pub fn in_domain(mut self, domain: Domain) -> PerfCounterBuilderLinux {
        self.domain = domain;
        self
    }

    pub fn exclude_kernel(self) -> PerfCounterBuilderLinux {
        self.in_domain(Domain::User)
    }

    pub fn exclude_user(self) -> PerfCounterBuilderLinux {
        self.in_domain(Domain::Kernel)
    }

    pub fn for_pid(mut self, pid: Pid) -> PerfCounterBuilderLinux {
        self.subject = Subject::Process(pid);
        self
    }

    pub fn for_caller(mut self) -> PerfCounterBuilderLinux {
        self.subject = Subject::Caller;
        self
    }

    /// Configures the counter without opening a descriptor.
    pub fn build(&self) -> PerfCounter {
        PerfCounter::new(self.event, self.domain)
    }

    /// Configures the counter and opens it against the selected subject.
    pub fn finish(&self) -> Result<PerfCounter> {
        let mut pc = self.build();
        pc.open(self.subject)?;
        Ok(pc)
    }
}

/// Binding to one kernel performance counter.
#[derive(Debug)]
pub struct PerfCounter {
    event: Event,
    domain: Domain,
    attr: EventAttr,
    fd: Option<RawFd>,
    subject: Option<Subject>,
}

impl PerfCounter {
    /// Fills in the kernel attribute record; does not open a descriptor.
    pub fn new(event: Event, domain: Domain) -> PerfCounter {
        PerfCounter {
            event,
            domain,
            attr: EventAttr::for_event(event, domain),
            fd: None,
            subject: None,
        }
    }

    pub fn event(&self) -> Event {
        self.event
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn attr(&self) -> &EventAttr {
        &self.attr
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// The subject of the currently open descriptor.
    pub fn subject(&self) -> Option<Subject> {
        self.subject
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    /// Opens a descriptor for `subject` on any CPU.
    ///
    /// A descriptor that is already open is left untouched; use
    /// [`reopen`](PerfCounter::reopen) to switch subjects. On failure the
    /// binding stays without a descriptor.
    pub fn open(&mut self, subject: Subject) -> Result<RawFd> {
        if let Some(fd) = self.fd {
            return Ok(fd);
        }
        match perf_event_open(&self.attr, subject.pid(), -1, -1, PERF_FLAG_FD_CLOEXEC) {
            Ok(fd) => {
                debug!("opened {} ({}) for {} as fd {}", self.event, self.domain, subject, fd);
                self.fd = Some(fd);
                self.subject = Some(subject);
                Ok(fd)
            }
            Err(err) => Err(Error::Open {
                kind: format!("{} ({})", self.event, self.domain),
                subject,
                err,
            }),
        }
    }

    /// Closes the current descriptor, if any, and opens a new one for
    /// `subject` with the same configuration.
    pub fn reopen(&mut self, subject: Subject) -> Result<RawFd> {
        self.close();
        self.open(subject)
    }

    fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            unsafe {
                libc::close(fd);
            }
            self.subject = None;
        }
    }

    fn fd_or_err(&self) -> Result<RawFd> {
        self.fd.ok_or(Error::NotOpen)
    }
}

impl AbstractPerfCounter for PerfCounter {
    fn reset(&self) -> Result<()> {
        ioctl(self.fd_or_err()?, PERF_EVENT_IOC_RESET)
    }

    /// Zeroes the accumulator and enables counting, so every start/stop
    /// window is read in isolation.
    #[inline(always)]
    fn start(&self) -> Result<()> {
        let fd = self.fd_or_err()?;
        ioctl(fd, PERF_EVENT_IOC_RESET)?;
        ioctl(fd, PERF_EVENT_IOC_ENABLE)
    }

    #[inline(always)]
    fn stop(&self) -> Result<()> {
        ioctl(self.fd_or_err()?, PERF_EVENT_IOC_DISABLE)
    }

    fn read(&self) -> Result<u64> {
        read_counter(self.fd_or_err()?)
    }
}

impl Drop for PerfCounter {
    fn drop(&mut self) {
        self.close();
    }
}
