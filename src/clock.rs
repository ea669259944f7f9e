//! Wall clocks built on `clock_gettime`.
//!
//! A [`WallClock`] records a begin and an end timestamp from one
//! [`ClockSource`] and reports the distance between them at a caller chosen
//! [`Resolution`]. Failing to read the source is fatal for the measurement:
//! there is no substitute value that would not corrupt the result.

use std::fmt;
use std::io;
use std::str::FromStr;

use crate::chrono;
use crate::error::{Error, Result};

/// Operating system time sources accepted by `clock_gettime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockSource {
    /// Settable system-wide real time.
    Realtime,
    /// Real time, alarm capable variant. Requires an RTC with alarm support.
    RealtimeAlarm,
    RealtimeCoarse,
    /// International atomic time.
    Tai,
    Monotonic,
    MonotonicCoarse,
    /// Monotonic time not subject to NTP slewing.
    MonotonicRaw,
    /// Monotonic time including time spent suspended.
    Boottime,
    ProcessCputime,
    ThreadCputime,
}

impl ClockSource {
    pub fn clock_id(self) -> libc::clockid_t {
        match self {
            ClockSource::Realtime => libc::CLOCK_REALTIME,
            ClockSource::RealtimeAlarm => libc::CLOCK_REALTIME_ALARM,
            ClockSource::RealtimeCoarse => libc::CLOCK_REALTIME_COARSE,
            ClockSource::Tai => libc::CLOCK_TAI,
            ClockSource::Monotonic => libc::CLOCK_MONOTONIC,
            ClockSource::MonotonicCoarse => libc::CLOCK_MONOTONIC_COARSE,
            ClockSource::MonotonicRaw => libc::CLOCK_MONOTONIC_RAW,
            ClockSource::Boottime => libc::CLOCK_BOOTTIME,
            ClockSource::ProcessCputime => libc::CLOCK_PROCESS_CPUTIME_ID,
            ClockSource::ThreadCputime => libc::CLOCK_THREAD_CPUTIME_ID,
        }
    }
}

impl Default for ClockSource {
    fn default() -> ClockSource {
        ClockSource::Monotonic
    }
}

/// Seconds and nanoseconds since the source's epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: i64,
}

impl Timestamp {
    pub const fn new(secs: i64, nanos: i64) -> Timestamp {
        Timestamp { secs, nanos }
    }

    /// Reads `source` once.
    pub fn now(source: ClockSource) -> Result<Timestamp> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let ret = unsafe { libc::clock_gettime(source.clock_id(), &mut ts) };
        if ret == -1 {
            return Err(Error::Clock {
                clock: source,
                err: io::Error::last_os_error(),
            });
        }
        Ok(Timestamp {
            secs: ts.tv_sec as i64,
            nanos: ts.tv_nsec as i64,
        })
    }
}

/// Unit in which elapsed time is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Seconds,
    Deciseconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl Resolution {
    pub fn suffix(self) -> &'static str {
        match self {
            Resolution::Seconds => "s",
            Resolution::Deciseconds => "ds",
            Resolution::Milliseconds => "ms",
            Resolution::Microseconds => "us",
            Resolution::Nanoseconds => "ns",
        }
    }

    /// Converts the distance between two timestamps into this unit.
    ///
    /// Every unit has its own path: the whole second part is scaled first and
    /// the nanosecond remainder is divided down only once, so coarse units do
    /// not lose the sub-second part and `Nanoseconds` stays exact.
    pub fn between(self, begin: Timestamp, end: Timestamp) -> f64 {
        let secs = (end.secs - begin.secs) as f64;
        let nanos = end.nanos - begin.nanos;
        match self {
            Resolution::Seconds => chrono::seconds(secs) + nanos as f64 / 1e9,
            Resolution::Deciseconds => chrono::deciseconds(secs) + nanos as f64 / 1e8,
            Resolution::Milliseconds => chrono::milliseconds(secs) + nanos as f64 / 1e6,
            Resolution::Microseconds => chrono::microseconds(secs) + nanos as f64 / 1e3,
            Resolution::Nanoseconds => {
                ((end.secs - begin.secs) * 1_000_000_000 + nanos) as f64
            }
        }
    }
}

impl Default for Resolution {
    fn default() -> Resolution {
        Resolution::Milliseconds
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Resolution, String> {
        match s {
            "s" | "sec" | "seconds" => Ok(Resolution::Seconds),
            "ds" | "deciseconds" => Ok(Resolution::Deciseconds),
            "ms" | "milliseconds" => Ok(Resolution::Milliseconds),
            "us" | "microseconds" => Ok(Resolution::Microseconds),
            "ns" | "nanoseconds" => Ok(Resolution::Nanoseconds),
            _ => Err(format!("unknown time resolution: {}", s)),
        }
    }
}

/// Begin/end pair sampled from one time source.
#[derive(Debug, Clone)]
pub struct SystemClock {
    source: ClockSource,
    time_begin: Timestamp,
    time_end: Timestamp,
}

impl SystemClock {
    /// Creates the clock and samples the source once as its begin timestamp,
    /// so a broken source is reported at construction.
    pub fn new(source: ClockSource) -> Result<SystemClock> {
        let time_begin = Timestamp::now(source)?;
        Ok(SystemClock {
            source,
            time_begin,
            time_end: Timestamp::default(),
        })
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    #[inline(always)]
    pub fn start(&mut self) -> Result<Timestamp> {
        self.time_begin = Timestamp::now(self.source)?;
        Ok(self.time_begin)
    }

    #[inline(always)]
    pub fn stop(&mut self) -> Result<Timestamp> {
        self.time_end = Timestamp::now(self.source)?;
        Ok(self.time_end)
    }

    pub fn now(&self) -> Result<Timestamp> {
        Timestamp::now(self.source)
    }

    pub fn begin_timestamp(&self) -> Timestamp {
        self.time_begin
    }

    pub fn end_timestamp(&self) -> Timestamp {
        self.time_end
    }

    /// Distance from the begin timestamp to `t`.
    pub fn read_since(&self, t: Timestamp, resolution: Resolution) -> f64 {
        resolution.between(self.time_begin, t)
    }

    pub fn read(&self, resolution: Resolution) -> f64 {
        resolution.between(self.time_begin, self.time_end)
    }
}

/// Stopwatch-style clock: `begin`, run something, `end`, then `elapsed`.
///
/// `begin` and `end` overwrite the stored timestamps, so one clock can be
/// reused for any number of sequential measurements.
#[derive(Debug, Clone)]
pub struct WallClock {
    inner: SystemClock,
}

impl WallClock {
    pub fn new(source: ClockSource) -> Result<WallClock> {
        Ok(WallClock {
            inner: SystemClock::new(source)?,
        })
    }

    /// Builds a clock from two existing samples. Useful to re-evaluate a
    /// recorded interval at a different resolution.
    pub fn from_timestamps(source: ClockSource, begin: Timestamp, end: Timestamp) -> WallClock {
        WallClock {
            inner: SystemClock {
                source,
                time_begin: begin,
                time_end: end,
            },
        }
    }

    pub fn source(&self) -> ClockSource {
        self.inner.source()
    }

    #[inline(always)]
    pub fn begin(&mut self) -> Result<Timestamp> {
        self.inner.start()
    }

    #[inline(always)]
    pub fn end(&mut self) -> Result<Timestamp> {
        self.inner.stop()
    }

    /// `end - begin` in the requested unit. Zero and negative values are
    /// legitimate: coarse sources return equal consecutive samples and
    /// realtime sources can be stepped backwards.
    pub fn elapsed(&self, resolution: Resolution) -> f64 {
        self.inner.read(resolution)
    }

    pub fn timestamps(&self) -> (Timestamp, Timestamp) {
        (self.inner.begin_timestamp(), self.inner.end_timestamp())
    }
}

/// Clock that keeps every lap instead of a single end timestamp.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    inner: SystemClock,
    laps: Vec<Timestamp>,
}

impl Stopwatch {
    pub fn new(source: ClockSource) -> Result<Stopwatch> {
        Ok(Stopwatch {
            inner: SystemClock::new(source)?,
            laps: Vec::new(),
        })
    }

    /// Restarts the stopwatch and forgets all laps.
    pub fn begin(&mut self) -> Result<()> {
        self.inner.start()?;
        self.laps.clear();
        Ok(())
    }

    pub fn lap(&mut self) -> Result<()> {
        let t = self.inner.stop()?;
        self.laps.push(t);
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        self.lap()
    }

    pub fn laps(&self) -> impl Iterator<Item = f64> + '_ {
        self.laps
            .iter()
            .map(move |t| self.inner.read_since(*t, Resolution::Milliseconds))
    }

    /// Milliseconds from `begin` to the most recent lap.
    pub fn elapsed(&self) -> Option<f64> {
        self.laps
            .last()
            .map(|t| self.inner.read_since(*t, Resolution::Milliseconds))
    }

    /// Times one call of `f` in seconds without touching the recorded laps.
    pub fn measure<F, R>(&mut self, f: F) -> Result<f64>
    where
        F: FnOnce() -> R,
    {
        let begin = self.inner.now()?;
        std::hint::black_box(f());
        let end = self.inner.now()?;
        Ok(Resolution::Seconds.between(begin, end))
    }
}
