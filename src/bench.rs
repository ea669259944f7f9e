//! Benchmark orchestration.
//!
//! Every entry point follows the same order: clock begin, counters begin,
//! workload, clock end, counters end. Counters the kernel refuses are logged
//! and read as zero; clock and spawn failures abort the trial.
//!
//! External programs are spawned first and the counters are attached to the
//! new pid afterwards, so the first instructions of the subject's start-up
//! are not counted.

use std::hint::black_box;

use log::{debug, warn};

use crate::clock::{ClockSource, Resolution, WallClock};
use crate::counter::{Counter, CounterKind, STANDARD_KINDS};
use crate::error::{Error, Result};
use crate::group::EventGroup;
use crate::process;
use crate::record::BenchmarkRecord;
use crate::Pid;

/// Settings shared by all orchestration entry points.
///
/// ```no_run
/// use perfbench::{Bencher, Resolution};
///
/// let record = Bencher::new()
///     .name("sum")
///     .resolution(Resolution::Nanoseconds)
///     .benchmark(|| (0..1000u64).sum::<u64>())?;
/// println!("{}: {} ns", record.name, record.time);
/// # Ok::<(), perfbench::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Bencher {
    name: String,
    resolution: Resolution,
    clock: ClockSource,
}

impl Bencher {
    pub fn new() -> Bencher {
        Bencher::default()
    }

    /// Name stored in records of in-process benchmarks.
    pub fn name<S: Into<String>>(mut self, name: S) -> Bencher {
        self.name = name.into();
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Bencher {
        self.resolution = resolution;
        self
    }

    pub fn clock(mut self, clock: ClockSource) -> Bencher {
        self.clock = clock;
        self
    }

    /// Times `f` and samples the fourteen standard counters around it.
    ///
    /// Each counter is opened on its own, so one refusal does not affect
    /// the others.
    pub fn benchmark<F, R>(&self, f: F) -> Result<BenchmarkRecord>
    where
        F: FnOnce() -> R,
    {
        let mut clock = WallClock::new(self.clock)?;
        let mut counters = Vec::with_capacity(STANDARD_KINDS.len());
        for kind in STANDARD_KINDS.iter() {
            let mut c = Counter::quiet(*kind);
            if let Err(e) = c.open() {
                warn!("{} unavailable: {}", kind, e);
            }
            counters.push(c);
        }
        let group = EventGroup::from_members(counters)?;
        self.run_in_process(&mut clock, &group, f)
    }

    /// Same as [`Bencher::benchmark`] but opens the whole group in one pass.
    pub fn benchmark_batch<F, R>(&self, f: F) -> Result<BenchmarkRecord>
    where
        F: FnOnce() -> R,
    {
        let mut clock = WallClock::new(self.clock)?;
        let mut group = EventGroup::quiet(STANDARD_KINDS.iter().copied())?;
        if let Err(e) = group.open() {
            warn!(
                "{} of {} counters opened: {}",
                group.opened(),
                group.len(),
                e
            );
        }
        self.run_in_process(&mut clock, &group, f)
    }

    fn run_in_process<F, R>(
        &self,
        clock: &mut WallClock,
        group: &EventGroup,
        f: F,
    ) -> Result<BenchmarkRecord>
    where
        F: FnOnce() -> R,
    {
        clock.begin()?;
        start(group);
        black_box(f());
        clock.end()?;
        stop(group);
        Ok(BenchmarkRecord::from_group(
            self.name.clone(),
            clock.elapsed(self.resolution),
            group,
        ))
    }

    /// Runs `program` once and samples the standard counters on it.
    ///
    /// The record is named after the invocation, `program` followed by
    /// `args`.
    pub fn benchmark_bin(&self, program: &str, args: &[&str]) -> Result<BenchmarkRecord> {
        let mut clock = WallClock::new(self.clock)?;
        let mut group = EventGroup::quiet(STANDARD_KINDS.iter().copied())?;

        let pid = process::spawn(program, args)?;
        attach(&mut group, pid);
        if let Err(e) = clock.begin() {
            return abandon(pid, e);
        }
        start(&group);
        reap(program, pid)?;
        clock.end()?;
        stop(&group);

        Ok(BenchmarkRecord::from_group(
            invocation(program, args),
            clock.elapsed(self.resolution),
            &group,
        ))
    }

    /// Counts `kind` over one call of `f`. Zero if the counter is
    /// unavailable.
    pub fn cpu_bench<F, R>(&self, kind: CounterKind, f: F) -> Result<u64>
    where
        F: FnOnce() -> R,
    {
        let mut c = Counter::quiet(kind);
        if let Err(e) = c.open() {
            warn!("{} unavailable: {}", kind, e);
        }
        begin_counter(&c);
        black_box(f());
        end_counter(&c);
        Ok(c.retrieve())
    }

    /// Counts `kind` over one run of `program`.
    pub fn cpu_bench_bin(&self, kind: CounterKind, program: &str, args: &[&str]) -> Result<u64> {
        let mut c = Counter::quiet(kind);
        let pid = process::spawn(program, args)?;
        if let Err(e) = c.reopen(pid) {
            warn!("{} unavailable for pid {}: {}", kind, pid, e);
        }
        begin_counter(&c);
        reap(program, pid)?;
        end_counter(&c);
        Ok(c.retrieve())
    }

    /// Wall time of one call of `f`.
    pub fn bench<F, R>(&self, f: F) -> Result<f64>
    where
        F: FnOnce() -> R,
    {
        let mut clock = WallClock::new(self.clock)?;
        clock.begin()?;
        black_box(f());
        clock.end()?;
        Ok(clock.elapsed(self.resolution))
    }

    /// Wall time of one run of `program`, spawn included.
    pub fn bench_bin(&self, program: &str, args: &[&str]) -> Result<f64> {
        let mut clock = WallClock::new(self.clock)?;
        clock.begin()?;
        process::spawn_and_wait(program, args)?;
        clock.end()?;
        Ok(clock.elapsed(self.resolution))
    }

    /// Wall time of each workload, in iteration order.
    pub fn bench_each<I, F, R>(&self, workloads: I) -> Result<Vec<f64>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> R,
    {
        let mut clock = WallClock::new(self.clock)?;
        let mut results = Vec::new();
        for w in workloads {
            clock.begin()?;
            black_box(w());
            clock.end()?;
            results.push(clock.elapsed(self.resolution));
        }
        Ok(results)
    }

    /// Wall time of `n` consecutive calls of `f`, one sample per call.
    pub fn bench_repeat<F, R>(&self, n: usize, mut f: F) -> Result<Vec<f64>>
    where
        F: FnMut() -> R,
    {
        let mut clock = WallClock::new(self.clock)?;
        let mut results = Vec::with_capacity(n);
        for _ in 0..n {
            clock.begin()?;
            black_box(f());
            clock.end()?;
            results.push(clock.elapsed(self.resolution));
        }
        Ok(results)
    }
}

/// Program path and arguments joined by spaces.
pub fn invocation(program: &str, args: &[&str]) -> String {
    let mut s = program.to_owned();
    for a in args {
        s.push(' ');
        s.push_str(a);
    }
    s
}

fn attach(group: &mut EventGroup, pid: Pid) {
    if let Err(e) = group.reopen(pid) {
        warn!(
            "{} of {} counters attached to pid {}: {}",
            group.opened(),
            group.len(),
            pid,
            e
        );
    }
}

#[inline(always)]
fn start(group: &EventGroup) {
    if let Err(e) = group.begin() {
        warn!("starting counters: {}", e);
    }
}

#[inline(always)]
fn stop(group: &EventGroup) {
    if let Err(e) = group.end() {
        warn!("stopping counters: {}", e);
    }
}

#[inline(always)]
fn begin_counter(c: &Counter) {
    if c.is_open() {
        if let Err(e) = c.begin() {
            warn!("starting {}: {}", c.kind(), e);
        }
    }
}

#[inline(always)]
fn end_counter(c: &Counter) {
    if c.is_open() {
        if let Err(e) = c.end() {
            warn!("stopping {}: {}", c.kind(), e);
        }
    }
}

// Reaps a subject whose trial failed before it was waited for.
fn abandon<T>(pid: Pid, err: Error) -> Result<T> {
    if let Err(e) = process::wait(pid) {
        warn!("could not reap pid {}: {}", pid, e);
    }
    Err(err)
}

fn reap(program: &str, pid: Pid) -> Result<()> {
    let status = process::wait(pid)?;
    if status.success() {
        debug!("{} finished", program);
    } else {
        warn!("{} exited with {}", program, status);
    }
    Ok(())
}

/// [`Bencher::benchmark`] with default settings.
pub fn benchmark<F, R>(resolution: Resolution, f: F) -> Result<BenchmarkRecord>
where
    F: FnOnce() -> R,
{
    Bencher::new().resolution(resolution).benchmark(f)
}

/// [`Bencher::benchmark_batch`] with default settings.
pub fn benchmark_batch<F, R>(resolution: Resolution, f: F) -> Result<BenchmarkRecord>
where
    F: FnOnce() -> R,
{
    Bencher::new().resolution(resolution).benchmark_batch(f)
}

pub fn benchmark_bin(
    resolution: Resolution,
    program: &str,
    args: &[&str],
) -> Result<BenchmarkRecord> {
    Bencher::new()
        .resolution(resolution)
        .benchmark_bin(program, args)
}

pub fn cpu_bench<F, R>(kind: CounterKind, f: F) -> Result<u64>
where
    F: FnOnce() -> R,
{
    Bencher::new().cpu_bench(kind, f)
}

pub fn cpu_bench_bin(kind: CounterKind, program: &str, args: &[&str]) -> Result<u64> {
    Bencher::new().cpu_bench_bin(kind, program, args)
}

pub fn bench<F, R>(resolution: Resolution, f: F) -> Result<f64>
where
    F: FnOnce() -> R,
{
    Bencher::new().resolution(resolution).bench(f)
}

pub fn bench_bin(resolution: Resolution, program: &str, args: &[&str]) -> Result<f64> {
    Bencher::new().resolution(resolution).bench_bin(program, args)
}

pub fn bench_each<I, F, R>(resolution: Resolution, workloads: I) -> Result<Vec<f64>>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> R,
{
    Bencher::new().resolution(resolution).bench_each(workloads)
}

pub fn bench_repeat<F, R>(resolution: Resolution, n: usize, f: F) -> Result<Vec<f64>>
where
    F: FnMut() -> R,
{
    Bencher::new().resolution(resolution).bench_repeat(n, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_joins_arguments() {
        assert_eq!(invocation("/bin/true", &[]), "/bin/true");
        assert_eq!(invocation("/bin/sh", &["-c", "exit 0"]), "/bin/sh -c exit 0");
    }

    #[test]
    fn defaults() {
        let b = Bencher::new();
        assert_eq!(b.resolution, Resolution::Milliseconds);
        assert_eq!(b.clock, ClockSource::Monotonic);
        assert!(b.name.is_empty());
    }

    #[test]
    fn repeat_yields_one_sample_per_call() {
        let mut calls = 0;
        let t = Bencher::new()
            .resolution(Resolution::Nanoseconds)
            .bench_repeat(7, || calls += 1)
            .unwrap();
        assert_eq!(calls, 7);
        assert_eq!(t.len(), 7);
        assert!(t.iter().all(|s| *s >= 0.0));
    }

    #[test]
    fn abandoned_subject_is_reaped() {
        if !std::path::Path::new("/bin/sh").exists() {
            return;
        }
        let pid = process::spawn("/bin/sh", &["-c", "exit 0"]).unwrap();
        let r: Result<BenchmarkRecord> = abandon(pid, Error::NotOpen);
        assert!(matches!(r, Err(Error::NotOpen)));
        // Nothing left to wait for.
        assert!(matches!(process::wait(pid), Err(Error::Wait { .. })));
    }

    #[test]
    fn each_keeps_workload_order() {
        let slow = || std::thread::sleep(std::time::Duration::from_millis(20));
        let fast = || ();
        let workloads: Vec<Box<dyn FnOnce()>> = vec![Box::new(slow), Box::new(fast)];
        let t = bench_each(Resolution::Milliseconds, workloads).unwrap();
        assert_eq!(t.len(), 2);
        assert!(t[0] >= 20.0);
        assert!(t[1] < t[0]);
    }
}
