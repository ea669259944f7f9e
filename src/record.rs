//! The result of one benchmark trial and metrics derived from it.

use crate::counter::CounterKind;
use crate::group::{EventGroup, Member};

/// Elapsed time plus the fourteen standard counters of one trial.
///
/// Counters that a given entry point does not sample, or that the kernel
/// refused to open, are zero.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BenchmarkRecord {
    pub name: String,
    /// Elapsed wall time in the resolution requested by the caller.
    pub time: f64,
    pub cycles: u64,
    pub instructions: u64,
    pub cache_misses: u64,
    pub total_branches: u64,
    pub branch_misses: u64,
    /// Reference cycles, not scaled by frequency changes.
    pub total_cycles: u64,
    /// CPU clock in nanoseconds.
    pub cpu_time: u64,
    pub context_switches: u64,
    pub migrations: u64,
    pub l1_cache: u64,
    pub l1t_cache: u64,
    pub ll_cache: u64,
    /// Node-local cache accesses.
    pub access: u64,
    /// Branch prediction unit accesses.
    pub bpu: u64,
}

impl BenchmarkRecord {
    /// Reads the standard kinds out of `group`.
    pub fn from_group<C: Member>(name: String, time: f64, group: &EventGroup<C>) -> BenchmarkRecord {
        BenchmarkRecord {
            name,
            time,
            cycles: group.retrieve(CounterKind::CYCLES),
            instructions: group.retrieve(CounterKind::INSTRUCTIONS),
            cache_misses: group.retrieve(CounterKind::CACHE_MISSES),
            total_branches: group.retrieve(CounterKind::BRANCHES),
            branch_misses: group.retrieve(CounterKind::BRANCH_MISSES),
            total_cycles: group.retrieve(CounterKind::REF_CYCLES),
            cpu_time: group.retrieve(CounterKind::CPU_TIME),
            context_switches: group.retrieve(CounterKind::CONTEXT_SWITCHES),
            migrations: group.retrieve(CounterKind::MIGRATIONS),
            l1_cache: group.retrieve(CounterKind::L1D),
            l1t_cache: group.retrieve(CounterKind::L1I),
            ll_cache: group.retrieve(CounterKind::LAST_LEVEL),
            access: group.retrieve(CounterKind::NODE),
            bpu: group.retrieve(CounterKind::BPU),
        }
    }

    /// Counter values in record order.
    pub fn counters(&self) -> [u64; 14] {
        [
            self.cycles,
            self.instructions,
            self.cache_misses,
            self.total_branches,
            self.branch_misses,
            self.total_cycles,
            self.cpu_time,
            self.context_switches,
            self.migrations,
            self.l1_cache,
            self.l1t_cache,
            self.ll_cache,
            self.access,
            self.bpu,
        ]
    }

    fn counters_mut(&mut self) -> [&mut u64; 14] {
        [
            &mut self.cycles,
            &mut self.instructions,
            &mut self.cache_misses,
            &mut self.total_branches,
            &mut self.branch_misses,
            &mut self.total_cycles,
            &mut self.cpu_time,
            &mut self.context_switches,
            &mut self.migrations,
            &mut self.l1_cache,
            &mut self.l1t_cache,
            &mut self.ll_cache,
            &mut self.access,
            &mut self.bpu,
        ]
    }

    /// Average of several trials of the same workload.
    ///
    /// Counters are averaged with the result rounded up, the time is a plain
    /// mean and the name is taken from the first record. `None` for an empty
    /// slice.
    pub fn mean(records: &[BenchmarkRecord]) -> Option<BenchmarkRecord> {
        let first = records.first()?;
        let n = records.len() as u128;

        let mut sums = [0u128; 14];
        let mut time = 0.0;
        for r in records {
            time += r.time;
            for (s, v) in sums.iter_mut().zip(r.counters().iter()) {
                *s += u128::from(*v);
            }
        }

        let mut out = BenchmarkRecord {
            name: first.name.clone(),
            time: time / records.len() as f64,
            ..BenchmarkRecord::default()
        };
        for (field, sum) in out.counters_mut().iter_mut().zip(sums.iter()) {
            **field = ((sum + n - 1) / n) as u64;
        }
        Some(out)
    }

    pub fn per_cycle(&self) -> f64 {
        self.cycles as f64 / self.time
    }

    pub fn per_instruction(&self) -> f64 {
        self.instructions as f64 / self.time
    }

    /// Fraction of branches that were mispredicted.
    pub fn miss_percent(&self) -> f64 {
        self.branch_misses as f64 / self.total_branches as f64
    }

    pub fn cycles_per_instruction(&self) -> f64 {
        self.cycles as f64 / self.instructions as f64
    }
}

/// `x` divided over `ops` operations.
pub fn per_op(x: f64, ops: u64) -> f64 {
    x / ops as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time: f64, cycles: u64, instructions: u64) -> BenchmarkRecord {
        BenchmarkRecord {
            name: "/bin/true".to_string(),
            time,
            cycles,
            instructions,
            total_branches: 200,
            branch_misses: 10,
            ..BenchmarkRecord::default()
        }
    }

    #[test]
    fn derived_metrics() {
        let r = record(2.0, 1000, 500);
        assert_eq!(r.per_cycle(), 500.0);
        assert_eq!(r.per_instruction(), 250.0);
        assert_eq!(r.cycles_per_instruction(), 2.0);
        assert_eq!(r.miss_percent(), 0.05);
        assert_eq!(per_op(r.time, 4), 0.5);
    }

    #[test]
    fn mean_rounds_counters_up() {
        let m = BenchmarkRecord::mean(&[record(1.0, 10, 3), record(2.0, 11, 4)]).unwrap();
        assert_eq!(m.name, "/bin/true");
        assert_eq!(m.time, 1.5);
        assert_eq!(m.cycles, 11);
        assert_eq!(m.instructions, 4);
        assert_eq!(m.total_branches, 200);
        assert_eq!(m.context_switches, 0);
    }

    #[test]
    fn mean_of_nothing() {
        assert!(BenchmarkRecord::mean(&[]).is_none());
    }

    #[test]
    fn counters_follow_record_order() {
        let mut r = BenchmarkRecord::default();
        r.cycles = 1;
        r.bpu = 14;
        let c = r.counters();
        assert_eq!(c[0], 1);
        assert_eq!(c[13], 14);
    }
}
