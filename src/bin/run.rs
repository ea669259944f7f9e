use clap::Parser;
use log::error;

use perfbench::{Bencher, BenchmarkRecord, Resolution};

/// Benchmark programs with hardware and software performance counters
#[derive(Parser)]
#[command(name = "perfbench-run")]
#[command(about = "Run programs repeatedly and compare their averaged counters", long_about = None)]
struct Cli {
    /// Number of runs per program
    #[arg(short = 'n', long, default_value = "1")]
    runs: usize,

    /// Unit of the reported time (s, ds, ms, us, ns)
    #[arg(short, long, default_value = "ms")]
    resolution: Resolution,

    /// Programs to benchmark; arguments may follow the path, separated by
    /// whitespace, e.g. "/bin/sleep 0.1"
    #[arg(required = true)]
    programs: Vec<String>,
}

fn run_all(bencher: &Bencher, invocation: &str, runs: usize) -> Option<BenchmarkRecord> {
    let mut words = invocation.split_whitespace();
    let program = words.next()?;
    let args: Vec<&str> = words.collect();

    let mut records = Vec::with_capacity(runs);
    for _ in 0..runs {
        match bencher.benchmark_bin(program, &args) {
            Ok(r) => records.push(r),
            Err(e) => {
                error!("{}: {}", invocation, e);
                return None;
            }
        }
    }
    BenchmarkRecord::mean(&records)
}

fn print_record(r: &BenchmarkRecord, runs: usize, resolution: Resolution, winner: bool) {
    const BLUE: &str = "\x1b[34m";
    const RESET: &str = "\x1b[0m";

    println!("{}Attempted {} runs{}", BLUE, runs, RESET);
    println!(
        "{}Results for: {}{}{}",
        BLUE,
        RESET,
        r.name,
        if winner { " <- winner" } else { "" }
    );
    println!(
        "{}Total time elapsed:   {}{} {}",
        BLUE,
        RESET,
        r.time,
        resolution.suffix()
    );

    let rows = [
        ("Cycles Spent:         ", r.cycles),
        ("Total Instructions:   ", r.instructions),
        ("Total Branches:       ", r.total_branches),
        ("Branch Misses:        ", r.branch_misses),
        ("Total CPU Cycles:     ", r.total_cycles),
        ("Total CPU Time Spent: ", r.cpu_time),
        ("Context Switches:     ", r.context_switches),
        ("Core Migrations:      ", r.migrations),
        ("Cache Misses:         ", r.cache_misses),
        ("L1 Cache:             ", r.l1_cache),
        ("L1T Cache:            ", r.l1t_cache),
        ("Last Level Cache:     ", r.ll_cache),
        ("Cache Accesses:       ", r.access),
        ("Branch Predictions:   ", r.bpu),
    ];
    for (label, value) in rows.iter() {
        println!("{}{}{}{}", BLUE, label, RESET, value);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let bencher = Bencher::new().resolution(cli.resolution);
    let mut results: Vec<BenchmarkRecord> = cli
        .programs
        .iter()
        .filter_map(|p| run_all(&bencher, p, cli.runs))
        .collect();
    results.sort_by(|a, b| a.time.total_cmp(&b.time));

    println!("Sorting according to fastest time.");
    for (i, r) in results.iter().enumerate() {
        print_record(r, cli.runs, cli.resolution, i == 0);
    }
}
