use std::hint::black_box;

use perfbench::{bench, Resolution};

fn adder(rounds: usize) -> usize {
    let mut arr = [0usize; 4096];
    let mut x = 0usize;
    for i in 0..rounds {
        for n in arr.iter_mut() {
            *n = black_box(i + x);
            x += 1;
        }
        x += 1;
    }
    arr.iter().sum()
}

pub fn main() {
    let r = bench::benchmark_batch(Resolution::Nanoseconds, || adder(1024))
        .expect("Could not read the clock");

    println!("Time: {} ns", r.time);
    println!("Cycles per ns: {}", r.per_cycle());
    println!("Instructions per ns: {}", r.per_instruction());
    println!("Branch miss ratio: {}", r.miss_percent());
    println!("Cycles per instruction: {}", r.cycles_per_instruction());
}
