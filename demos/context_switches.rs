use perfbench::arch::Domain;
use perfbench::arch::PerfCounterBuilderLinux as Builder;
use perfbench::arch::SoftwareEventType as Software;
use perfbench::{AbstractPerfCounter, Counter, CounterKind};

pub fn main() {
    let pc = Builder::from_software_event(Software::ContextSwitches)
        .in_domain(Domain::Everything)
        .for_caller()
        .finish()
        .expect("Could not create counter");

    pc.start().expect("Can not start the counter");
    std::thread::sleep(std::time::Duration::new(1, 0));
    pc.stop().expect("Can not stop the counter");

    println!(
        "Context Switches/s: {:?}",
        pc.read().expect("Can not read counter")
    );
    pc.reset().expect("Can not reset the counter");

    let c = Counter::new(CounterKind::CONTEXT_SWITCHES).expect("Could not create counter");
    let n = c
        .measure(|| {
            for _ in 0..10 {
                std::thread::yield_now();
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        })
        .expect("Can not measure");
    println!("Context switches over ten short sleeps: {}", n);
}
