use perfbench::arch::{Domain, PerfCounter, PerfCounterBuilderLinux, SoftwareEventType};
use perfbench::{AbstractPerfCounter, Counter, CounterKind, Subject};

const FAULT_BUF: usize = 1024 * 1024 * 16;

fn available(kind: CounterKind) -> bool {
    match Counter::new(kind) {
        Ok(_) => true,
        Err(e) if e.is_permission_denied() => {
            eprintln!("{} denied by perf_event_paranoid, skipping", kind);
            false
        }
        Err(e) => {
            eprintln!("{} unavailable, skipping: {}", kind, e);
            false
        }
    }
}

// Big enough to be mmaped rather than served from a preallocated arena, so
// the first write to a page faults.
fn touch_fresh_page(buf: &mut Vec<u8>, offset: usize) {
    unsafe { std::ptr::write_volatile(buf.as_mut_ptr().add(offset), 0x1) }
}

fn page_fault_counter() -> Option<PerfCounter> {
    let pc = match PerfCounterBuilderLinux::from_software_event(SoftwareEventType::PageFaults)
        .exclude_kernel()
        .finish()
    {
        Ok(pc) => pc,
        Err(e) => {
            eprintln!("page fault counter unavailable, skipping: {}", e);
            return None;
        }
    };

    let mut buf: Vec<u8> = Vec::with_capacity(FAULT_BUF);
    pc.start().ok()?;
    touch_fresh_page(&mut buf, 0);
    pc.stop().ok()?;
    if pc.read().ok()? == 0 {
        eprintln!("page faults are not reported on this kernel, skipping");
        return None;
    }
    Some(pc)
}

#[test]
pub fn test_page_faults() {
    let pc = match page_fault_counter() {
        Some(pc) => pc,
        None => return,
    };

    let mut buf: Vec<u8> = Vec::with_capacity(FAULT_BUF);
    pc.start().expect("Can not start the counter");
    // Touch two pages in different huge pages.
    touch_fresh_page(&mut buf, 0);
    touch_fresh_page(&mut buf, FAULT_BUF / 2);
    pc.stop().expect("Can not stop the counter");

    assert!(pc.read().expect("Can not read the counter") >= 2);
}

#[test]
pub fn test_start_resets_accumulator() {
    if !available(CounterKind::CPU_TIME) {
        return;
    }
    let pc = PerfCounterBuilderLinux::from_software_event(SoftwareEventType::TaskClock)
        .in_domain(Domain::User)
        .finish()
        .expect("Could not create counter");

    pc.start().expect("Can not start the counter");
    std::thread::sleep(std::time::Duration::from_millis(1));
    let mut x = 0u64;
    for i in 0..5_000_000u64 {
        x = std::hint::black_box(x.wrapping_add(i));
    }
    pc.stop().expect("Can not stop the counter");
    let v1 = pc.read().expect("Can not read the counter");

    pc.start().expect("Can not start the counter");
    pc.stop().expect("Can not stop the counter");
    let v2 = pc.read().expect("Can not read the counter");

    assert!(v1 > 0);
    assert!(v2 < v1, "second window {} should not include the first {}", v2, v1);
}

#[test]
pub fn test_reopen_keeps_configuration() {
    if !available(CounterKind::CPU_TIME) {
        return;
    }
    let mut c = Counter::new(CounterKind::CPU_TIME).expect("Could not create counter");
    let attr = *c.binding().attr();

    let pid = perfbench::process::spawn("/bin/sh", &["-c", "i=0; while [ $i -lt 2000 ]; do i=$((i+1)); done"])
        .expect("Could not spawn");
    let attached = c.reopen(pid);
    if attached.is_ok() {
        assert_eq!(c.binding().subject(), Some(Subject::Process(pid)));
        // The subject may already have exited.
        let _ = c.begin();
    }
    perfbench::process::wait(pid).expect("Could not wait");
    if attached.is_ok() {
        let _ = c.end();
    }

    assert_eq!(*c.binding().attr(), attr);
    assert_eq!(c.kind(), CounterKind::CPU_TIME);

    c.reopen_caller().expect("Could not reopen for the caller");
    assert_eq!(c.binding().subject(), Some(Subject::Caller));
    let n = c
        .measure(|| {
            let mut x = 0u64;
            for i in 0..1_000_000u64 {
                x = std::hint::black_box(x ^ i);
            }
            x
        })
        .expect("Can not measure");
    assert!(n > 0);
}
