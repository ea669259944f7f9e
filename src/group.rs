//! A fixed set of counters of distinct kinds, driven together.
//!
//! Group operations visit the members one after another in declaration
//! order. The kernel offers no atomic multi-descriptor enable outside of
//! leader-based groups, so members start and stop a few hundred nanoseconds
//! apart; that skew is part of the measurement.

use log::warn;

use crate::counter::{Counter, CounterKind};
use crate::error::{Error, Result};
use crate::Pid;

/// Lifecycle every group member supports.
pub trait Member {
    fn kind(&self) -> CounterKind;
    fn is_open(&self) -> bool;
    fn open(&mut self) -> Result<()>;
    fn reopen(&mut self, pid: Pid) -> Result<()>;
    fn begin(&self) -> Result<()>;
    fn end(&self) -> Result<()>;
    fn retrieve(&self) -> u64;
}

impl Member for Counter {
    fn kind(&self) -> CounterKind {
        Counter::kind(self)
    }

    fn is_open(&self) -> bool {
        Counter::is_open(self)
    }

    fn open(&mut self) -> Result<()> {
        Counter::open(self)
    }

    fn reopen(&mut self, pid: Pid) -> Result<()> {
        Counter::reopen(self, pid)
    }

    fn begin(&self) -> Result<()> {
        Counter::begin(self)
    }

    fn end(&self) -> Result<()> {
        Counter::end(self)
    }

    fn retrieve(&self) -> u64 {
        Counter::retrieve(self)
    }
}

/// Ordered collection of members, no two of the same kind.
#[derive(Debug)]
pub struct EventGroup<C = Counter> {
    members: Vec<C>,
}

impl EventGroup<Counter> {
    /// Configures one counter per kind and opens each for the caller.
    ///
    /// Members the kernel refuses stay closed and read as zero.
    pub fn new<I>(kinds: I) -> Result<EventGroup<Counter>>
    where
        I: IntoIterator<Item = CounterKind>,
    {
        let mut group = EventGroup::quiet(kinds)?;
        if let Err(e) = group.open() {
            warn!("counter group partially opened: {}", e);
        }
        Ok(group)
    }

    /// Configures one counter per kind without opening any of them.
    pub fn quiet<I>(kinds: I) -> Result<EventGroup<Counter>>
    where
        I: IntoIterator<Item = CounterKind>,
    {
        EventGroup::from_members(kinds.into_iter().map(Counter::quiet))
    }
}

impl<C: Member> EventGroup<C> {
    /// Groups existing members, rejecting a repeated kind.
    pub fn from_members<I>(members: I) -> Result<EventGroup<C>>
    where
        I: IntoIterator<Item = C>,
    {
        let mut group: Vec<C> = Vec::new();
        for m in members {
            if group.iter().any(|g| g.kind() == m.kind()) {
                return Err(Error::DuplicateKind(m.kind()));
            }
            group.push(m);
        }
        Ok(EventGroup { members: group })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = CounterKind> + '_ {
        self.members.iter().map(|m| m.kind())
    }

    pub fn iter(&self) -> impl Iterator<Item = &C> {
        self.members.iter()
    }

    /// The member of `kind`, if the group was declared with it.
    pub fn get(&self, kind: CounterKind) -> Option<&C> {
        self.members.iter().find(|m| m.kind() == kind)
    }

    /// Value of the member of `kind`, zero when absent or unreadable.
    pub fn retrieve(&self, kind: CounterKind) -> u64 {
        self.get(kind).map_or(0, Member::retrieve)
    }

    pub fn opened(&self) -> usize {
        self.members.iter().filter(|m| m.is_open()).count()
    }

    /// Opens every member for the caller.
    pub fn open(&mut self) -> Result<()> {
        each_mut(&mut self.members, |m| m.open())
    }

    /// Moves every member to process `pid`.
    pub fn reopen(&mut self, pid: Pid) -> Result<()> {
        each_mut(&mut self.members, |m| m.reopen(pid))
    }

    /// Starts every open member.
    #[inline(always)]
    pub fn begin(&self) -> Result<()> {
        each(&self.members, |m| m.begin())
    }

    /// Stops every open member.
    #[inline(always)]
    pub fn end(&self) -> Result<()> {
        each(&self.members, |m| m.end())
    }
}

// Visits every member even after a failure and reports the first error.
fn each_mut<C: Member>(members: &mut [C], mut op: impl FnMut(&mut C) -> Result<()>) -> Result<()> {
    let mut first = None;
    for m in members.iter_mut() {
        if let Err(e) = op(m) {
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

fn each<C: Member>(members: &[C], op: impl Fn(&C) -> Result<()>) -> Result<()> {
    let mut first = None;
    for m in members.iter().filter(|m| m.is_open()) {
        if let Err(e) = op(m) {
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::STANDARD_KINDS;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct Fake {
        kind: CounterKind,
        open: bool,
        fail_open: bool,
        log: Rc<RefCell<Vec<(&'static str, CounterKind)>>>,
    }

    impl Member for Fake {
        fn kind(&self) -> CounterKind {
            self.kind
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn open(&mut self) -> Result<()> {
            self.log.borrow_mut().push(("open", self.kind));
            if self.fail_open {
                return Err(Error::NotOpen);
            }
            self.open = true;
            Ok(())
        }
        fn reopen(&mut self, _pid: Pid) -> Result<()> {
            self.log.borrow_mut().push(("reopen", self.kind));
            self.open = !self.fail_open;
            Ok(())
        }
        fn begin(&self) -> Result<()> {
            self.log.borrow_mut().push(("begin", self.kind));
            Ok(())
        }
        fn end(&self) -> Result<()> {
            self.log.borrow_mut().push(("end", self.kind));
            Ok(())
        }
        fn retrieve(&self) -> u64 {
            42
        }
    }

    fn fakes(
        kinds: &[CounterKind],
        failing: CounterKind,
    ) -> (Vec<Fake>, Rc<RefCell<Vec<(&'static str, CounterKind)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let members = kinds
            .iter()
            .map(|&kind| Fake {
                kind,
                open: false,
                fail_open: kind == failing,
                log: log.clone(),
            })
            .collect();
        (members, log)
    }

    #[test]
    fn duplicate_kinds_are_rejected() {
        let r = EventGroup::quiet(vec![
            CounterKind::CYCLES,
            CounterKind::INSTRUCTIONS,
            CounterKind::CYCLES,
        ]);
        assert!(matches!(r, Err(Error::DuplicateKind(k)) if k == CounterKind::CYCLES));
    }

    #[test]
    fn quiet_group_keeps_declaration_order() {
        let g = EventGroup::quiet(STANDARD_KINDS.iter().copied()).unwrap();
        assert_eq!(g.len(), 14);
        assert_eq!(g.opened(), 0);
        assert!(g.kinds().eq(STANDARD_KINDS.iter().copied()));
        assert_eq!(g.get(CounterKind::BPU).unwrap().kind(), CounterKind::BPU);
        assert!(g.get(CounterKind::KERNEL_CYCLES).is_none());
        assert_eq!(g.retrieve(CounterKind::KERNEL_CYCLES), 0);
    }

    #[test]
    fn operations_visit_members_in_order() {
        let kinds = [
            CounterKind::MIGRATIONS,
            CounterKind::CYCLES,
            CounterKind::L1D,
        ];
        let (members, log) = fakes(&kinds, CounterKind::CYCLES);
        let mut g = EventGroup::from_members(members).unwrap();

        // The failing member does not stop the others from opening.
        assert!(g.open().is_err());
        assert_eq!(g.opened(), 2);

        g.begin().unwrap();
        g.end().unwrap();
        let log = log.borrow();
        let ops: Vec<(&str, CounterKind)> = log.clone();
        assert_eq!(
            ops,
            vec![
                ("open", CounterKind::MIGRATIONS),
                ("open", CounterKind::CYCLES),
                ("open", CounterKind::L1D),
                ("begin", CounterKind::MIGRATIONS),
                ("begin", CounterKind::L1D),
                ("end", CounterKind::MIGRATIONS),
                ("end", CounterKind::L1D),
            ]
        );
        assert_eq!(g.retrieve(CounterKind::L1D), 42);
    }

    #[test]
    fn reopen_reaches_every_member() {
        let kinds = [CounterKind::CPU_TIME, CounterKind::BRANCHES];
        let (members, log) = fakes(&kinds, CounterKind::BPU);
        let mut g = EventGroup::from_members(members).unwrap();
        g.reopen(1234).unwrap();
        assert_eq!(g.opened(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                ("reopen", CounterKind::CPU_TIME),
                ("reopen", CounterKind::BRANCHES)
            ]
        );
    }
}
