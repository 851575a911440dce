//! Trap registry: two disjoint maps from trapped address to trap data,
//! installed once before the tracee runs and never mutated after.
//! Ported from `original_source/src/trap.cpp`'s `registered_traps`,
//! `start_addr`/`end_addr`, and `start_trap`/`end_trap` (the newer,
//! disjoint-map design there, not the `trap_data`/`trap_set` pair in
//! `original_source/src/trap.hpp`).

use std::collections::HashMap;
use std::fmt;

use nrg::{EnergyReader, SamplingPolicy};

use crate::context::TrapContext;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StartAddr(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EndAddr(pub u64);

impl fmt::Display for StartAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for EndAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The word originally at a trapped address, saved so the trap byte can be
/// removed and restored around the single-step that crosses it.
#[derive(Clone, Debug)]
pub struct Trap {
    pub original_word: i64,
    pub context: TrapContext,
}

/// Starts a region: carries the reader template (cloned fresh for every
/// execution) and the sampling policy that governs how long it samples.
pub struct StartTrap {
    pub trap: Trap,
    pub reader: Box<dyn EnergyReader>,
    pub policy: SamplingPolicy,
    pub allow_concurrency: bool,
    /// Display label for the owning group/section, carried through to
    /// output records.
    pub label: String,
}

/// Ends a region. Always paired with exactly one [`StartAddr`]; a
/// breakpoint at an [`EndAddr`] only closes a region if the matching start
/// trap is the one currently open.
pub struct EndTrap {
    pub trap: Trap,
    pub start: StartAddr,
}

#[derive(Default)]
pub struct RegisteredTraps {
    starts: HashMap<StartAddr, StartTrap>,
    ends: HashMap<EndAddr, EndTrap>,
}

impl RegisteredTraps {
    pub fn new() -> Self {
        RegisteredTraps::default()
    }

    pub fn insert_start(&mut self, addr: StartAddr, trap: StartTrap) -> Result<()> {
        if self.starts.contains_key(&addr) {
            return Err(Error::DuplicateTrap(addr.0));
        }
        self.starts.insert(addr, trap);
        Ok(())
    }

    pub fn insert_end(&mut self, addr: EndAddr, trap: EndTrap) -> Result<()> {
        if self.ends.contains_key(&addr) {
            return Err(Error::DuplicateTrap(addr.0));
        }
        self.ends.insert(addr, trap);
        Ok(())
    }

    pub fn start(&self, addr: u64) -> Result<&StartTrap> {
        self.starts.get(&StartAddr(addr)).ok_or(Error::UnknownTrap(addr))
    }

    /// Looks up the end trap at `addr`, requiring it be paired with the
    /// start trap currently open at `expected_start`.
    pub fn end(&self, addr: u64, expected_start: u64) -> Result<&EndTrap> {
        let end = self.ends.get(&EndAddr(addr)).ok_or(Error::UnknownTrap(addr))?;
        if end.start.0 != expected_start {
            return Err(Error::UnmatchedEnd(addr, expected_start));
        }
        Ok(end)
    }

    pub fn contains_start(&self, addr: u64) -> bool {
        self.starts.contains_key(&StartAddr(addr))
    }

    pub fn contains_end(&self, addr: u64) -> bool {
        self.ends.contains_key(&EndAddr(addr))
    }

    pub fn start_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.starts.keys().map(|a| a.0)
    }

    pub fn end_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.ends.keys().map(|a| a.0)
    }

    /// Straight address lookup, with no expected-start validation; used
    /// by the breakpoint handler, which reads the associated start off
    /// the returned trap and checks it against the currently open
    /// samplers itself.
    pub fn end_by_address(&self, addr: u64) -> Result<&EndTrap> {
        self.ends.get(&EndAddr(addr)).ok_or(Error::UnknownTrap(addr))
    }
}

/// What the orchestrator wants registered at one address, before the
/// original word there has been read out via `PTRACE_PEEKDATA`.
pub enum TrapSpec {
    Start {
        address: u64,
        context: TrapContext,
        reader: Box<dyn EnergyReader>,
        policy: SamplingPolicy,
        allow_concurrency: bool,
        label: String,
    },
    End { address: u64, context: TrapContext, start: u64 },
}

/// Installs every spec's trap byte in the stopped tracee and assembles
/// the resulting [`RegisteredTraps`]. Must run after the attach phase
/// (and, if applicable, the await-exec phase) and before the first
/// `PTRACE_CONT`.
pub fn install(pid: libc::pid_t, specs: Vec<TrapSpec>) -> Result<RegisteredTraps> {
    let mut traps = RegisteredTraps::new();
    for spec in specs {
        match spec {
            TrapSpec::Start { address, context, reader, policy, allow_concurrency, label } => {
                let original_word = crate::mem::install_trap(pid, address)?;
                traps.insert_start(
                    StartAddr(address),
                    StartTrap { trap: Trap { original_word, context }, reader, policy, allow_concurrency, label },
                )?;
            }
            TrapSpec::End { address, context, start } => {
                let original_word = crate::mem::install_trap(pid, address)?;
                traps.insert_end(EndAddr(address), EndTrap { trap: Trap { original_word, context }, start: StartAddr(start) })?;
            }
        }
    }
    Ok(traps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrg::reading::SensorLayout;
    use nrg::Reading;

    struct NullReader(SensorLayout);
    impl EnergyReader for NullReader {
        fn layout(&self) -> &SensorLayout {
            &self.0
        }
        fn read(&mut self) -> nrg::Result<Reading> {
            Ok(self.0.new_reading())
        }
        fn boxed_clone(&self) -> Box<dyn EnergyReader> {
            Box::new(NullReader(self.0.clone()))
        }
    }

    fn start_trap(label: &str) -> StartTrap {
        StartTrap {
            trap: Trap { original_word: 0, context: TrapContext::Address { address: 0x1000 } },
            reader: Box::new(NullReader(SensorLayout::new(0, 0))),
            policy: SamplingPolicy::Short,
            allow_concurrency: false,
            label: label.to_owned(),
        }
    }

    fn end_trap(start: StartAddr) -> EndTrap {
        EndTrap { trap: Trap { original_word: 0, context: TrapContext::Address { address: 0x1010 } }, start }
    }

    #[test]
    fn insertion_is_exclusive() {
        let mut traps = RegisteredTraps::new();
        traps.insert_start(StartAddr(0x1000), start_trap("a")).unwrap();
        let err = traps.insert_start(StartAddr(0x1000), start_trap("b")).unwrap_err();
        assert!(matches!(err, Error::DuplicateTrap(0x1000)));
    }

    #[test]
    fn end_lookup_requires_matching_start() {
        let mut traps = RegisteredTraps::new();
        traps.insert_start(StartAddr(0x1000), start_trap("a")).unwrap();
        traps.insert_end(EndAddr(0x1010), end_trap(StartAddr(0x1000))).unwrap();

        assert!(traps.end(0x1010, 0x1000).is_ok());
        let err = traps.end(0x1010, 0x2000).unwrap_err();
        assert!(matches!(err, Error::UnmatchedEnd(0x1010, 0x2000)));
    }

    #[test]
    fn unknown_trap_is_reported() {
        let traps = RegisteredTraps::new();
        let err = traps.start(0x4242).unwrap_err();
        assert!(matches!(err, Error::UnknownTrap(0x4242)));
    }
}
