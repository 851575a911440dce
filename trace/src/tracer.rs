//! One event loop per tracee thread: waits for ptrace stops, spawns a
//! sibling tracer on clone/fork/vfork, and runs the breakpoint handler
//! under the global barrier. Ported from `original_source/src/tracer.cpp`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{debug, error, info};
use nrg::Sampler;

use crate::arch::GpRegs;
use crate::barrier::TrapBarrier;
use crate::context::TrapContext;
use crate::error::{Error, Result};
use crate::mem;
use crate::trap::RegisteredTraps;

/// One bracketed execution of a region: the resolved start/end contexts,
/// the section label that owns it, and the sample stream (or the reader
/// error that cut it short).
#[derive(Debug)]
pub struct ExecutionRecord {
    pub label: String,
    pub start_context: TrapContext,
    pub end_context: TrapContext,
    pub samples: std::result::Result<Vec<nrg::Reading>, String>,
}

pub type ResultsSink = Arc<Mutex<Vec<ExecutionRecord>>>;

/// A sampler that has been `start()`ed but not yet `stop()`ed, keyed by
/// its start address so an end trap hit by a different tracer thread can
/// still find it (spec: "the trap is flagged with the tracer that
/// claimed it so an end trap can find the right sampler even across
/// siblings").
type OpenSamplers = Arc<Mutex<HashMap<u64, (Sampler, TrapContext, String)>>>;

pub struct Tracer {
    tid: libc::pid_t,
    tgid: libc::pid_t,
    entrypoint: u64,
    traps: Arc<RegisteredTraps>,
    barrier: Arc<TrapBarrier>,
    open: OpenSamplers,
    results: ResultsSink,
}

impl Tracer {
    fn new(
        tid: libc::pid_t,
        tgid: libc::pid_t,
        entrypoint: u64,
        traps: Arc<RegisteredTraps>,
        barrier: Arc<TrapBarrier>,
        open: OpenSamplers,
        results: ResultsSink,
    ) -> Self {
        barrier.register(tid);
        Tracer { tid, tgid, entrypoint, traps, barrier, open, results }
    }

    /// Attaches a freshly-created root tracer to `tid` (already stopped at
    /// its initial exec trap, with traps installed) and runs it to
    /// completion, joining every descendant tracer it spawns along the
    /// way.
    pub fn run_root(tid: libc::pid_t, entrypoint: u64, traps: Arc<RegisteredTraps>) -> Result<Vec<ExecutionRecord>> {
        let barrier = TrapBarrier::new(tid);
        let open = Arc::new(Mutex::new(HashMap::new()));
        let results: ResultsSink = Arc::new(Mutex::new(Vec::new()));
        let root = Tracer::new(tid, tid, entrypoint, traps, barrier, open, Arc::clone(&results));
        root.run()?;
        Ok(Arc::try_unwrap(results).expect("all tracer threads joined").into_inner().unwrap())
    }

    fn spawn_child(&self, new_tid: libc::pid_t) -> JoinHandle<Result<()>> {
        let child = Tracer::new(
            new_tid,
            self.tgid,
            self.entrypoint,
            Arc::clone(&self.traps),
            Arc::clone(&self.barrier),
            Arc::clone(&self.open),
            Arc::clone(&self.results),
        );
        std::thread::spawn(move || child.run())
    }

    fn cont(&self, signal: libc::c_int) -> Result<()> {
        let ret = unsafe { libc::ptrace(libc::PTRACE_CONT, self.tid, std::ptr::null_mut::<libc::c_void>(), signal as *mut libc::c_void) };
        if ret == -1 {
            return Err(Error::ptrace(self.tid, "PTRACE_CONT"));
        }
        Ok(())
    }

    fn wait(&self) -> Result<libc::c_int> {
        let mut status = 0;
        let waited = unsafe { libc::waitpid(self.tid, &mut status, 0) };
        if waited == -1 {
            return Err(Error::system(self.tid, "waitpid"));
        }
        Ok(status)
    }

    fn run(self) -> Result<()> {
        info!("[{}] started tracer, entrypoint @ {:#x}", self.tid, self.entrypoint);
        let mut children = Vec::new();
        let mut pending_signal = 0;

        let result = loop {
            if let Err(e) = self.cont(pending_signal) {
                break Err(e);
            }
            pending_signal = 0;

            let status = match self.wait() {
                Ok(s) => s,
                Err(e) => break Err(e),
            };

            if is_clone_like_event(status) {
                match self.get_event_tid() {
                    Ok(new_tid) => {
                        info!("[{}] new child tracer for tid={}", self.tid, new_tid);
                        children.push(self.spawn_child(new_tid));
                    }
                    Err(e) => break Err(e),
                }
            } else if libc::WIFSTOPPED(status) && libc::WSTOPSIG(status) == libc::SIGTRAP {
                if let Err(e) = self.service_breakpoint() {
                    break Err(e);
                }
            } else if libc::WIFSTOPPED(status) && libc::WSTOPSIG(status) == libc::SIGSTOP {
                debug!("[{}] stopped by sibling, synchronizing on barrier", self.tid);
                self.barrier.enter(|| {});
            } else if libc::WIFEXITED(status) {
                info!("[{}] tracee exited with status {}", self.tid, libc::WEXITSTATUS(status));
                break Ok(());
            } else if libc::WIFSIGNALED(status) {
                info!("[{}] tracee killed by signal {}", self.tid, libc::WTERMSIG(status));
                break Ok(());
            } else if libc::WIFSTOPPED(status) {
                let signal = libc::WSTOPSIG(status);
                debug!("[{}] received signal {} mid-flight, re-injecting", self.tid, signal);
                pending_signal = signal;
            }
        };

        self.barrier.unregister(self.tid);
        for child in children {
            match child.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        return Err(e);
                    }
                }
                Err(_) => error!("[{}] a child tracer thread panicked", self.tid),
            }
        }
        result
    }

    fn get_event_tid(&self) -> Result<libc::pid_t> {
        let mut new_tid: libc::c_ulong = 0;
        let ret = unsafe {
            libc::ptrace(libc::PTRACE_GETEVENTMSG, self.tid, std::ptr::null_mut::<libc::c_void>(), &mut new_tid as *mut _ as *mut libc::c_void)
        };
        if ret == -1 {
            return Err(Error::ptrace(self.tid, "PTRACE_GETEVENTMSG"));
        }
        Ok(new_tid as libc::pid_t)
    }

    /// Peeks the trapped address to decide whether this trap's section
    /// opts out of the stop-the-world barrier, then either runs the
    /// breakpoint protocol bare (allow-concurrency) or under the barrier,
    /// first stopping every sibling tracer so no other thread is mid-region
    /// while this one samples.
    fn service_breakpoint(&self) -> Result<()> {
        let addr = self.peek_trapped_ip()?;
        if self.allow_concurrency_for(addr) {
            self.handle_breakpoint(addr)
        } else {
            self.barrier.enter(|| {
                self.barrier.stop_siblings(self.tid)?;
                self.handle_breakpoint(addr)
            })
        }
    }

    /// Reads the instruction pointer without yet committing the rewind, so
    /// the allow-concurrency decision can be made before the barrier (if
    /// any) is taken.
    fn peek_trapped_ip(&self) -> Result<u64> {
        let mut regs = GpRegs::new(self.tid);
        regs.getregs()?;
        regs.rewind_trap();
        Ok(regs.ip())
    }

    /// A start trap's `allow_concurrency` flag governs both it and its
    /// paired end trap, since they bracket the same section.
    fn allow_concurrency_for(&self, addr: u64) -> bool {
        if let Ok(start) = self.traps.start(addr) {
            return start.allow_concurrency;
        }
        if let Ok(end) = self.traps.end_by_address(addr) {
            if let Ok(start) = self.traps.start(end.start.0) {
                return start.allow_concurrency;
            }
        }
        false
    }

    /// The eight-step breakpoint protocol: rewind past the trap, resolve
    /// start vs end, restore/single-step/reinstall the trap byte, and (for
    /// an end trap) attach the closed sampler's readings to the results
    /// sink.
    fn handle_breakpoint(&self, addr: u64) -> Result<()> {
        let mut regs = GpRegs::new(self.tid);
        regs.getregs()?;
        regs.rewind_trap();

        let original_word = if self.traps.contains_start(addr) {
            self.handle_start(addr)?
        } else if self.traps.contains_end(addr) {
            self.handle_end(addr)?
        } else {
            return Err(Error::UnknownTrap(addr));
        };

        mem::write_word(self.tid, addr, original_word)?;
        regs.setregs()?;

        let ret = unsafe { libc::ptrace(libc::PTRACE_SINGLESTEP, self.tid, std::ptr::null_mut::<libc::c_void>(), std::ptr::null_mut::<libc::c_void>()) };
        if ret == -1 {
            return Err(Error::ptrace(self.tid, "PTRACE_SINGLESTEP"));
        }
        let status = self.wait()?;
        if !(libc::WIFSTOPPED(status) && libc::WSTOPSIG(status) == libc::SIGTRAP) {
            return Err(Error::UnexpectedExit(format!("single-step past trap @ {addr:#x} diverged (status {status:#x})")));
        }

        let trap_word = crate::arch::patch_trap_word(original_word);
        mem::write_word(self.tid, addr, trap_word)?;
        Ok(())
    }

    fn handle_start(&self, addr: u64) -> Result<i64> {
        let start = self.traps.start(addr)?;
        let reader = start.reader.boxed_clone();
        let sampler = Sampler::start(reader, start.policy).map_err(|e| Error::signal_during_section(self.tid, e))?;
        info!("[{}] started region '{}' @ {:#x}", self.tid, start.label, addr);
        self.open.lock().unwrap().insert(addr, (sampler, start.trap.context.clone(), start.label.clone()));
        Ok(start.trap.original_word)
    }

    fn handle_end(&self, addr: u64) -> Result<i64> {
        let end = self.traps.end_by_address(addr)?;
        let opened = self.open.lock().unwrap().remove(&end.start.0).ok_or(Error::UnmatchedEnd(addr, end.start.0))?;
        let (sampler, start_context, label) = opened;
        let samples = sampler.stop().map_err(|e| e.to_string());
        match &samples {
            Ok(readings) => info!("[{}] closed region '{}' with {} samples", self.tid, label, readings.len()),
            Err(e) => error!("[{}] region '{}' sampler failed: {}", self.tid, label, e),
        }
        self.results.lock().unwrap().push(ExecutionRecord {
            label,
            start_context,
            end_context: end.trap.context.clone(),
            samples,
        });
        Ok(end.trap.original_word)
    }
}

fn is_clone_like_event(status: libc::c_int) -> bool {
    if !libc::WIFSTOPPED(status) || libc::WSTOPSIG(status) != libc::SIGTRAP {
        return false;
    }
    let event = status >> 8;
    event == (libc::SIGTRAP | (libc::PTRACE_EVENT_CLONE << 8))
        || event == (libc::SIGTRAP | (libc::PTRACE_EVENT_FORK << 8))
        || event == (libc::SIGTRAP | (libc::PTRACE_EVENT_VFORK << 8))
}
