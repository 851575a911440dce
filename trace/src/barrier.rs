//! The global "stop-the-world" barrier: one process-wide mutex, owned by
//! the orchestrator and shared by reference with every tracer, plus a
//! flat registry of active tracee tids used to `tgkill(SIGSTOP)` every
//! sibling when one tracer enters the breakpoint handler. Ported from
//! `original_source/src/tracer.cpp`'s `TRAP_BARRIER` and
//! `stop_tracees`/`stop_self`, generalized per the module's own
//! "barrier as a module-level mutex, passed by shared reference" note
//! (the C++ original walks an in-process parent/children tree to the
//! same effect; a flat registry reaches every sibling with less
//! bookkeeping).

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

fn tgkill(tgid: libc::pid_t, tid: libc::pid_t, signal: libc::c_int) -> Result<()> {
    let ret = unsafe { libc::syscall(libc::SYS_tgkill, tgid, tid, signal) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(Error::System { tid, call: "tgkill", source: err });
        }
    }
    Ok(())
}

/// The shared barrier mutex plus the registry of tids it protects.
pub struct TrapBarrier {
    tgid: libc::pid_t,
    active: Mutex<Vec<libc::pid_t>>,
    handler: Mutex<()>,
}

impl TrapBarrier {
    pub fn new(tgid: libc::pid_t) -> Arc<Self> {
        Arc::new(TrapBarrier { tgid, active: Mutex::new(Vec::new()), handler: Mutex::new(()) })
    }

    pub fn register(&self, tid: libc::pid_t) {
        self.active.lock().unwrap().push(tid);
    }

    pub fn unregister(&self, tid: libc::pid_t) {
        self.active.lock().unwrap().retain(|&t| t != tid);
    }

    /// Sends `SIGSTOP` to every registered tid other than `holder`.
    /// Siblings' event loops observe it on their next `waitpid` and block
    /// on [`Self::enter`] until the handler releases it.
    pub fn stop_siblings(&self, holder: libc::pid_t) -> Result<()> {
        let tids: Vec<libc::pid_t> = self.active.lock().unwrap().iter().copied().filter(|&t| t != holder).collect();
        for tid in tids {
            tgkill(self.tgid, tid, libc::SIGSTOP)?;
        }
        Ok(())
    }

    /// Acquires the handler mutex for the duration of the closure, then
    /// releases it. Called both by the breakpoint handler (proactively)
    /// and by a sibling reacting to an inflicted `SIGSTOP` (reactively,
    /// with an empty closure, to synchronize with the holder before
    /// continuing).
    pub fn enter<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.handler.lock().unwrap();
        f()
    }
}
