//! Attach phase and await-exec phase: spawn the tracee, wait for the
//! initial stop, set ptrace options, resolve the runtime load address,
//! and (for wrapper scripts) single-step through syscalls until the real
//! executable is `execve`d. Ported from `original_source/src/target.cpp`
//! and the setup half of `original_source/src/tracer.cpp`.

use std::fs;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use crate::arch;
use crate::error::{Error, Result};
use crate::mem;

/// `PTRACE_O_*` bits set right after the initial stop: trace every new
/// thread/process the tracee spawns, trace its own exit, tag syscall
/// stops so they're distinguishable from signal stops, and kill the
/// tracee if we die first.
const TRACE_OPTIONS: libc::c_long = (libc::PTRACE_O_TRACECLONE
    | libc::PTRACE_O_TRACEFORK
    | libc::PTRACE_O_TRACEVFORK
    | libc::PTRACE_O_TRACEEXIT
    | libc::PTRACE_O_TRACESYSGOOD
    | libc::PTRACE_O_EXITKILL) as libc::c_long;

/// Spawns `program` with `args`, arranging for it to call
/// `PTRACE_TRACEME` before `execve`. Returns the child's pid, which is
/// also its initial (and, absent threads, only) tid.
pub fn spawn_traced(program: &str, args: &[String]) -> Result<libc::pid_t> {
    let mut command = Command::new(program);
    command.args(args);
    unsafe {
        command.pre_exec(|| {
            if libc::ptrace(libc::PTRACE_TRACEME, 0, std::ptr::null_mut::<libc::c_void>(), std::ptr::null_mut::<libc::c_void>()) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    let child = command.spawn().map_err(|_| Error::system(0, "fork/exec"))?;
    Ok(child.id() as libc::pid_t)
}

/// Waits for the `SIGTRAP` the tracee raises on its first `execve` after
/// `PTRACE_TRACEME`, then installs [`TRACE_OPTIONS`].
pub fn wait_initial_stop(pid: libc::pid_t) -> Result<()> {
    let mut status = 0;
    let waited = unsafe { libc::waitpid(pid, &mut status, 0) };
    if waited == -1 {
        return Err(Error::system(pid, "waitpid"));
    }
    if !(libc::WIFSTOPPED(status) && libc::WSTOPSIG(status) == libc::SIGTRAP) {
        return Err(Error::UnexpectedExit(format!("initial stop was not SIGTRAP (status {status:#x})")));
    }
    let ret = unsafe { libc::ptrace(libc::PTRACE_SETOPTIONS, pid, std::ptr::null_mut::<libc::c_void>(), TRACE_OPTIONS as *mut libc::c_void) };
    if ret == -1 {
        return Err(Error::ptrace(pid, "PTRACE_SETOPTIONS"));
    }
    Ok(())
}

/// Reads the start address of the first mapping in `/proc/<pid>/maps`
/// (the runtime load base for a PIE binary); `0` for a fixed-address
/// executable, since its symbols already carry absolute addresses.
pub fn resolve_load_address(pid: libc::pid_t, is_pie: bool) -> Result<u64> {
    if !is_pie {
        return Ok(0);
    }
    let maps = fs::read_to_string(format!("/proc/{pid}/maps")).map_err(|_| Error::system(pid, "read /proc/pid/maps"))?;
    let first_line = maps.lines().next().ok_or_else(|| Error::UnexpectedExit("empty /proc/pid/maps".to_owned()))?;
    let start_hex = first_line.split('-').next().ok_or_else(|| Error::UnexpectedExit("malformed /proc/pid/maps line".to_owned()))?;
    u64::from_str_radix(start_hex, 16).map_err(|_| Error::UnexpectedExit(format!("malformed load address '{start_hex}'")))
}

/// Single-steps syscall entry/exit stops until an `execve` whose pathname
/// argument matches `expected` is observed, leaving the tracee stopped at
/// that `execve`'s entry. Used when the named executable is launched
/// indirectly through a wrapper.
pub fn await_execve(pid: libc::pid_t, expected: &Path) -> Result<()> {
    let mut at_entry = true;
    loop {
        let ret = unsafe { libc::ptrace(libc::PTRACE_SYSCALL, pid, std::ptr::null_mut::<libc::c_void>(), std::ptr::null_mut::<libc::c_void>()) };
        if ret == -1 {
            return Err(Error::ptrace(pid, "PTRACE_SYSCALL"));
        }
        let mut status = 0;
        let waited = unsafe { libc::waitpid(pid, &mut status, 0) };
        if waited == -1 {
            return Err(Error::system(pid, "waitpid"));
        }
        if libc::WIFEXITED(status) || libc::WIFSIGNALED(status) {
            return Err(Error::UnexpectedExit("tracee exited before the expected execve".to_owned()));
        }
        let is_syscall_stop = libc::WIFSTOPPED(status) && libc::WSTOPSIG(status) == (libc::SIGTRAP | 0x80);
        if !is_syscall_stop {
            continue;
        }
        if at_entry {
            let mut regs = arch::GpRegs::new(pid);
            regs.getregs()?;
            let entry = regs.syscall_entry();
            if entry.number == arch::EXECVE_NR {
                let path = mem::read_cstring(pid, entry.args[0])?;
                if Path::new(&path) == expected {
                    return Ok(());
                }
            }
        }
        at_entry = !at_entry;
    }
}
