//! Architecture-specific pieces of the tracing engine: the trap
//! instruction, the general-purpose register set, and how a syscall entry
//! is read off it. Ported from `original_source/src/registers.{hpp,cpp}`
//! and the `#if defined(__x86_64__)` branches scattered through
//! `original_source/src/ptrace_misc.cpp`.

use std::mem;

use crate::error::{Error, Result};

/// A decoded syscall entry: the number plus up to 6 argument registers,
/// read at the `SYS_execve` single-step stop during the await-exec phase.
#[derive(Clone, Copy, Debug)]
pub struct SyscallEntry {
    pub number: u64,
    pub args: [u64; 6],
}

#[cfg(target_arch = "x86_64")]
pub const TRAP_INSTRUCTION: u8 = 0xCC;

pub const EXECVE_NR: u64 = libc::SYS_execve as u64;

/// Overwrites the trap byte in `word` (the lowest byte, little-endian) and
/// returns the patched word, ready for `PTRACE_POKEDATA`.
#[cfg(target_arch = "x86_64")]
pub fn patch_trap_word(word: i64) -> i64 {
    let mut bytes = word.to_ne_bytes();
    bytes[0] = TRAP_INSTRUCTION;
    i64::from_ne_bytes(bytes)
}

/// General-purpose registers of a stopped tracee, fetched and set via
/// `PTRACE_GETREGSET`/`PTRACE_SETREGSET` with `NT_PRSTATUS`, matching
/// `cpu_gp_regs`.
pub struct GpRegs {
    pid: libc::pid_t,
    #[cfg(target_arch = "x86_64")]
    regs: libc::user_regs_struct,
}

impl GpRegs {
    pub fn new(pid: libc::pid_t) -> Self {
        GpRegs {
            pid,
            #[cfg(target_arch = "x86_64")]
            regs: unsafe { mem::zeroed() },
        }
    }

    pub fn getregs(&mut self) -> Result<()> {
        let iov = libc::iovec {
            iov_base: &mut self.regs as *mut _ as *mut libc::c_void,
            iov_len: mem::size_of_val(&self.regs),
        };
        let ret = unsafe {
            libc::ptrace(libc::PTRACE_GETREGSET, self.pid, libc::NT_PRSTATUS, &iov as *const _ as *mut libc::c_void)
        };
        if ret == -1 {
            return Err(Error::ptrace(self.pid, "PTRACE_GETREGSET"));
        }
        Ok(())
    }

    pub fn setregs(&mut self) -> Result<()> {
        let iov = libc::iovec {
            iov_base: &mut self.regs as *mut _ as *mut libc::c_void,
            iov_len: mem::size_of_val(&self.regs),
        };
        let ret = unsafe {
            libc::ptrace(libc::PTRACE_SETREGSET, self.pid, libc::NT_PRSTATUS, &iov as *const _ as *mut libc::c_void)
        };
        if ret == -1 {
            return Err(Error::ptrace(self.pid, "PTRACE_SETREGSET"));
        }
        Ok(())
    }

    #[cfg(target_arch = "x86_64")]
    pub fn ip(&self) -> u64 {
        self.regs.rip
    }

    #[cfg(target_arch = "x86_64")]
    pub fn set_ip(&mut self, addr: u64) {
        self.regs.rip = addr;
    }

    /// x86_64's `int3` leaves `rip` one byte past the trap; rewind it so it
    /// points back at the trapped instruction.
    #[cfg(target_arch = "x86_64")]
    pub fn rewind_trap(&mut self) {
        self.set_ip(self.ip() - 1);
    }

    #[cfg(target_arch = "x86_64")]
    pub fn stack_pointer(&self) -> u64 {
        self.regs.rsp
    }

    #[cfg(target_arch = "x86_64")]
    pub fn syscall_entry(&self) -> SyscallEntry {
        SyscallEntry {
            number: self.regs.orig_rax as u64,
            args: [self.regs.rdi, self.regs.rsi, self.regs.rdx, self.regs.r10, self.regs.r8, self.regs.r9],
        }
    }
}

pub fn is_ppc64() -> bool {
    cfg!(target_arch = "powerpc64")
}
