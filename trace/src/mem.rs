//! Tracee memory access built on `PTRACE_PEEKDATA`/`PTRACE_POKEDATA`.
//! Ported from `original_source/src/ptrace_misc.{hpp,cpp}`.

use crate::arch;
use crate::error::{Error, Result};

pub fn read_word(pid: libc::pid_t, addr: u64) -> Result<i64> {
    unsafe { *libc::__errno_location() = 0 };
    let word = unsafe { libc::ptrace(libc::PTRACE_PEEKDATA, pid, addr as *mut libc::c_void, std::ptr::null_mut::<libc::c_void>()) };
    if word == -1 && unsafe { *libc::__errno_location() } != 0 {
        return Err(Error::ptrace(pid, "PTRACE_PEEKDATA"));
    }
    Ok(word as i64)
}

pub fn write_word(pid: libc::pid_t, addr: u64, word: i64) -> Result<()> {
    let ret = unsafe {
        libc::ptrace(libc::PTRACE_POKEDATA, pid, addr as *mut libc::c_void, word as *mut libc::c_void)
    };
    if ret == -1 {
        return Err(Error::ptrace(pid, "PTRACE_POKEDATA"));
    }
    Ok(())
}

/// Reads a NUL-terminated string from the tracee's address space, one
/// word at a time.
pub fn read_cstring(pid: libc::pid_t, address: u64) -> Result<String> {
    let wordsz = std::mem::size_of::<i64>();
    let mut bytes = Vec::with_capacity(64);
    let mut addr = address;
    loop {
        let word = read_word(pid, addr)?;
        let word_bytes = word.to_ne_bytes();
        if let Some(nul) = word_bytes.iter().position(|&b| b == 0) {
            bytes.extend_from_slice(&word_bytes[..nul]);
            break;
        }
        bytes.extend_from_slice(&word_bytes);
        addr += wordsz as u64;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// `PEEKDATA`s the word at `addr`, ORs in the architecture trap byte,
/// `POKEDATA`s it back, and returns the original word so it can be
/// restored later.
pub fn install_trap(pid: libc::pid_t, addr: u64) -> Result<i64> {
    let word = read_word(pid, addr)?;
    let patched = arch::patch_trap_word(word);
    write_word(pid, addr, patched)?;
    Ok(word)
}
