use std::fmt;

/// Error taxonomy for the tracing engine, mirrored from
/// `original_source/src/error.hpp`'s `tracer_errcode` enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `ptrace(2)` call returned -1; the message names the request and
    /// the tid that issued it.
    #[error("ptrace error (tid {tid}): {request}: {source}")]
    Ptrace { tid: i32, request: &'static str, source: std::io::Error },

    /// Any other syscall (`fork`, `waitpid`, `tgkill`, `/proc` access)
    /// failed.
    #[error("system error (tid {tid}): {call}: {source}")]
    System { tid: i32, call: &'static str, source: std::io::Error },

    /// The tracee received a signal other than `SIGTRAP`/`SIGSTOP` while a
    /// region was active, or exited unexpectedly mid single-step.
    #[error("signal during section (tid {tid}): {detail}")]
    SignalDuringSection { tid: i32, detail: String },

    /// A breakpoint fired at an address with no registered trap.
    #[error("no trap registered at address {0:#x}")]
    UnknownTrap(u64),

    /// An end trap fired without a matching start trap having run first.
    #[error("end trap at {0:#x} has no active start (start address {1:#x})")]
    UnmatchedEnd(u64, u64),

    /// A trap registration collided with an already-registered address.
    #[error("trap already registered at address {0:#x}")]
    DuplicateTrap(u64),

    /// The tracee exited or was killed by a signal before tracing finished.
    #[error("tracee exited unexpectedly: {0}")]
    UnexpectedExit(String),
}

impl Error {
    pub fn ptrace(tid: i32, request: &'static str) -> Self {
        Error::Ptrace { tid, request, source: std::io::Error::last_os_error() }
    }

    pub fn system(tid: i32, call: &'static str) -> Self {
        Error::System { tid, call, source: std::io::Error::last_os_error() }
    }

    pub fn signal_during_section(tid: i32, detail: impl fmt::Display) -> Self {
        Error::SignalDuringSection { tid, detail: detail.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
