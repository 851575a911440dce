//! ptrace-based tracing engine: attaches to a target binary, brackets
//! user-defined regions with software breakpoints, and drives an energy
//! sampler across each bracketed execution. Ported from
//! `original_source/src/tracer.cpp`, `target.cpp`, `trap.cpp`, and the
//! ptrace helper modules alongside them.

pub mod arch;
pub mod barrier;
pub mod context;
pub mod error;
pub mod launcher;
pub mod mem;
pub mod trap;
pub mod tracer;

use std::path::Path;

pub use context::{SourceLocation, TrapContext};
pub use error::{Error, Result};
pub use tracer::ExecutionRecord;
pub use trap::{EndAddr, RegisteredTraps, StartAddr, TrapSpec};

/// Runs the whole tracing session end to end: spawns `program`, attaches,
/// waits for the real executable if `wrapper_target` names one launched
/// indirectly, installs the traps `build_specs` produces (given the
/// resolved load address), and drives the tracer tree until the tracee
/// exits.
pub fn trace(
    program: &str,
    args: &[String],
    is_pie: bool,
    wrapper_target: Option<&Path>,
    build_specs: impl FnOnce(u64) -> Vec<TrapSpec>,
) -> Result<Vec<ExecutionRecord>> {
    let pid = launcher::spawn_traced(program, args)?;
    launcher::wait_initial_stop(pid)?;

    if let Some(target) = wrapper_target {
        launcher::await_execve(pid, target)?;
    }

    let load_address = launcher::resolve_load_address(pid, is_pie)?;
    let specs = build_specs(load_address);
    let traps = trap::install(pid, specs)?;

    tracer::Tracer::run_root(pid, load_address, std::sync::Arc::new(traps))
}
