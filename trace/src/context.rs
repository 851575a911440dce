//! What a trap address means: a bare instruction address, a source line,
//! a function entry/return, or an inlined-instance entry. Replaces the
//! type-erased `trap_context` concept_t/model_t wrapper in
//! `original_source/src/trap_context.hpp` with a plain enum over the
//! concrete variants in `original_source/src/trap_types.hpp`; each
//! variant owns its data rather than borrowing from the `dbginfo` index,
//! so a [`TrapContext`] can be moved freely across tracer threads.

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug)]
pub enum TrapContext {
    /// A raw address with no further resolution (fallback when the region
    /// config names a bare address, or resolution is disabled).
    Address { address: u64 },
    /// A specific source line within a compilation unit.
    SourceLine { address: u64, cu: PathBuf, location: SourceLocation },
    /// The entry point of a function, named by its (possibly demangled)
    /// linkage name.
    FunctionCall { address: u64, cu: PathBuf, function: String },
    /// The entry point of one instance of an inlined function.
    InlineFunction { address: u64, cu: PathBuf, function: String, call_site: SourceLocation },
    /// A function's return address.
    FunctionReturn { address: u64, cu: PathBuf, function: String },
}

impl TrapContext {
    pub fn address(&self) -> u64 {
        match self {
            TrapContext::Address { address }
            | TrapContext::SourceLine { address, .. }
            | TrapContext::FunctionCall { address, .. }
            | TrapContext::InlineFunction { address, .. }
            | TrapContext::FunctionReturn { address, .. } => *address,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, TrapContext::FunctionCall { .. } | TrapContext::InlineFunction { .. })
    }
}

impl std::fmt::Display for TrapContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrapContext::Address { address } => write!(f, "0x{address:x}"),
            TrapContext::SourceLine { cu, location, .. } => {
                write!(f, "{}:{}:{} ({})", location.file.display(), location.line, location.column, cu.display())
            }
            TrapContext::FunctionCall { function, .. } => write!(f, "call to {function}"),
            TrapContext::InlineFunction { function, call_site, .. } => {
                write!(f, "inline {function} (from {}:{})", call_site.file.display(), call_site.line)
            }
            TrapContext::FunctionReturn { function, .. } => write!(f, "return from {function}"),
        }
    }
}
