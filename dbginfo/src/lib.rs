//! ELF + DWARF debug-info index: resolve source locations, function
//! names, and address ranges to each other for one executable or shared
//! object. Ported from `original_source/src/dbg/`, replacing `libelf` +
//! `libdw` with the `object` and `gimli` crates.

pub mod demangle;
pub mod dwarf;
pub mod elf;
pub mod error;
pub mod object_info;
pub mod query;

pub use demangle::demangle;
pub use dwarf::{CompilationUnit, ContiguousRange, Function, FunctionAddresses, InlineInstance, LineContext, SourceLine, SourceLocation};
pub use elf::{ExecutableHeader, ExecutableType, FunctionSymbol, SymbolBinding, SymbolVisibility};
pub use error::{Error, Result};
pub use object_info::ObjectInfo;
pub use query::{Exactness, NewStatement};
