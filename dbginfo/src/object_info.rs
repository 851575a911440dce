//! Top-level debug-info index for one executable or shared object.
//! Construction order mirrors `original_source/src/dbg/object_info.cpp`'s
//! `object_info::impl`: parse the ELF header, scan the symbol table, then
//! walk every DWARF compilation unit.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use gimli::{Dwarf, EndianSlice, RunTimeEndian};
use object::read::elf::ElfFile64;
use object::{Endianness, Object, ObjectSection};

use crate::dwarf::{self, CompilationUnit};
use crate::elf::{self, ExecutableHeader, FunctionSymbol};
use crate::error::{Error, Result};

/// Parsed ELF header, function symbol table, and DWARF compilation units
/// for one binary, kept alive for the lifetime of all later queries.
#[derive(Debug)]
pub struct ObjectInfo {
    header: ExecutableHeader,
    function_symbols: Vec<FunctionSymbol>,
    compilation_units: Vec<CompilationUnit>,
}

impl ObjectInfo {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = elf::parse_executable_header(data)?;
        let function_symbols = elf::parse_function_symbols(data)?;
        let compilation_units = load_compilation_units(data)?;
        Ok(ObjectInfo {
            header,
            function_symbols,
            compilation_units,
        })
    }

    pub fn header(&self) -> &ExecutableHeader {
        &self.header
    }

    pub fn function_symbols(&self) -> &[FunctionSymbol] {
        &self.function_symbols
    }

    pub fn compilation_units(&self) -> &[CompilationUnit] {
        &self.compilation_units
    }

    /// Assembles an `ObjectInfo` from already-parsed parts, bypassing ELF
    /// and DWARF parsing. Used by tests to build fixtures without a real
    /// compiled binary on disk.
    #[cfg(test)]
    pub(crate) fn from_parts(header: ExecutableHeader, function_symbols: Vec<FunctionSymbol>, compilation_units: Vec<CompilationUnit>) -> Self {
        ObjectInfo {
            header,
            function_symbols,
            compilation_units,
        }
    }
}

fn load_compilation_units(data: &[u8]) -> Result<Vec<CompilationUnit>> {
    let elf = ElfFile64::<Endianness>::parse(data)
        .map_err(|e| Error::setup(format!("not a valid ELF object: {e}")))?;
    let endian = if elf.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let dwarf_cow: Dwarf<Cow<[u8]>> = Dwarf::load(|id| -> Result<Cow<[u8]>> {
        Ok(elf
            .section_by_name(id.name())
            .and_then(|s| s.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[])))
    })?;
    let dwarf = dwarf_cow.borrow(|section| EndianSlice::new(section, endian));

    let mut units = Vec::new();
    let mut headers = dwarf.units();
    while let Some(header) = headers
        .next()
        .map_err(|e| Error::format(format!("bad compilation unit header: {e}")))?
    {
        let unit = dwarf
            .unit(header)
            .map_err(|e| Error::format(format!("bad compilation unit: {e}")))?;
        let mut cursor = unit.entries();
        let Some((_, root)) = cursor
            .next_dfs()
            .map_err(|e| Error::format(format!("bad compilation unit root DIE: {e}")))?
        else {
            continue;
        };
        units.push(dwarf::parse_compilation_unit(&dwarf, &unit, root)?);
    }
    Ok(units)
}
