//! ELF symbol-table scan. Ported from the shape of
//! `original_source/src/dbg/elf.{hpp,cpp}`: an `executable_header` plus a
//! flat, sorted list of `function_symbol`s, each carrying enough of
//! `st_other` to compute a ppc64 ELFv2 local entry point.

use object::elf::{STB_GLOBAL, STB_LOCAL, STB_WEAK, STV_DEFAULT, STV_HIDDEN, STV_INTERNAL, STV_PROTECTED};
use object::read::elf::{ElfFile64, FileHeader};
use object::{Endianness, Object, ObjectSymbol, SymbolFlags, SymbolKind};

use crate::error::{Error, Result};

/// `ET_EXEC` vs `ET_DYN`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutableType {
    Executable,
    SharedObject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolVisibility {
    Default,
    Internal,
    Hidden,
    Protected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolBinding {
    Local,
    Global,
    Weak,
}

#[derive(Clone, Debug)]
pub struct ExecutableHeader {
    pub kind: ExecutableType,
    pub entrypoint_address: u64,
}

/// ppc64 ELFv2 ABI: bits 5..7 of `st_other` encode the local entry point
/// offset from the global entry point, per the table in the ABI spec
/// referenced by `original_source/src/dbg/elf.cpp`.
const STO_PPC64_LOCAL_BIT: u8 = 5;
const STO_PPC64_LOCAL_MASK: u8 = 0b1110_0000;

fn ppc64_local_entry_offset(st_other: u8) -> u64 {
    let masked = (st_other & STO_PPC64_LOCAL_MASK) >> STO_PPC64_LOCAL_BIT;
    match masked {
        0 | 1 => 0,
        n if n <= 6 => 1u64 << n,
        _ => 0,
    }
}

#[derive(Clone, Debug)]
pub struct FunctionSymbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub visibility: SymbolVisibility,
    pub binding: SymbolBinding,
    pub(crate) st_other: u8,
}

#[cfg(test)]
impl FunctionSymbol {
    pub(crate) fn new_for_test(name: &str, address: u64, binding: SymbolBinding) -> Self {
        FunctionSymbol {
            name: name.to_owned(),
            address,
            size: 0,
            visibility: SymbolVisibility::Default,
            binding,
            st_other: 0,
        }
    }
}

impl FunctionSymbol {
    pub fn global_entrypoint(&self) -> u64 {
        self.address
    }

    /// On ppc64 this differs from [`Self::global_entrypoint`] when the
    /// function has a local entry point distinct from the global one
    /// (ELFv2 ABI); on other architectures it is the same address.
    pub fn local_entrypoint(&self, is_ppc64: bool) -> u64 {
        if is_ppc64 {
            self.global_entrypoint() + ppc64_local_entry_offset(self.st_other)
        } else {
            self.global_entrypoint()
        }
    }
}

fn visibility_of(st_other: u8) -> Result<SymbolVisibility> {
    match st_other & 0x3 {
        STV_DEFAULT => Ok(SymbolVisibility::Default),
        STV_INTERNAL => Ok(SymbolVisibility::Internal),
        STV_HIDDEN => Ok(SymbolVisibility::Hidden),
        STV_PROTECTED => Ok(SymbolVisibility::Protected),
        other => Err(Error::format(format!("invalid symbol visibility {other}"))),
    }
}

pub fn parse_executable_header(data: &[u8]) -> Result<ExecutableHeader> {
    let elf = ElfFile64::<Endianness>::parse(data)
        .map_err(|e| Error::setup(format!("not a valid ELF object: {e}")))?;
    let header = elf.raw_header();
    let kind = match header.e_type(elf.endian()) {
        object::elf::ET_EXEC => ExecutableType::Executable,
        object::elf::ET_DYN => ExecutableType::SharedObject,
        other => return Err(Error::setup(format!("unsupported e_type {other}"))),
    };
    Ok(ExecutableHeader {
        kind,
        entrypoint_address: elf.entry(),
    })
}

/// Every `STT_FUNC` symbol with binding in {local, global, weak} and a
/// defined section index, sorted by (name, address).
pub fn parse_function_symbols(data: &[u8]) -> Result<Vec<FunctionSymbol>> {
    let elf = ElfFile64::<Endianness>::parse(data)
        .map_err(|e| Error::setup(format!("not a valid ELF object: {e}")))?;

    let mut symbols = Vec::new();
    for sym in elf.symbols() {
        if sym.kind() != SymbolKind::Text {
            continue;
        }
        if !matches!(sym.section(), object::SymbolSection::Section(_)) {
            continue;
        }
        let (st_info_top, st_other) = match sym.flags() {
            SymbolFlags::Elf { st_info, st_other } => (Some(st_info >> 4), st_other),
            _ => (None, 0),
        };
        let binding = match st_info_top {
            Some(STB_LOCAL) => SymbolBinding::Local,
            Some(STB_GLOBAL) => SymbolBinding::Global,
            Some(STB_WEAK) => SymbolBinding::Weak,
            Some(other) => {
                return Err(Error::format(format!("unsupported symbol binding {other}")));
            }
            None => continue,
        };
        let name = match sym.name() {
            Ok(n) => n.to_owned(),
            Err(_) => continue,
        };
        let visibility = visibility_of(st_other)?;
        symbols.push(FunctionSymbol {
            name,
            address: sym.address(),
            size: sym.size(),
            visibility,
            binding,
            st_other,
        });
    }
    symbols.sort_by(|a, b| a.name.cmp(&b.name).then(a.address.cmp(&b.address)));
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppc64_local_entry_offset_table() {
        assert_eq!(ppc64_local_entry_offset(0 << STO_PPC64_LOCAL_BIT), 0);
        assert_eq!(ppc64_local_entry_offset(1 << STO_PPC64_LOCAL_BIT), 0);
        assert_eq!(ppc64_local_entry_offset(2 << STO_PPC64_LOCAL_BIT), 4);
        assert_eq!(ppc64_local_entry_offset(6 << STO_PPC64_LOCAL_BIT), 64);
    }
}
