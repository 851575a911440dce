//! Query families over a loaded [`ObjectInfo`]. Ported from
//! `original_source/src/dbg/utility_funcs.{hpp,cpp}`: resolve compilation
//! units, source lines, symbols, and functions to each other, preserving
//! the exact ambiguity-detection rules of the original (static/weak
//! binding preference, GCC clone-suffix partitioning, declaration-site
//! precision tracking for error selection).

use std::path::Path;

use crate::demangle::demangle;
use crate::dwarf::{CompilationUnit, Function, FunctionAddresses, LineContext, SourceLine, SourceLocation};
use crate::elf::{FunctionSymbol, SymbolBinding};
use crate::error::{Error, Result};
use crate::object_info::ObjectInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exactness {
    Exact,
    Prefix,
}

impl Exactness {
    fn is_exact(self) -> bool {
        matches!(self, Exactness::Exact)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewStatement {
    Required,
    Any,
}

fn strip_spaces(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn names_equal(a: &str, b: &str) -> bool {
    strip_spaces(a) == strip_spaces(b)
}

/// Demangled `sym_name` starts with the demangled form of `to_match`
/// (spaces stripped from both before comparing), i.e. `to_match` is a
/// prefix of the real name.
fn is_prefix_match(to_match: &str, sym_name: &str) -> Result<bool> {
    let demangled = demangle(sym_name)?;
    let full = strip_spaces(&demangled);
    let prefix = strip_spaces(to_match);
    Ok(full.len() >= prefix.len() && full[..prefix.len()] == prefix)
}

/// Demangled `mangled` is exactly equal (modulo spaces) to `name`.
fn is_exact_match(name: &str, mangled: &str) -> Result<bool> {
    let demangled = demangle(mangled)?;
    Ok(names_equal(name, &demangled))
}

fn has_suffix(name: &str) -> bool {
    name.find('.').map(|pos| pos < name.len() - 1).unwrap_or(false)
}

fn is_sub_path(sub: &Path, path: &Path) -> bool {
    if sub.as_os_str().is_empty() {
        return false;
    }
    if sub == path {
        return true;
    }
    let path_s = path.to_string_lossy();
    let sub_s = sub.to_string_lossy();
    path_s.contains(sub_s.as_ref())
}

pub fn find_compilation_unit_by_path<'a>(oi: &'a ObjectInfo, cu_path: &Path) -> Result<&'a CompilationUnit> {
    let mut matches = oi.compilation_units().iter().filter(|cu| is_sub_path(cu_path, &cu.path));
    let found = matches.next().ok_or_else(|| Error::not_found("compilation unit not found"))?;
    if matches.next().is_some() {
        return Err(Error::ambiguous("compilation unit ambiguous"));
    }
    Ok(found)
}

pub fn find_compilation_unit_by_address(oi: &ObjectInfo, addr: u64) -> Result<&CompilationUnit> {
    oi.compilation_units()
        .iter()
        .find(|cu| cu.addresses.iter().any(|r| r.contains(addr)))
        .ok_or_else(|| Error::not_found(format!("address {addr:#x} not found in any compilation unit")))
}

pub fn find_compilation_unit_by_symbol<'a>(oi: &'a ObjectInfo, sym: &FunctionSymbol) -> Result<&'a CompilationUnit> {
    oi.compilation_units()
        .iter()
        .find(|cu| cu.addresses.iter().any(|r| r.contains(sym.address)))
        .ok_or_else(|| Error::not_found("compilation unit not found for symbol"))
}

fn line_match(line: &SourceLine, lineno: u32, exact_line: Exactness) -> bool {
    lineno == 0 || if exact_line.is_exact() { line.number == lineno } else { line.number >= lineno }
}

fn column_match(line: &SourceLine, colno: u32, exact_col: Exactness) -> bool {
    colno == 0 || if exact_col.is_exact() { line.column == colno } else { line.column >= colno }
}

/// Returns the `[start, end)` index range of `cu.lines` matching `file`
/// (or the CU's own path if empty), `lineno`, and `colno` under the given
/// exactness flags.
pub fn find_lines<'a>(
    cu: &'a CompilationUnit,
    file: Option<&Path>,
    lineno: u32,
    exact_line: Exactness,
    colno: u32,
    exact_col: Exactness,
) -> Result<(usize, usize)> {
    if lineno == 0 && colno != 0 {
        return Err(Error::Setup("colno given without lineno".into()));
    }
    let effective_file: &Path = file.unwrap_or(&cu.path);

    let mut file_found = false;
    let mut start = None;
    for (i, line) in cu.lines.iter().enumerate() {
        if line.file == effective_file {
            file_found = true;
            if line_match(line, lineno, exact_line) {
                start = Some(i);
                break;
            }
        }
    }
    let mut start = match start {
        Some(i) => i,
        None if file_found => return Err(Error::not_found("line not found")),
        None => return Err(Error::not_found("file not found")),
    };

    let effective_colno = if cu.lines[start].number > lineno && !exact_col.is_exact() { 0 } else { colno };
    let effective_lineno = cu.lines[start].number;

    match cu.lines[start..]
        .iter()
        .position(|l| l.file == effective_file && line_match(l, effective_lineno, Exactness::Exact) && column_match(l, effective_colno, exact_col))
    {
        Some(offset) => start += offset,
        None => return Err(Error::not_found("column not found")),
    }

    // Narrow to the run of lines sharing this exact line number, then
    // further to the run additionally sharing this exact column.
    let pin_lineno = cu.lines[start].number;
    let pin_colno = cu.lines[start].column;
    let mut end = start + 1;
    while end < cu.lines.len() && cu.lines[end].file == effective_file && line_match(&cu.lines[end], pin_lineno, Exactness::Exact) {
        end += 1;
    }
    let mut narrowed_end = start + 1;
    while narrowed_end < end && column_match(&cu.lines[narrowed_end], pin_colno, Exactness::Exact) {
        narrowed_end += 1;
    }
    Ok((start, narrowed_end))
}

pub fn find_line<'a>(cu: &'a CompilationUnit, loc: &SourceLocation) -> Result<&'a SourceLine> {
    let (start, end) = find_lines(cu, Some(&loc.file), loc.line_number, Exactness::Prefix, loc.line_column, Exactness::Prefix)?;
    lowest_address_line(&cu.lines[start..end], NewStatement::Any)
}

pub fn lowest_address_line(lines: &[SourceLine], new_stmt: NewStatement) -> Result<&SourceLine> {
    if lines.is_empty() {
        return Err(Error::not_found("line not found"));
    }
    match new_stmt {
        NewStatement::Any => Ok(&lines[0]),
        NewStatement::Required => lines.iter().find(|l| l.new_statement).ok_or_else(|| Error::not_found("line not found")),
    }
}

pub fn highest_address_line(lines: &[SourceLine], new_stmt: NewStatement) -> Result<&SourceLine> {
    if lines.is_empty() {
        return Err(Error::not_found("line not found"));
    }
    match new_stmt {
        NewStatement::Any => Ok(&lines[lines.len() - 1]),
        NewStatement::Required => lines.iter().rev().find(|l| l.new_statement).ok_or_else(|| Error::not_found("line not found")),
    }
}

fn ambiguous_error(b1: SymbolBinding, b2: SymbolBinding, msg: &str) -> Error {
    if b1 == SymbolBinding::Weak || b2 == SymbolBinding::Weak {
        Error::AmbiguousWeak(msg.into())
    } else if b1 == SymbolBinding::Local || b2 == SymbolBinding::Local {
        Error::AmbiguousStatic(msg.into())
    } else {
        Error::Ambiguous(msg.into())
    }
}

/// Exact-name match over an arbitrary symbol slice, with the same
/// static/weak ambiguity preference as `find_function_symbol_exact_impl`.
fn find_exact_in<'a>(symbols: impl Iterator<Item = &'a FunctionSymbol>, name: &str) -> Result<&'a FunctionSymbol> {
    let mut matching = Vec::new();
    for sym in symbols {
        if is_exact_match(name, &sym.name)? {
            matching.push(sym);
        }
    }
    let Some(&first) = matching.first() else {
        return Err(Error::not_found("symbol not found"));
    };
    if matching.len() == 1 {
        return Ok(first);
    }
    let has_weak = matching.iter().any(|s| s.binding == SymbolBinding::Weak);
    let has_static = matching.iter().any(|s| s.binding == SymbolBinding::Local);
    if has_weak {
        Err(Error::AmbiguousWeak(format!("symbol `{name}` ambiguous")))
    } else if has_static {
        Err(Error::AmbiguousStatic(format!("symbol `{name}` ambiguous")))
    } else {
        Err(Error::Ambiguous(format!("symbol `{name}` ambiguous")))
    }
}

/// Global symbol-table search by demangled name, covering both the exact
/// and prefix-match ambiguity logic of `find_function_symbol_matched`.
pub fn find_function_symbol<'a>(oi: &'a ObjectInfo, name: &str, exact_name: Exactness, no_suffix: bool) -> Result<&'a FunctionSymbol> {
    if name.is_empty() {
        return Err(Error::Setup("empty symbol name".into()));
    }
    if exact_name.is_exact() {
        return find_exact_in(oi.function_symbols().iter(), name);
    }

    let mut matches = Vec::new();
    for sym in oi.function_symbols() {
        if is_prefix_match(name, &sym.name)? {
            matches.push(sym);
        }
    }
    if matches.is_empty() {
        return Err(Error::not_found("no matches found"));
    }
    if matches.len() == 1 {
        return Ok(matches[0]);
    }
    match find_exact_in(matches.iter().copied(), name) {
        Ok(sym) => return Ok(sym),
        Err(e) if !matches!(e, Error::NotFound(_)) => return Err(e),
        Err(_) => {}
    }
    if !no_suffix {
        return Err(Error::AmbiguousSuffix(format!("symbol `{name}` ambiguous")));
    }
    let (with_suffix, without_suffix): (Vec<_>, Vec<_>) = matches.into_iter().partition(|s| has_suffix(&s.name));
    if without_suffix.is_empty() {
        return Err(Error::AmbiguousSuffix(format!("symbol `{name}` ambiguous")));
    }
    if without_suffix.len() > 1 {
        return Err(Error::Ambiguous(format!("symbol `{name}` ambiguous")));
    }
    let _ = with_suffix;
    Ok(without_suffix[0])
}

/// Symbol search restricted to one compilation unit, carrying the
/// `found_only_with_suffix` bookkeeping of `find_function_symbol`'s
/// `find_matched` closure.
pub fn find_function_symbol_in_cu<'a>(
    oi: &'a ObjectInfo,
    cu: &CompilationUnit,
    name: &str,
    exact_name: Exactness,
    ignore_suffix: bool,
) -> Result<&'a FunctionSymbol> {
    if name.is_empty() {
        return Err(Error::Setup("empty symbol name".into()));
    }
    if exact_name.is_exact() {
        let in_cu = oi
            .function_symbols()
            .iter()
            .filter(|sym| find_compilation_unit_by_symbol(oi, sym).map(|c| c.path == cu.path).unwrap_or(false));
        return find_exact_in_cu_exact(in_cu, name);
    }

    let mut found: Option<&FunctionSymbol> = None;
    let mut found_only_with_suffix = false;
    for sym in oi.function_symbols() {
        if !is_prefix_match(name, &sym.name)? {
            continue;
        }
        let Ok(sym_cu) = find_compilation_unit_by_symbol(oi, sym) else {
            continue;
        };
        if sym_cu.path != cu.path {
            continue;
        }
        if is_exact_match(name, &sym.name)? {
            return Ok(sym);
        }
        match found {
            None => found = Some(sym),
            Some(prev) => {
                if ignore_suffix {
                    if !has_suffix(&sym.name) && !has_suffix(&prev.name) {
                        return Err(ambiguous_error(sym.binding, prev.binding, &format!("symbol `{name}` ambiguous")));
                    }
                    if has_suffix(&prev.name) && has_suffix(&sym.name) {
                        found_only_with_suffix = true;
                    } else {
                        found_only_with_suffix = false;
                        if !has_suffix(&sym.name) {
                            found = Some(sym);
                        }
                    }
                } else {
                    if has_suffix(&sym.name) || has_suffix(&prev.name) {
                        return Err(Error::AmbiguousSuffix(format!("symbol `{name}` ambiguous")));
                    }
                    return Err(ambiguous_error(sym.binding, prev.binding, &format!("symbol `{name}` ambiguous")));
                }
            }
        }
    }
    if found_only_with_suffix {
        return Err(Error::AmbiguousSuffix(format!("symbol `{name}` ambiguous")));
    }
    found.ok_or_else(|| Error::not_found("symbol not found"))
}

fn find_exact_in_cu_exact<'a>(symbols: impl Iterator<Item = &'a FunctionSymbol>, name: &str) -> Result<&'a FunctionSymbol> {
    for sym in symbols {
        if is_exact_match(name, &sym.name)? {
            return Ok(sym);
        }
    }
    Err(Error::not_found("symbol not found"))
}

pub fn find_function_symbol_by_address(oi: &ObjectInfo, addr: u64) -> Result<&FunctionSymbol> {
    oi.function_symbols()
        .iter()
        .find(|sym| sym.address == addr)
        .ok_or_else(|| Error::not_found(format!("no symbol at address {addr:#x}")))
}

/// Find the ELF symbol backing a (non-inlined) DWARF function, by its
/// single contiguous range's low PC.
pub fn find_function_symbol_by_function<'a>(oi: &'a ObjectInfo, f: &Function) -> Result<&'a FunctionSymbol> {
    let addrs = f.addresses.as_ref().ok_or_else(|| Error::not_found("symbol not found"))?;
    if addrs.values.len() > 1 {
        return Err(Error::Ambiguous("function spans more than one contiguous range".into()));
    }
    let low_pc = addrs.values.first().map(|r| r.low_pc).ok_or_else(|| Error::not_found("symbol not found"))?;
    oi.function_symbols()
        .iter()
        .find(|sym| sym.address == low_pc)
        .ok_or_else(|| Error::not_found("symbol not found"))
}

pub fn find_function_in_cu<'a>(cu: &'a CompilationUnit, sym: &FunctionSymbol) -> Result<&'a Function> {
    cu.funcs
        .iter()
        .find(|f| f.addresses.as_ref().map(|a| a.values.iter().any(|r| r.low_pc == sym.address)).unwrap_or(false))
        .ok_or_else(|| Error::not_found("function not found"))
}

pub fn find_function_by_symbol<'a>(oi: &'a ObjectInfo, sym: &FunctionSymbol) -> Result<&'a Function> {
    for cu in oi.compilation_units() {
        match find_function_in_cu(cu, sym) {
            Ok(f) => return Ok(f),
            Err(Error::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::not_found("function not found"))
}

/// Global search: the symbol table first, then the DIE name as a
/// best-effort fallback when no symbol matches.
pub fn find_function_by_name<'a>(oi: &'a ObjectInfo, name: &str, exact_name: Exactness) -> Result<(&'a Function, Option<&'a FunctionSymbol>)> {
    match find_function_symbol(oi, name, exact_name, true) {
        Ok(sym) => {
            let f = find_function_by_symbol(oi, sym)?;
            Ok((f, Some(sym)))
        }
        Err(e) if matches!(e, Error::NotFound(_)) => {
            let mut found = None;
            for cu in oi.compilation_units() {
                match find_function_in_cu_by_name(cu, name, exact_name) {
                    Ok(f) => {
                        if found.is_some() {
                            return Err(Error::Ambiguous(format!("function `{name}` ambiguous")));
                        }
                        found = Some(f);
                    }
                    Err(Error::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
            found.map(|f| (f, None)).ok_or_else(|| Error::not_found("function not found"))
        }
        Err(e) => Err(e),
    }
}

pub fn find_function_by_name_in_cu<'a>(
    oi: &'a ObjectInfo,
    cu: &CompilationUnit,
    name: &str,
    exact_name: Exactness,
) -> Result<(&'a Function, Option<&'a FunctionSymbol>)> {
    match find_function_symbol_in_cu(oi, cu, name, exact_name, true) {
        Ok(sym) => {
            let f = find_function_by_symbol(oi, sym)?;
            Ok((f, Some(sym)))
        }
        Err(e) if matches!(e, Error::NotFound(_)) => {
            let f = find_function_in_cu_by_name(cu, name, exact_name)?;
            Ok((f, None))
        }
        Err(e) => Err(e),
    }
}

/// Find a function by name within one compilation unit without
/// consulting the symbol table at all, matching on the (demangled)
/// linkage name for extern functions or the DIE name for static ones.
pub fn find_function_in_cu_by_name<'a>(cu: &'a CompilationUnit, name: &str, exact_name: Exactness) -> Result<&'a Function> {
    let mut found: Option<&Function> = None;
    for f in &cu.funcs {
        let full_name = if f.is_static() {
            f.die_name.clone()
        } else {
            let linkage = f.linkage_name.as_deref().unwrap_or_default();
            demangle(linkage)?
        };
        if exact_name.is_exact() {
            if names_equal(&full_name, name) {
                return Ok(f);
            }
        } else if is_prefix_match_str(name, &full_name) {
            if names_equal(&full_name, name) {
                return Ok(f);
            }
            if found.is_some() {
                return Err(Error::Ambiguous(format!("function `{name}` ambiguous")));
            }
            found = Some(f);
        }
    }
    found.ok_or_else(|| Error::not_found("no matches found"))
}

fn is_prefix_match_str(to_match: &str, full_name: &str) -> bool {
    let full = strip_spaces(full_name);
    let prefix = strip_spaces(to_match);
    full.len() >= prefix.len() && full[..prefix.len()] == prefix
}

pub fn find_functions<'a>(cu: &'a CompilationUnit, file: &Path) -> Result<(usize, usize)> {
    let start = cu
        .funcs
        .iter()
        .position(|f| f.decl_loc.as_ref().map(|l| l.file == file).unwrap_or(false))
        .ok_or_else(|| Error::not_found("file not found"))?;
    let mut end = start + 1;
    while end < cu.funcs.len() && cu.funcs[end].decl_loc.as_ref().map(|l| l.file == file).unwrap_or(false) {
        end += 1;
    }
    Ok((start, end))
}

pub fn find_function_by_decl_loc<'a>(cu: &'a CompilationUnit, file: &Path, lineno: u32, colno: u32) -> Result<&'a Function> {
    let mut decl_loc_found = false;
    let mut file_found = false;
    let mut line_found = false;
    let mut col_found = false;
    let mut matches = Vec::new();
    for f in &cu.funcs {
        let Some(loc) = &f.decl_loc else { continue };
        decl_loc_found = true;
        if loc.file != file {
            continue;
        }
        file_found = true;
        if loc.line_number != lineno {
            continue;
        }
        line_found = true;
        if colno != 0 && loc.line_column != colno {
            continue;
        }
        col_found = true;
        matches.push(f);
    }
    if matches.is_empty() {
        let msg = "function declaration not found";
        return Err(if !decl_loc_found {
            Error::not_found(format!("{msg}: no function with declaration location found"))
        } else if !file_found {
            Error::not_found(format!("{msg}: file not found"))
        } else if !line_found {
            Error::not_found(format!("{msg}: line not found"))
        } else if !col_found {
            Error::not_found(format!("{msg}: column not found"))
        } else {
            Error::not_found(msg)
        });
    }
    if matches.len() > 1 {
        return Err(Error::Ambiguous("function ambiguous".into()));
    }
    Ok(matches[0])
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::dwarf::ContiguousRange;
    use crate::elf::{ExecutableHeader, ExecutableType};

    fn range(low: u64, high: u64) -> ContiguousRange {
        ContiguousRange { low_pc: low, high_pc: high }
    }

    fn loc(file: &str, line: u32, col: u32) -> SourceLocation {
        SourceLocation {
            file: PathBuf::from(file),
            line_number: line,
            line_column: col,
        }
    }

    fn empty_header() -> ExecutableHeader {
        ExecutableHeader {
            kind: ExecutableType::Executable,
            entrypoint_address: 0,
        }
    }

    fn cu(path: &str, addresses: Vec<ContiguousRange>, lines: Vec<SourceLine>, funcs: Vec<Function>) -> CompilationUnit {
        CompilationUnit {
            path: PathBuf::from(path),
            addresses,
            lines,
            funcs,
        }
    }

    fn line(file: &str, number: u32, column: u32, address: u64, new_statement: bool) -> SourceLine {
        SourceLine {
            file: PathBuf::from(file),
            number,
            column,
            address,
            new_statement,
            new_basic_block: false,
            end_text_sequence: false,
            ctx: LineContext::None,
        }
    }

    #[test]
    fn compilation_unit_lookup_by_subpath() {
        let a = cu("/home/user/proj/src/main.cpp", vec![range(0x1000, 0x2000)], vec![], vec![]);
        let b = cu("/home/user/proj/src/util.cpp", vec![range(0x2000, 0x3000)], vec![], vec![]);
        let oi = ObjectInfo::from_parts(empty_header(), vec![], vec![a, b]);

        let found = find_compilation_unit_by_path(&oi, Path::new("util.cpp")).unwrap();
        assert_eq!(found.path, PathBuf::from("/home/user/proj/src/util.cpp"));

        assert!(find_compilation_unit_by_path(&oi, Path::new("nonexistent.cpp")).is_err());
    }

    #[test]
    fn compilation_unit_lookup_by_subpath_is_ambiguous() {
        let a = cu("/a/main.cpp", vec![range(0x1000, 0x2000)], vec![], vec![]);
        let b = cu("/b/main.cpp", vec![range(0x2000, 0x3000)], vec![], vec![]);
        let oi = ObjectInfo::from_parts(empty_header(), vec![], vec![a, b]);

        let err = find_compilation_unit_by_path(&oi, Path::new("main.cpp")).unwrap_err();
        assert!(err.is_ambiguous());
    }

    #[test]
    fn compilation_unit_lookup_by_address() {
        let a = cu("/a.cpp", vec![range(0x1000, 0x2000)], vec![], vec![]);
        let b = cu("/b.cpp", vec![range(0x2000, 0x3000)], vec![], vec![]);
        let oi = ObjectInfo::from_parts(empty_header(), vec![], vec![a, b]);

        assert_eq!(find_compilation_unit_by_address(&oi, 0x2500).unwrap().path, PathBuf::from("/b.cpp"));
        assert!(find_compilation_unit_by_address(&oi, 0x3500).is_err());
    }

    #[test]
    fn exact_symbol_lookup_finds_unique_match() {
        let syms = vec![
            FunctionSymbol::new_for_test("foo", 0x1000, SymbolBinding::Global),
            FunctionSymbol::new_for_test("bar", 0x2000, SymbolBinding::Global),
        ];
        let oi = ObjectInfo::from_parts(empty_header(), syms, vec![]);
        let found = find_function_symbol(&oi, "foo", Exactness::Exact, true).unwrap();
        assert_eq!(found.address, 0x1000);
    }

    #[test]
    fn exact_symbol_lookup_prefers_weak_ambiguity_message() {
        let syms = vec![
            FunctionSymbol::new_for_test("foo", 0x1000, SymbolBinding::Weak),
            FunctionSymbol::new_for_test("foo", 0x2000, SymbolBinding::Global),
        ];
        let oi = ObjectInfo::from_parts(empty_header(), syms, vec![]);
        let err = find_function_symbol(&oi, "foo", Exactness::Exact, true).unwrap_err();
        assert!(matches!(err, Error::AmbiguousWeak(_)));
    }

    #[test]
    fn prefix_symbol_lookup_prefers_no_suffix_variant() {
        let syms = vec![
            FunctionSymbol::new_for_test("foo.cold", 0x1000, SymbolBinding::Global),
            FunctionSymbol::new_for_test("foobar", 0x2000, SymbolBinding::Global),
            FunctionSymbol::new_for_test("foo", 0x3000, SymbolBinding::Global),
        ];
        let oi = ObjectInfo::from_parts(empty_header(), syms, vec![]);
        let found = find_function_symbol(&oi, "foo", Exactness::Exact, true).unwrap();
        assert_eq!(found.address, 0x3000);
    }

    #[test]
    fn find_lines_exact_line_match() {
        let lines = vec![
            line("a.cpp", 10, 1, 0x100, true),
            line("a.cpp", 10, 2, 0x108, false),
            line("a.cpp", 11, 1, 0x110, true),
        ];
        let c = cu("a.cpp", vec![range(0x100, 0x120)], lines, vec![]);
        let (start, end) = find_lines(&c, None, 10, Exactness::Exact, 0, Exactness::Prefix).unwrap();
        assert_eq!((start, end), (0, 2));
    }

    #[test]
    fn find_line_picks_lowest_address_match() {
        let lines = vec![line("a.cpp", 5, 0, 0x200, false), line("a.cpp", 5, 0, 0x300, false)];
        let c = cu("a.cpp", vec![range(0x200, 0x400)], lines, vec![]);
        let found = find_line(&c, &loc("a.cpp", 5, 0)).unwrap();
        assert_eq!(found.address, 0x200);
    }

    #[test]
    fn decl_location_lookup_distinguishes_not_found_reasons() {
        let funcs = vec![Function {
            die_name: "helper".into(),
            decl_loc: Some(loc("a.cpp", 42, 3)),
            linkage_name: None,
            addresses: None,
            instances: None,
        }];
        let c = cu("a.cpp", vec![], vec![], funcs);

        assert!(find_function_by_decl_loc(&c, Path::new("a.cpp"), 42, 3).is_ok());
        let err = find_function_by_decl_loc(&c, Path::new("b.cpp"), 42, 3).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.contains("file not found")));
        let err = find_function_by_decl_loc(&c, Path::new("a.cpp"), 99, 3).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m.contains("line not found")));
    }

    #[test]
    fn static_function_lookup_matches_die_name_directly() {
        let funcs = vec![Function {
            die_name: "local_helper".into(),
            decl_loc: None,
            linkage_name: None,
            addresses: Some(FunctionAddresses { values: vec![range(0x1000, 0x1010)] }),
            instances: None,
        }];
        let c = cu("a.cpp", vec![], vec![], funcs);
        let found = find_function_in_cu_by_name(&c, "local_helper", Exactness::Exact).unwrap();
        assert_eq!(found.die_name, "local_helper");
    }
}
