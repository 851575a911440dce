//! DWARF parsing: compilation units, `.debug_line` entries, function
//! DIEs (concrete and inlined-only), and the contiguous PC ranges
//! anchoring all of the above. Grounded in
//! `original_source/src/dbg/dwarf.{hpp,cpp}`'s `compilation_unit` /
//! `function` / `inline_instance` tree; parsed here with `gimli` instead
//! of `libdw`, since that is the crate the retrieval pack's DWARF-facing
//! repos (e.g. `mstange-linux-perf-event-reader`) build on.

use std::collections::HashMap;
use std::path::PathBuf;

use gimli::{AttributeValue, DebuggingInformationEntry, Dwarf, EndianSlice, RunTimeEndian, Unit};

use crate::error::{Error, Result};

/// Whether a line-table row sits at a prologue-end/epilogue-begin marker,
/// mirrored from `original_source/src/dbg/dwarf.hpp`'s `line_context`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineContext {
    PrologueEnd,
    None,
    EpilogueBegin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContiguousRange {
    pub low_pc: u64,
    pub high_pc: u64,
}

impl ContiguousRange {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.low_pc && addr < self.high_pc
    }
}

#[derive(Clone, Debug)]
pub struct SourceLine {
    pub file: PathBuf,
    pub number: u32,
    pub column: u32,
    pub address: u64,
    pub new_statement: bool,
    pub new_basic_block: bool,
    pub end_text_sequence: bool,
    pub ctx: LineContext,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line_number: u32,
    pub line_column: u32,
}

#[derive(Clone, Debug, Default)]
pub struct FunctionAddresses {
    pub values: Vec<ContiguousRange>,
}

#[derive(Clone, Debug)]
pub struct InlineInstance {
    pub entry_pc: u64,
    pub call_loc: Option<SourceLocation>,
    pub addresses: FunctionAddresses,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub die_name: String,
    pub decl_loc: Option<SourceLocation>,
    pub linkage_name: Option<String>,
    pub addresses: Option<FunctionAddresses>,
    pub instances: Option<Vec<InlineInstance>>,
}

impl Function {
    /// No linkage name and not `DW_AT_external`: a file-local symbol, so
    /// lookups must match on the (demangled) DIE name rather than the
    /// mangled linkage name.
    pub fn is_static(&self) -> bool {
        self.linkage_name.is_none()
    }

    pub fn is_extern(&self) -> bool {
        !self.is_static()
    }
}

#[derive(Clone, Debug)]
pub struct CompilationUnit {
    pub path: PathBuf,
    pub addresses: Vec<ContiguousRange>,
    pub lines: Vec<SourceLine>,
    pub funcs: Vec<Function>,
}

type Slice<'a> = EndianSlice<'a, RunTimeEndian>;

fn comp_dir_join(comp_dir: Option<&str>, name: &str) -> PathBuf {
    match comp_dir {
        Some(dir) if !name.starts_with('/') => PathBuf::from(dir).join(name),
        _ => PathBuf::from(name),
    }
}

fn attr_str<'a>(
    dwarf: &Dwarf<Slice<'a>>,
    unit: &Unit<Slice<'a>>,
    die: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    attr: gimli::DwAt,
) -> Option<String> {
    let value = die.attr_value(attr).ok().flatten()?;
    let s = dwarf.attr_string(unit, value).ok()?;
    Some(String::from_utf8_lossy(&s).into_owned())
}

fn attr_u64(die: &DebuggingInformationEntry<'_, '_, Slice<'_>>, attr: gimli::DwAt) -> Option<u64> {
    match die.attr_value(attr).ok().flatten()? {
        AttributeValue::Udata(v) => Some(v),
        AttributeValue::Data1(v) => Some(v as u64),
        AttributeValue::Data2(v) => Some(v as u64),
        AttributeValue::Data4(v) => Some(v as u64),
        AttributeValue::Data8(v) => Some(v),
        AttributeValue::Addr(v) => Some(v),
        AttributeValue::Sdata(v) if v >= 0 => Some(v as u64),
        _ => None,
    }
}

fn die_ranges<'a>(
    dwarf: &Dwarf<Slice<'a>>,
    unit: &Unit<Slice<'a>>,
    die: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
) -> Result<Vec<ContiguousRange>> {
    let mut ranges = Vec::new();
    let mut iter = dwarf
        .die_ranges(unit, die)
        .map_err(|e| Error::format(format!("bad DW_AT_ranges/low_pc/high_pc: {e}")))?;
    while let Some(r) = iter
        .next()
        .map_err(|e| Error::format(format!("error iterating ranges: {e}")))?
    {
        ranges.push(ContiguousRange {
            low_pc: r.begin,
            high_pc: r.end,
        });
    }
    Ok(ranges)
}

fn source_location<'a>(
    dwarf: &Dwarf<Slice<'a>>,
    unit: &Unit<Slice<'a>>,
    die: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    file_attr: gimli::DwAt,
    line_attr: gimli::DwAt,
    col_attr: gimli::DwAt,
    file_index: &HashMap<u64, PathBuf>,
) -> Option<SourceLocation> {
    let file_idx = attr_u64(die, file_attr)?;
    let file = file_index.get(&file_idx).cloned()?;
    let line_number = attr_u64(die, line_attr).unwrap_or(0) as u32;
    let line_column = attr_u64(die, col_attr).unwrap_or(0) as u32;
    let _ = dwarf;
    let _ = unit;
    Some(SourceLocation {
        file,
        line_number,
        line_column,
    })
}

/// Builds an index from the line-program's file table index to a full
/// `comp_dir`-joined path, used for both `.debug_line` rows and
/// `DW_AT_decl_file`/`DW_AT_call_file` attributes.
fn build_file_index<'a>(
    dwarf: &Dwarf<Slice<'a>>,
    unit: &Unit<Slice<'a>>,
    program: &gimli::IncompleteLineProgram<Slice<'a>>,
) -> Result<HashMap<u64, PathBuf>> {
    let header = program.header();
    let mut index = HashMap::new();
    for (i, file) in header.file_names().iter().enumerate() {
        let name = dwarf
            .attr_string(unit, file.path_name())
            .map_err(|e| Error::format(format!("bad file name entry: {e}")))?;
        let name = String::from_utf8_lossy(&name).into_owned();
        let dir = file
            .directory(header)
            .and_then(|d| dwarf.attr_string(unit, d).ok())
            .map(|d| String::from_utf8_lossy(&d).into_owned());
        let path = comp_dir_join(dir.as_deref(), &name);
        // DWARF5 file tables are 0-indexed; DWARF<=4 start at 1 (entry 0
        // is the primary source file, also reachable via DW_AT_name).
        index.insert(i as u64, path);
    }
    Ok(index)
}

fn load_lines<'a>(
    dwarf: &Dwarf<Slice<'a>>,
    unit: &Unit<Slice<'a>>,
) -> Result<(Vec<SourceLine>, HashMap<u64, PathBuf>)> {
    let Some(program) = unit.line_program.clone() else {
        return Ok((Vec::new(), HashMap::new()));
    };
    let file_index = build_file_index(dwarf, unit, &program)?;

    let mut lines = Vec::new();
    let mut rows = program.rows();
    while let Some((_, row)) = rows
        .next_row()
        .map_err(|e| Error::format(format!("bad .debug_line row: {e}")))?
    {
        let file = row
            .file_index()
            .pipe(|idx| file_index.get(&idx).cloned())
            .unwrap_or_default();
        let ctx = if row.prologue_end() {
            LineContext::PrologueEnd
        } else if row.epilogue_begin() {
            LineContext::EpilogueBegin
        } else {
            LineContext::None
        };
        lines.push(SourceLine {
            file,
            number: row.line().map(|n| n.get() as u32).unwrap_or(0),
            column: match row.column() {
                gimli::ColumnType::Column(c) => c.get() as u32,
                gimli::ColumnType::LeftEdge => 0,
            },
            address: row.address(),
            new_statement: row.is_stmt(),
            new_basic_block: row.basic_block(),
            end_text_sequence: row.end_sequence(),
            ctx,
        });
    }
    lines.sort_by_key(|l| l.address);
    Ok((lines, file_index))
}

trait Pipe: Sized {
    fn pipe<R>(self, f: impl FnOnce(Self) -> R) -> R {
        f(self)
    }
}
impl<T> Pipe for T {}

struct AbstractOrigin {
    name: Option<String>,
    linkage_name: Option<String>,
    decl_loc: Option<SourceLocation>,
}

/// Walks every DIE in the unit with a flat depth-first cursor (the same
/// shape `addr2line`-style consumers use `entries()`/`next_dfs()` for,
/// avoiding a hand-rolled recursive tree walk), collecting subprogram
/// DIEs as abstract origins plus concrete (has its own code) instances,
/// and inlined-subroutine DIEs as instances attached to their origin.
fn load_functions<'a>(
    dwarf: &Dwarf<Slice<'a>>,
    unit: &Unit<Slice<'a>>,
    file_index: &HashMap<u64, PathBuf>,
) -> Result<Vec<Function>> {
    let mut origins: HashMap<usize, AbstractOrigin> = HashMap::new();
    let mut concrete: Vec<(usize, Function)> = Vec::new();
    // offset (of the abstract origin) -> gathered inline instances.
    let mut inline_by_origin: HashMap<usize, Vec<InlineInstance>> = HashMap::new();

    let mut cursor = unit.entries();
    while let Some((_, die)) = cursor
        .next_dfs()
        .map_err(|e| Error::format(format!("bad DIE iteration: {e}")))?
    {
        let offset = die.offset().0;

        if die.tag() == gimli::DW_TAG_subprogram {
            let name = attr_str(dwarf, unit, die, gimli::DW_AT_name);
            let linkage_name = attr_str(dwarf, unit, die, gimli::DW_AT_linkage_name)
                .or_else(|| attr_str(dwarf, unit, die, gimli::DW_AT_MIPS_linkage_name));
            let decl_loc = source_location(
                dwarf,
                unit,
                die,
                gimli::DW_AT_decl_file,
                gimli::DW_AT_decl_line,
                gimli::DW_AT_decl_column,
                file_index,
            );
            let ranges = die_ranges(dwarf, unit, die)?;
            origins.insert(
                offset,
                AbstractOrigin {
                    name: name.clone(),
                    linkage_name: linkage_name.clone(),
                    decl_loc: decl_loc.clone(),
                },
            );
            if !ranges.is_empty() {
                concrete.push((
                    offset,
                    Function {
                        die_name: name.unwrap_or_default(),
                        decl_loc,
                        linkage_name,
                        addresses: Some(FunctionAddresses { values: ranges }),
                        instances: None,
                    },
                ));
            }
        }

        if die.tag() == gimli::DW_TAG_inlined_subroutine {
            if let Some(AttributeValue::UnitRef(origin_ref)) = die
                .attr_value(gimli::DW_AT_abstract_origin)
                .ok()
                .flatten()
            {
                let call_loc = source_location(
                    dwarf,
                    unit,
                    die,
                    gimli::DW_AT_call_file,
                    gimli::DW_AT_call_line,
                    gimli::DW_AT_call_column,
                    file_index,
                );
                let ranges = die_ranges(dwarf, unit, die)?;
                let entry_pc = attr_u64(die, gimli::DW_AT_entry_pc)
                    .or_else(|| ranges.first().map(|r| r.low_pc))
                    .unwrap_or(0);
                inline_by_origin
                    .entry(origin_ref.0)
                    .or_default()
                    .push(InlineInstance {
                        entry_pc,
                        call_loc,
                        addresses: FunctionAddresses { values: ranges },
                    });
            }
        }
    }

    let mut funcs: Vec<Function> = Vec::new();
    for (offset, mut f) in concrete {
        if let Some(insts) = inline_by_origin.remove(&offset) {
            f.instances = Some(insts);
        }
        funcs.push(f);
    }
    // Inline-only functions: an abstract origin with gathered instances
    // but no concrete out-of-line counterpart.
    for (offset, insts) in inline_by_origin {
        let Some(origin) = origins.get(&offset) else {
            continue;
        };
        funcs.push(Function {
            die_name: origin.name.clone().unwrap_or_default(),
            decl_loc: origin.decl_loc.clone(),
            linkage_name: origin.linkage_name.clone(),
            addresses: None,
            instances: Some(insts),
        });
    }
    Ok(funcs)
}

pub fn parse_compilation_unit<'a>(
    dwarf: &Dwarf<Slice<'a>>,
    unit: &Unit<Slice<'a>>,
    root: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
) -> Result<CompilationUnit> {
    let name = attr_str(dwarf, unit, root, gimli::DW_AT_name).unwrap_or_default();
    let comp_dir = attr_str(dwarf, unit, root, gimli::DW_AT_comp_dir);
    let path = comp_dir_join(comp_dir.as_deref(), &name);

    let addresses = die_ranges(dwarf, unit, root)?;
    let (lines, file_index) = load_lines(dwarf, unit)?;
    let funcs = load_functions(dwarf, unit, &file_index)?;

    Ok(CompilationUnit {
        path,
        addresses,
        lines,
        funcs,
    })
}
