//! Resolves a [`crate::config::Region`] into one or more `(start_addr,
//! end_addr, start_context, end_context)` tuples via `dbginfo`'s query
//! family. Addresses returned here are DWARF-relative; the caller adds
//! the runtime load address before installing traps (§4.E: "every trap
//! address recorded in §4.D is `entrypoint + offset_from_dwarf`").

use std::path::{Path, PathBuf};

use dbginfo::{Exactness, ObjectInfo, SourceLocation};
use trace::{SourceLocation as TraceLocation, TrapContext};

use crate::config::Region;
use crate::error::{Error, Result};

/// One resolved region: a start/end address pair plus the contexts to
/// carry through to the output record, and a suffix distinguishing it
/// from sibling regions resolved from the same config entry (e.g. one
/// inline instance among several).
pub struct ResolvedRegion {
    pub start_addr: u64,
    pub end_addr: u64,
    pub start_context: TrapContext,
    pub end_context: TrapContext,
    pub label_suffix: Option<String>,
}

fn trace_loc(loc: &dbginfo::SourceLocation) -> TraceLocation {
    TraceLocation {
        file: loc.file.clone(),
        line: loc.line_number,
        column: loc.line_column,
    }
}

fn resolve_source_lines(oi: &ObjectInfo, start: &crate::config::Position, end: &crate::config::Position) -> Result<Vec<ResolvedRegion>> {
    let start_cu = dbginfo::query::find_compilation_unit_by_path(oi, &start.compilation_unit)
        .map_err(|e| Error::resolve(format!("start position: {e}")))?;
    let end_cu = dbginfo::query::find_compilation_unit_by_path(oi, &end.compilation_unit)
        .map_err(|e| Error::resolve(format!("end position: {e}")))?;

    let start_line = dbginfo::query::find_line(
        start_cu,
        &SourceLocation { file: start.compilation_unit.clone(), line_number: start.line, line_column: 0 },
    )
    .map_err(|e| Error::resolve(format!("start line: {e}")))?;
    let end_line = dbginfo::query::find_line(
        end_cu,
        &SourceLocation { file: end.compilation_unit.clone(), line_number: end.line, line_column: 0 },
    )
    .map_err(|e| Error::resolve(format!("end line: {e}")))?;

    let start_context = TrapContext::SourceLine {
        address: start_line.address,
        cu: start_cu.path.clone(),
        location: trace_loc(&SourceLocation { file: start_line.file.clone(), line_number: start_line.number, line_column: start_line.column }),
    };
    let end_context = TrapContext::SourceLine {
        address: end_line.address,
        cu: end_cu.path.clone(),
        location: trace_loc(&SourceLocation { file: end_line.file.clone(), line_number: end_line.number, line_column: end_line.column }),
    };

    Ok(vec![ResolvedRegion {
        start_addr: start_line.address,
        end_addr: end_line.address,
        start_context,
        end_context,
        label_suffix: None,
    }])
}

fn unknown_call_site() -> TraceLocation {
    TraceLocation { file: PathBuf::new(), line: 0, column: 0 }
}

/// A function's own (out-of-line) body: entry at the lowest `low_pc`
/// across its contiguous ranges, return approximated by the highest
/// `high_pc` across those ranges. There is no disassembly pass to locate
/// the real `ret` instruction, so a function with multiple non-contiguous
/// ranges (cold-path splitting) measures from its first instruction to the
/// end of its last fragment; see DESIGN.md for the rationale.
fn resolve_function_body(cu_path: &Path, f: &dbginfo::Function) -> Option<ResolvedRegion> {
    let addrs = f.addresses.as_ref()?;
    let low = addrs.values.iter().map(|r| r.low_pc).min()?;
    let high = addrs.values.iter().map(|r| r.high_pc).max()?;
    Some(ResolvedRegion {
        start_addr: low,
        end_addr: high,
        start_context: TrapContext::FunctionCall { address: low, cu: cu_path.to_path_buf(), function: f.die_name.clone() },
        end_context: TrapContext::FunctionReturn { address: high, cu: cu_path.to_path_buf(), function: f.die_name.clone() },
        label_suffix: None,
    })
}

/// One region per inline instance, optionally filtered to a single
/// `instance_index`. Each instance's own highest address stands in for
/// its return (same approximation as [`resolve_function_body`]).
fn resolve_inline_instances(cu_path: &Path, f: &dbginfo::Function, instance_index: Option<usize>) -> Vec<ResolvedRegion> {
    let Some(instances) = &f.instances else { return Vec::new() };
    instances
        .iter()
        .enumerate()
        .filter(|(i, _)| instance_index.map(|want| want == *i).unwrap_or(true))
        .filter_map(|(i, inst)| {
            let high = inst.addresses.values.iter().map(|r| r.high_pc).max()?;
            Some(ResolvedRegion {
                start_addr: inst.entry_pc,
                end_addr: high,
                start_context: TrapContext::InlineFunction {
                    address: inst.entry_pc,
                    cu: cu_path.to_path_buf(),
                    function: f.die_name.clone(),
                    call_site: inst.call_loc.as_ref().map(trace_loc).unwrap_or_else(unknown_call_site),
                },
                end_context: TrapContext::FunctionReturn { address: high, cu: cu_path.to_path_buf(), function: f.die_name.clone() },
                label_suffix: Some(format!("inline#{i}")),
            })
        })
        .collect()
}

fn resolve_function(oi: &ObjectInfo, name: &str, compilation_unit: Option<&Path>, instance_index: Option<usize>) -> Result<Vec<ResolvedRegion>> {
    let (f, symbol, cu_path) = match compilation_unit {
        Some(cu_path) => {
            let cu = dbginfo::query::find_compilation_unit_by_path(oi, cu_path).map_err(|e| Error::resolve(format!("function '{name}': {e}")))?;
            let (f, symbol) =
                dbginfo::query::find_function_by_name_in_cu(oi, cu, name, Exactness::Exact).map_err(|e| Error::resolve(format!("function '{name}': {e}")))?;
            (f, symbol, cu.path.clone())
        }
        None => {
            let (f, symbol) = dbginfo::query::find_function_by_name(oi, name, Exactness::Exact).map_err(|e| Error::resolve(format!("function '{name}': {e}")))?;
            let cu = symbol
                .map(|s| dbginfo::query::find_compilation_unit_by_symbol(oi, s))
                .unwrap_or_else(|| {
                    f.addresses
                        .as_ref()
                        .and_then(|a| a.values.first())
                        .map(|r| dbginfo::query::find_compilation_unit_by_address(oi, r.low_pc))
                        .unwrap_or_else(|| Err(dbginfo::Error::not_found("no address to locate compilation unit")))
                })
                .map_err(|e| Error::resolve(format!("function '{name}': {e}")))?;
            (f, symbol, cu.path.clone())
        }
    };

    let _ = symbol;
    let mut regions = Vec::new();
    if let Some(r) = resolve_function_body(&cu_path, f) {
        regions.push(r);
    }
    regions.extend(resolve_inline_instances(&cu_path, f, instance_index));

    if regions.is_empty() {
        return Err(Error::resolve(format!("function '{name}' has no concrete body or inline instances")));
    }
    Ok(regions)
}

fn resolve_address_range(start: u64, end: u64) -> Vec<ResolvedRegion> {
    vec![ResolvedRegion {
        start_addr: start,
        end_addr: end,
        start_context: TrapContext::Address { address: start },
        end_context: TrapContext::Address { address: end },
        label_suffix: None,
    }]
}

pub fn resolve_region(oi: &ObjectInfo, region: &Region) -> Result<Vec<ResolvedRegion>> {
    match region {
        Region::SourceLines { start, end } => resolve_source_lines(oi, start, end),
        Region::Function { name, compilation_unit, instance_index } => resolve_function(oi, name, compilation_unit.as_deref(), *instance_index),
        Region::AddressRange { start, end } => Ok(resolve_address_range(*start, *end)),
    }
}
