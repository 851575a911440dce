//! Region-selection configuration: a `serde`-derived tree deserialized
//! from TOML or JSON. Shape mirrors `original_source/src/config.hpp`'s
//! `config_data` (`threads` + `tasks`, each task naming a `target`,
//! `method` and `section`), reorganized into groups of sections the way
//! the output model (§4.G) groups executions.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Cpu,
    Gpu,
}

/// A source position: compilation unit path plus a 1-based line number.
#[derive(Debug, Clone, Deserialize)]
pub struct Position {
    pub compilation_unit: PathBuf,
    pub line: u32,
}

/// A bracketed region expressed in one of the three ways spec.md §6 allows.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Region {
    /// `{compilation_unit, line}` start+end pair.
    SourceLines { start: Position, end: Position },
    /// `{function_name, [compilation_unit], [instance selector]}`.
    Function {
        name: String,
        compilation_unit: Option<PathBuf>,
        /// Selects one inlined instance by its position among the
        /// function's gathered instances; `None` means "every instance".
        instance_index: Option<usize>,
    },
    /// Raw half-open address interval `[start, end)`.
    AddressRange { start: u64, end: u64 },
}

/// Sampling discipline for a section, named after `original_source`'s
/// `profiling_method::{energy_total,energy_profile}` with a third,
/// supplemented form covering the bounded-periodic discipline spec.md §4.B
/// describes but the original's two-method enum has no slot for.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfilingMethod {
    /// `energy_total`: exactly 2 readings, at entry and exit.
    Total,
    /// A liveness heartbeat at `period_ms` (default 30s) with only the
    /// first and last reading kept.
    TotalHeartbeat { period_ms: Option<u64> },
    /// `energy_profile`: one reading at entry and every `interval_ms`
    /// (default 10ms) until exit, all of them kept.
    Profile { interval_ms: Option<u64>, initial_capacity: Option<usize> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionConfig {
    pub label: String,
    #[serde(default)]
    pub extra: String,
    pub region: Region,
    pub targets: Vec<Target>,
    pub method: ProfilingMethod,
    /// Opts this section's trap pair out of the stop-the-world barrier.
    #[serde(default)]
    pub allow_concurrency: bool,
    /// Caps how many times this section's trap pair may fire before its
    /// traps are left un-reinstalled, mirrored from `original_source`'s
    /// `task::executions`.
    pub max_executions: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub label: String,
    #[serde(default)]
    pub extra: String,
    pub sections: Vec<SectionConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MaskOverrides {
    /// Names from [`nrg::CpuSensorLocation`] (`package`, `cores`,
    /// `uncore`, `dram`, `system`, `gpu_rail`); empty means "all".
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub sockets: Vec<u32>,
    #[serde(default)]
    pub devices: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Advisory, carried through from `original_source`'s `config_data::threads`;
    /// the tracing engine always spawns one tracer per observed tracee
    /// thread regardless of this value.
    #[serde(default)]
    pub threads: u32,
    #[serde(default)]
    pub masks: MaskOverrides,
    pub groups: Vec<GroupConfig>,
}

/// Loads a [`ProfileConfig`] from `path`, dispatching on extension: `.toml`
/// for TOML, anything else (including `.json`) for JSON.
pub fn load(path: impl AsRef<Path>) -> Result<ProfileConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
    if is_toml {
        toml::from_str(&text).map_err(|e| Error::config(format!("bad TOML config: {e}")))
    } else {
        serde_json::from_str(&text).map_err(|e| Error::config(format!("bad JSON config: {e}")))
    }
}

pub fn parse_location_mask(names: &[String]) -> Result<nrg::LocationMask> {
    if names.is_empty() {
        return Ok(nrg::LocationMask::ALL);
    }
    let mut mask = nrg::LocationMask::empty();
    for name in names {
        let bit = match name.as_str() {
            "package" => nrg::LocationMask::PACKAGE,
            "cores" => nrg::LocationMask::CORES,
            "uncore" => nrg::LocationMask::UNCORE,
            "dram" => nrg::LocationMask::DRAM,
            "system" => nrg::LocationMask::SYSTEM,
            "gpu_rail" => nrg::LocationMask::GPU_RAIL,
            other => return Err(Error::config(format!("unknown CPU sensor location '{other}'"))),
        };
        mask |= bit;
    }
    Ok(mask)
}

pub fn socket_mask_from(sockets: &[u32], n_sockets: usize) -> nrg::SocketMask {
    if sockets.is_empty() {
        return nrg::SocketMask::all(n_sockets as u32);
    }
    let mut mask = nrg::SocketMask::NONE;
    for &s in sockets {
        mask |= nrg::SocketMask::single(s);
    }
    mask
}

pub fn device_mask_from(devices: &[u32], n_devices: usize) -> nrg::DeviceMask {
    if devices.is_empty() {
        return nrg::DeviceMask::all(n_devices as u32);
    }
    let mut mask = nrg::DeviceMask::NONE;
    for &d in devices {
        mask |= nrg::DeviceMask::single(d);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trip_for_a_total_section() {
        let toml_text = r#"
            threads = 4

            [[groups]]
            label = "matmul"

            [[groups.sections]]
            label = "body"
            targets = ["cpu"]
            max_executions = 1

            [groups.sections.region]
            kind = "function"
            name = "matmul"

            [groups.sections.method]
            kind = "total"
        "#;
        let cfg: ProfileConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.threads, 4);
        assert_eq!(cfg.groups.len(), 1);
        let section = &cfg.groups[0].sections[0];
        assert_eq!(section.label, "body");
        assert!(matches!(section.region, Region::Function { ref name, .. } if name == "matmul"));
        assert!(matches!(section.method, ProfilingMethod::Total));
    }

    #[test]
    fn location_mask_rejects_unknown_names() {
        let err = parse_location_mask(&["bogus".to_owned()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_location_mask_means_all() {
        assert_eq!(parse_location_mask(&[]).unwrap(), nrg::LocationMask::ALL);
    }
}
