//! Wires every other module together: loads the region configuration,
//! parses the target's debug info, builds the trap plan, optionally
//! samples an idle baseline, runs the tracing engine, and assembles the
//! output document. The one entry point a CLI (or a future embedder)
//! needs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dbginfo::{ExecutableType, ObjectInfo};
use log::info;
use nrg::SensorLayout;

use crate::config::{self, ProfileConfig};
use crate::error::Result;
use crate::idle;
use crate::output::{self, OutputDocument};
use crate::plan::{self, Plan};

pub struct RunOptions {
    pub program: String,
    pub args: Vec<String>,
    pub config_path: PathBuf,
    /// `None` auto-detects from the ELF header (`ET_DYN` means PIE).
    pub pie_override: Option<bool>,
    pub wrapper_target: Option<PathBuf>,
    pub idle_baseline: bool,
    pub idle_seconds: u64,
    /// Forces every section's `allow_concurrency`, ignoring the config.
    pub allow_concurrency_override: Option<bool>,
}

fn apply_overrides(mut cfg: ProfileConfig, allow_concurrency: Option<bool>) -> ProfileConfig {
    if let Some(value) = allow_concurrency {
        for group in &mut cfg.groups {
            for section in &mut group.sections {
                section.allow_concurrency = value;
            }
        }
    }
    cfg
}

fn detect_pie(oi: &ObjectInfo, override_value: Option<bool>) -> bool {
    override_value.unwrap_or(matches!(oi.header().kind, ExecutableType::SharedObject))
}

/// Cross-checks the powercap domain layout against the socket topology
/// before a run starts; only meaningful on x86_64, where both come from
/// independent sysfs trees and can disagree on a misconfigured host.
#[cfg(target_arch = "x86_64")]
fn check_domain_consistency() {
    let Ok(zones) = nrg::cpu::powercap::all_power_zones() else { return };
    let Ok(sockets) = nrg::socket::socket_count() else { return };
    nrg::cpu::powercap::warn_on_domain_inconsistency(&zones, sockets);
}

#[cfg(not(target_arch = "x86_64"))]
fn check_domain_consistency() {}

/// Captures each planned entry's reader layout before the plan is
/// consumed into trap specs, keyed by the same label the resulting
/// `ExecutionRecord`s carry.
fn capture_layouts(plan: &Plan) -> HashMap<String, SensorLayout> {
    plan.entries.iter().map(|e| (e.label.clone(), e.reader.layout().clone())).collect()
}

/// One line of a dry-run trap plan preview: no tracee is spawned, so the
/// addresses shown are DWARF-relative offsets, not final runtime
/// addresses.
pub struct DryRunEntry {
    pub label: String,
    pub start_offset: u64,
    pub end_offset: u64,
    pub start_context: String,
    pub end_context: String,
}

pub fn dry_run(opts: &RunOptions) -> Result<Vec<DryRunEntry>> {
    let cfg = load_config(opts)?;
    let oi = ObjectInfo::load(&opts.program)?;
    let built = plan::build(&oi, &cfg)?;
    Ok(built
        .entries
        .iter()
        .map(|e| DryRunEntry {
            label: e.label.clone(),
            start_offset: e.region.start_addr,
            end_offset: e.region.end_addr,
            start_context: e.region.start_context.to_string(),
            end_context: e.region.end_context.to_string(),
        })
        .collect())
}

fn load_config(opts: &RunOptions) -> Result<ProfileConfig> {
    let cfg = config::load(&opts.config_path)?;
    Ok(apply_overrides(cfg, opts.allow_concurrency_override))
}

pub fn run(opts: &RunOptions) -> Result<OutputDocument> {
    let cfg = load_config(opts)?;
    let oi = ObjectInfo::load(&opts.program)?;
    let is_pie = detect_pie(&oi, opts.pie_override);
    check_domain_consistency();

    let built = plan::build(&oi, &cfg)?;
    let layouts = capture_layouts(&built);
    info!("resolved {} trap pair(s) across {} group(s)", built.entries.len(), cfg.groups.len());

    let idle_baseline = if opts.idle_baseline {
        info!("sampling idle baseline for {}s before attaching tracee", opts.idle_seconds);
        Some(idle::run(&cfg.masks, Duration::from_secs(opts.idle_seconds))?)
    } else {
        None
    };

    let wrapper_target: Option<&Path> = opts.wrapper_target.as_deref();
    let records = trace::trace(&opts.program, &opts.args, is_pie, wrapper_target, move |load_address| built.into_trap_specs(load_address))?;
    info!("tracing complete, {} execution record(s) collected", records.len());

    Ok(output::build(&cfg, idle_baseline, records, &layouts))
}
