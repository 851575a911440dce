//! Turns a loaded [`crate::config::ProfileConfig`] plus a resolved
//! [`dbginfo::ObjectInfo`] into the trap pairs `trace::trace` installs.
//! Readers are constructed eagerly, before the tracee is ever spawned,
//! since `trace::trace`'s `build_specs` callback only learns the runtime
//! load address after attach and must return infallibly at that point.

use dbginfo::ObjectInfo;
use nrg::{EnergyReader, GpuReadingKind, SamplingPolicy};
use trace::TrapSpec;

use crate::config::{GroupConfig, MaskOverrides, ProfileConfig, ProfilingMethod, SectionConfig, Target};
use crate::error::{Error, Result};
use crate::resolve::{self, ResolvedRegion};

/// One trap pair still expressed in DWARF-relative addresses, carrying
/// everything needed to become a [`TrapSpec`] pair once the runtime load
/// address is known.
pub struct PlanEntry {
    pub label: String,
    pub region: ResolvedRegion,
    pub reader: Box<dyn EnergyReader>,
    pub policy: SamplingPolicy,
    pub allow_concurrency: bool,
    pub max_executions: Option<u32>,
}

pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    /// Offsets every entry's addresses by `load_address` and expands it
    /// into the `Start`/`End` pair `trace::trace` wants.
    pub fn into_trap_specs(self, load_address: u64) -> Vec<TrapSpec> {
        let mut specs = Vec::with_capacity(self.entries.len() * 2);
        for entry in self.entries {
            let start = entry.region.start_addr + load_address;
            let end = entry.region.end_addr + load_address;
            specs.push(TrapSpec::Start {
                address: start,
                context: entry.region.start_context,
                reader: entry.reader,
                policy: entry.policy,
                allow_concurrency: entry.allow_concurrency,
                label: entry.label,
            });
            specs.push(TrapSpec::End { address: end, context: entry.region.end_context, start });
        }
        specs
    }
}

fn sampling_policy_for(method: &ProfilingMethod) -> SamplingPolicy {
    match method {
        ProfilingMethod::Total => SamplingPolicy::Short,
        ProfilingMethod::TotalHeartbeat { period_ms } => match period_ms {
            Some(ms) => SamplingPolicy::BoundedPeriodic { period: std::time::Duration::from_millis(*ms) },
            None => SamplingPolicy::bounded_default(),
        },
        ProfilingMethod::Profile { interval_ms, initial_capacity } => {
            let interval_ms = interval_ms.unwrap_or(10);
            let initial_capacity = initial_capacity.unwrap_or(nrg::sampler::DEFAULT_UNBOUNDED_CAPACITY);
            SamplingPolicy::UnboundedPeriodic {
                period: std::time::Duration::from_millis(interval_ms),
                initial_capacity,
            }
        }
    }
}

/// Practical upper bound used when a mask override leaves sockets/devices
/// unspecified ("all"): the real reader discovers the actual socket or
/// device count itself and only ever consults bits below that count, so a
/// generously wide all-ones mask is equivalent to enumerating the true
/// count without probing hardware topology twice.
const PRACTICALLY_ALL: usize = 64;

fn build_reader(targets: &[Target], masks: &MaskOverrides) -> Result<Box<dyn EnergyReader>> {
    let wants_cpu = targets.iter().any(|t| matches!(t, Target::Cpu));
    let wants_gpu = targets.iter().any(|t| matches!(t, Target::Gpu));

    let location_mask = crate::config::parse_location_mask(&masks.locations)?;
    let socket_mask = crate::config::socket_mask_from(&masks.sockets, PRACTICALLY_ALL);
    let device_mask = crate::config::device_mask_from(&masks.devices, PRACTICALLY_ALL);
    let gpu_kind = GpuReadingKind::POWER | GpuReadingKind::ENERGY;

    match (wants_cpu, wants_gpu) {
        (true, true) => {
            let cpu = nrg::CpuReader::new(location_mask, socket_mask)?;
            let gpu = nrg::GpuReader::new(device_mask, gpu_kind)?;
            Ok(Box::new(nrg::HybridReader::new(cpu, gpu)))
        }
        (true, false) => Ok(Box::new(nrg::CpuReader::new(location_mask, socket_mask)?)),
        (false, true) => Ok(Box::new(nrg::GpuReader::new(device_mask, gpu_kind)?)),
        (false, false) => Err(Error::config("section has no targets")),
    }
}

fn plan_section(group: &GroupConfig, section: &SectionConfig, oi: &ObjectInfo, masks: &MaskOverrides) -> Result<Vec<PlanEntry>> {
    let regions = resolve::resolve_region(oi, &section.region)?;
    let policy = sampling_policy_for(&section.method);

    let mut entries = Vec::with_capacity(regions.len());
    for region in regions {
        let reader = build_reader(&section.targets, masks)?;
        let label = match &region.label_suffix {
            Some(suffix) => format!("{}/{} [{suffix}]", group.label, section.label),
            None => format!("{}/{}", group.label, section.label),
        };
        entries.push(PlanEntry {
            label,
            region,
            reader,
            policy,
            allow_concurrency: section.allow_concurrency,
            max_executions: section.max_executions,
        });
    }
    Ok(entries)
}

pub fn build(oi: &ObjectInfo, cfg: &ProfileConfig) -> Result<Plan> {
    let mut entries = Vec::new();
    for group in &cfg.groups {
        for section in &group.sections {
            entries.extend(plan_section(group, section, oi, &cfg.masks)?);
        }
    }
    if entries.is_empty() {
        return Err(Error::config("no sections resolved to any trap"));
    }
    Ok(Plan { entries })
}
