//! The JSON document a run produces: a process-wide units/format manifest,
//! an optional idle baseline, and the group/section/execution tree mirrored
//! from the resolved configuration. Shape grounded in spec.md §4.G; the
//! per-platform tuple layout (§6 "format manifest") is a pair of
//! architecture-gated functions rather than a `cfg`-gated constant, so a
//! cross-compiled build never carries both layouts' dead code paths.

use serde::Serialize;

use nrg::{Kind, Reading, Sensor, SensorLayout};
use trace::{ExecutionRecord, TrapContext};

use crate::config::{ProfileConfig, ProfilingMethod};
use crate::idle::IdleBaseline;

#[derive(Serialize)]
pub struct UnitsManifest {
    pub time: &'static str,
    pub energy: &'static str,
    pub power: &'static str,
}

impl Default for UnitsManifest {
    fn default() -> Self {
        UnitsManifest { time: "ns", energy: "J", power: "W" }
    }
}

#[derive(Serialize)]
pub struct FormatManifest {
    pub cpu: Vec<&'static str>,
    pub gpu: Vec<&'static str>,
}

#[cfg(target_arch = "x86_64")]
fn cpu_format() -> Vec<&'static str> {
    vec!["energy"]
}

#[cfg(target_arch = "powerpc64")]
fn cpu_format() -> Vec<&'static str> {
    vec!["sensor_time", "power"]
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "powerpc64")))]
fn cpu_format() -> Vec<&'static str> {
    vec!["energy"]
}

fn gpu_format() -> Vec<&'static str> {
    vec!["power"]
}

impl Default for FormatManifest {
    fn default() -> Self {
        FormatManifest { cpu: cpu_format(), gpu: gpu_format() }
    }
}

#[derive(Serialize)]
pub struct CpuSampleValue {
    pub socket: u32,
    pub domain: String,
    pub value: f64,
    /// The sensor's own sample timestamp, carried through for readers that
    /// report one (OCC, on ppc64 — see `format.cpu` = `["sensor_time",
    /// "power"]`). `None` on readers (RAPL) whose only timestamp is the
    /// `Sample`-level `timestamp_ns`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_time_ns: Option<u64>,
}

#[derive(Serialize)]
pub struct GpuSampleValue {
    pub device: u32,
    pub kind: &'static str,
    pub value: f64,
}

#[derive(Serialize)]
pub struct Sample {
    pub timestamp_ns: u64,
    pub cpu: Vec<CpuSampleValue>,
    pub gpu: Vec<GpuSampleValue>,
}

/// Walks every slot a [`SensorLayout`] knows about and reads out whichever
/// ones `reading` actually populated, in ascending socket/domain and
/// device/kind order.
fn flatten(layout: &SensorLayout, reading: &Reading) -> (Vec<CpuSampleValue>, Vec<GpuSampleValue>) {
    let mut cpu = Vec::new();
    for socket in 0..layout.n_sockets() as u32 {
        for domain in nrg::CpuSensorLocation::ALL {
            let sensor_key = Sensor::Cpu { socket, domain };
            if let Some(q) = layout.value_at(reading, sensor_key) {
                let sensor_time_ns = layout.sensor_time_ns_at(reading, sensor_key);
                cpu.push(CpuSampleValue { socket, domain: domain.to_string(), value: q.value, sensor_time_ns });
            }
        }
    }
    let mut gpu = Vec::new();
    for device in 0..layout.n_devices() as u32 {
        for kind in [Kind::Power, Kind::Energy] {
            if let Some(q) = layout.value_at(reading, Sensor::Gpu { device, kind }) {
                let kind_name = match kind {
                    Kind::Power => "power",
                    Kind::Energy => "energy",
                };
                gpu.push(GpuSampleValue { device, kind: kind_name, value: q.value });
            }
        }
    }
    (cpu, gpu)
}

fn to_samples(layout: &SensorLayout, readings: &[Reading], origin: std::time::Instant) -> Vec<Sample> {
    readings
        .iter()
        .map(|r| {
            let (cpu, gpu) = flatten(layout, r);
            let timestamp_ns = r.timestamp().saturating_duration_since(origin).as_nanos() as u64;
            Sample { timestamp_ns, cpu, gpu }
        })
        .collect()
}

#[derive(Serialize)]
pub struct IdlePhase {
    pub sample_times: Vec<u64>,
    pub samples: Vec<Sample>,
}

#[derive(Serialize)]
pub struct IdleOutput {
    pub cpu: IdlePhase,
    pub gpu: IdlePhase,
}

fn idle_phase(layout: &SensorLayout, readings: &[Reading]) -> IdlePhase {
    let origin = readings.first().map(|r| r.timestamp()).unwrap_or_else(std::time::Instant::now);
    let samples = to_samples(layout, readings, origin);
    let sample_times = samples.iter().map(|s| s.timestamp_ns).collect();
    IdlePhase { sample_times, samples }
}

/// Serializes a [`TrapContext`] into the shape the output document carries
/// for a region boundary: always an address plus whatever richer
/// resolution (source line, function, inline instance) was available.
#[derive(Serialize)]
pub struct ContextOutput {
    pub address: u64,
    pub kind: &'static str,
    pub detail: String,
}

impl From<&TrapContext> for ContextOutput {
    fn from(ctx: &TrapContext) -> Self {
        let address = ctx.address();
        match ctx {
            TrapContext::Address { .. } => ContextOutput { address, kind: "address", detail: String::new() },
            TrapContext::SourceLine { cu, location, .. } => ContextOutput {
                address,
                kind: "source_line",
                detail: format!("{}:{}:{} ({})", location.file.display(), location.line, location.column, cu.display()),
            },
            TrapContext::FunctionCall { function, .. } => ContextOutput { address, kind: "function_call", detail: function.clone() },
            TrapContext::InlineFunction { function, call_site, .. } => ContextOutput {
                address,
                kind: "inline_function",
                detail: format!("{} (from {}:{})", function, call_site.file.display(), call_site.line),
            },
            TrapContext::FunctionReturn { function, .. } => ContextOutput { address, kind: "function_return", detail: function.clone() },
        }
    }
}

#[derive(Serialize)]
pub struct ExecutionOutput {
    pub start_context: ContextOutput,
    pub end_context: ContextOutput,
    pub samples: Vec<Sample>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct SectionOutput {
    pub label: String,
    pub extra: String,
    pub readings_kind: &'static str,
    pub executions: Vec<ExecutionOutput>,
}

#[derive(Serialize)]
pub struct GroupOutput {
    pub label: String,
    pub extra: String,
    pub sections: Vec<SectionOutput>,
}

#[derive(Serialize)]
pub struct OutputDocument {
    pub units: UnitsManifest,
    pub format: FormatManifest,
    pub idle: Option<IdleOutput>,
    pub groups: Vec<GroupOutput>,
}

fn readings_kind(method: &ProfilingMethod) -> &'static str {
    match method {
        ProfilingMethod::Total | ProfilingMethod::TotalHeartbeat { .. } => "total",
        ProfilingMethod::Profile { .. } => "profile",
    }
}

/// An execution record belongs to a section if its label is that section's
/// own label, optionally followed by a ` [instance suffix]` tag
/// ([`crate::plan::plan_section`] only ever appends that one shape).
fn belongs_to(label: &str, section_label: &str) -> bool {
    label == section_label || label.starts_with(&format!("{section_label} ["))
}

/// Caps an out-of-order vector of matched executions to at most
/// `max_executions`, preserving arrival order. Traps stay installed for
/// the whole run (the tracing engine has no reinstall-skip mechanism), so
/// this is enforced here rather than at the trap layer.
fn capped(mut executions: Vec<ExecutionOutput>, max_executions: Option<u32>) -> Vec<ExecutionOutput> {
    if let Some(max) = max_executions {
        executions.truncate(max as usize);
    }
    executions
}

/// Reassembles the flat stream of [`ExecutionRecord`]s the tracing engine
/// produced back into the group/section tree the configuration described,
/// using [`crate::plan`]'s `"{group}/{section}[ [suffix]]"` label
/// convention to find each record's home. `layouts` maps each record's own
/// label to the [`SensorLayout`] its reader was built with — every section
/// constructs its own reader instance, so one execution's raw values are
/// only meaningful against the layout that specific reader produced.
pub fn build(
    cfg: &ProfileConfig,
    idle: Option<IdleBaseline>,
    mut records: Vec<ExecutionRecord>,
    layouts: &std::collections::HashMap<String, SensorLayout>,
) -> OutputDocument {
    let groups = cfg
        .groups
        .iter()
        .map(|group| {
            let sections = group
                .sections
                .iter()
                .map(|section| {
                    let full_label = format!("{}/{}", group.label, section.label);
                    let mut matched = Vec::new();
                    let mut i = 0;
                    while i < records.len() {
                        if belongs_to(&records[i].label, &full_label) {
                            let record = records.remove(i);
                            let layout = layouts.get(&record.label);
                            let samples = match (&record.samples, layout) {
                                (Ok(readings), Some(layout)) => {
                                    let origin = readings.first().map(|r| r.timestamp()).unwrap_or_else(std::time::Instant::now);
                                    to_samples(layout, readings, origin)
                                }
                                _ => Vec::new(),
                            };
                            let error = record.samples.as_ref().err().cloned();
                            matched.push(ExecutionOutput {
                                start_context: ContextOutput::from(&record.start_context),
                                end_context: ContextOutput::from(&record.end_context),
                                samples,
                                error,
                            });
                        } else {
                            i += 1;
                        }
                    }
                    SectionOutput {
                        label: section.label.clone(),
                        extra: section.extra.clone(),
                        readings_kind: readings_kind(&section.method),
                        executions: capped(matched, section.max_executions),
                    }
                })
                .collect();
            GroupOutput { label: group.label.clone(), extra: group.extra.clone(), sections }
        })
        .collect();

    let idle = idle.map(|baseline| IdleOutput {
        cpu: idle_phase(&baseline.cpu_layout, &baseline.cpu),
        gpu: idle_phase(&baseline.gpu_layout, &baseline.gpu),
    });

    OutputDocument { units: UnitsManifest::default(), format: FormatManifest::default(), idle, groups }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belongs_to_matches_plain_and_suffixed_labels() {
        assert!(belongs_to("group/section", "group/section"));
        assert!(belongs_to("group/section [inline#0]", "group/section"));
        assert!(!belongs_to("group/other", "group/section"));
    }

    #[test]
    fn capped_truncates_to_max_executions() {
        let executions: Vec<ExecutionOutput> = (0..5)
            .map(|_| ExecutionOutput {
                start_context: ContextOutput { address: 0, kind: "address", detail: String::new() },
                end_context: ContextOutput { address: 0, kind: "address", detail: String::new() },
                samples: Vec::new(),
                error: None,
            })
            .collect();
        assert_eq!(capped(executions, Some(2)).len(), 2);
    }

    /// A reader that records a per-sensor sample timestamp (as `nrg::cpu::occ`
    /// does on ppc64) must surface it on the flattened `CpuSampleValue`,
    /// matching the `sensor_time` element `cpu_format()` advertises there.
    #[test]
    fn flatten_carries_the_occ_style_sensor_timestamp() {
        let mut layout = SensorLayout::new(1, 0);
        let sensor = Sensor::Cpu { socket: 0, domain: nrg::CpuSensorLocation::Package };
        layout.set_scale(sensor, 1.0, Kind::Power);
        let mut reading = layout.new_reading();
        reading.set(&layout, sensor, 7.0);
        reading.set_sensor_time_ns(&layout, sensor, 555_000);

        let (cpu, _gpu) = flatten(&layout, &reading);
        assert_eq!(cpu.len(), 1);
        assert_eq!(cpu[0].sensor_time_ns, Some(555_000));
    }

    #[test]
    fn flatten_leaves_sensor_timestamp_unset_for_rapl_style_readers() {
        let mut layout = SensorLayout::new(1, 0);
        let sensor = Sensor::Cpu { socket: 0, domain: nrg::CpuSensorLocation::Package };
        layout.set_scale(sensor, 1.0, Kind::Energy);
        let mut reading = layout.new_reading();
        reading.set(&layout, sensor, 7.0);

        let (cpu, _gpu) = flatten(&layout, &reading);
        assert_eq!(cpu[0].sensor_time_ns, None);
    }
}
