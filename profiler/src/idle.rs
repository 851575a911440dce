//! Idle power/energy baseline: samples the CPU and then the GPU readers
//! while the system does nothing else, so a caller can subtract ambient
//! draw from a measured region. Ported from
//! `original_source/src/idle_evaluator.cpp`: CPU first to completion,
//! then GPU to completion — never concurrently, since the two readers
//! are believed to interfere if opened at the same time on some RAPL/OCC
//! implementations.

use std::time::Duration;

use nrg::{EnergyReader, GpuReadingKind, Reading, Sampler, SamplingPolicy, SensorLayout};

use crate::config::MaskOverrides;
use crate::error::Result;

pub const DEFAULT_SLEEP: Duration = Duration::from_secs(5);
const CPU_INTERVAL: Duration = Duration::from_millis(30_000);
const GPU_INTERVAL: Duration = Duration::from_millis(10);

/// CPU and GPU idle readings, each a first+last or first+heartbeats+last
/// sequence depending on which policy sampled them.
pub struct IdleBaseline {
    pub cpu: Vec<Reading>,
    pub cpu_layout: SensorLayout,
    pub gpu: Vec<Reading>,
    pub gpu_layout: SensorLayout,
}

fn sleep(duration: Duration) {
    std::thread::sleep(duration);
}

fn sample_to_completion(reader: Box<dyn EnergyReader>, policy: SamplingPolicy, duration: Duration) -> Result<Vec<Reading>> {
    let sampler = Sampler::start(reader, policy)?;
    sleep(duration);
    Ok(sampler.stop()?)
}

/// Reserves enough capacity that the unbounded GPU sampler never
/// reallocates mid-run, mirroring the original's
/// `static_cast<uint32_t>(_sleep / gpu_interval) + 100`.
fn gpu_capacity(duration: Duration) -> usize {
    (duration.as_millis() / GPU_INTERVAL.as_millis()) as usize + 100
}

/// Runs the idle baseline: a CPU reader sampled first+last over
/// `duration` at [`CPU_INTERVAL`], then (sequentially, not concurrently)
/// a GPU reader sampled exhaustively over the same `duration` at
/// [`GPU_INTERVAL`].
pub fn run(masks: &MaskOverrides, duration: Duration) -> Result<IdleBaseline> {
    let location_mask = crate::config::parse_location_mask(&masks.locations)?;
    let socket_mask = crate::config::socket_mask_from(&masks.sockets, 64);
    let device_mask = crate::config::device_mask_from(&masks.devices, 64);
    let gpu_kind = GpuReadingKind::POWER | GpuReadingKind::ENERGY;

    let cpu_reader = nrg::CpuReader::new(location_mask, socket_mask)?;
    let cpu_layout = cpu_reader.layout().clone();
    log::info!("sampling idle CPU baseline for {:?}", duration);
    let cpu = sample_to_completion(Box::new(cpu_reader), SamplingPolicy::BoundedPeriodic { period: CPU_INTERVAL }, duration)?;
    log::info!("gathered idle CPU baseline ({} sample(s))", cpu.len());

    let gpu_reader = nrg::GpuReader::new(device_mask, gpu_kind)?;
    let gpu_layout = gpu_reader.layout().clone();
    log::info!("sampling idle GPU baseline for {:?}", duration);
    let capacity = gpu_capacity(duration);
    let gpu = sample_to_completion(Box::new(gpu_reader), SamplingPolicy::UnboundedPeriodic { period: GPU_INTERVAL, initial_capacity: capacity }, duration)?;
    log::info!("gathered idle GPU baseline ({} sample(s))", gpu.len());

    Ok(IdleBaseline { cpu, cpu_layout, gpu, gpu_layout })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_capacity_matches_reserved_sample_formula() {
        assert_eq!(gpu_capacity(Duration::from_secs(5)), 5000 / 10 + 100);
    }
}
