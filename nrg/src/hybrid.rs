//! Fans out `read()` across a CPU and a GPU reader, used when a region
//! spans both. Owns its two children (rather than holding non-owning
//! references to them) since readers here are `Clone`, not aliased.

use crate::cpu::CpuReader;
use crate::error::Result;
use crate::gpu::GpuReader;
use crate::mask::CpuSensorLocation;
use crate::reading::{Reading, Sensor, SensorLayout};
use crate::units::Kind;

pub struct HybridReader {
    cpu: CpuReader,
    gpu: GpuReader,
    layout: SensorLayout,
}

fn merge_layout(cpu: &SensorLayout, gpu: &SensorLayout) -> SensorLayout {
    let mut merged = SensorLayout::new(cpu.n_sockets(), gpu.n_devices());
    for socket in 0..cpu.n_sockets() as u32 {
        for domain in CpuSensorLocation::ALL {
            if let Some((scale, kind)) = cpu.scale_of(Sensor::Cpu { socket, domain }) {
                merged.set_scale(Sensor::Cpu { socket, domain }, scale, kind);
            }
        }
    }
    for device in 0..gpu.n_devices() as u32 {
        for kind in [Kind::Power, Kind::Energy] {
            if let Some((scale, _)) = gpu.scale_of(Sensor::Gpu { device, kind }) {
                merged.set_scale(Sensor::Gpu { device, kind }, scale, kind);
            }
        }
    }
    merged
}

impl HybridReader {
    pub fn new(cpu: CpuReader, gpu: GpuReader) -> Self {
        let layout = merge_layout(cpu.layout(), gpu.layout());
        HybridReader { cpu, gpu, layout }
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    pub fn read(&mut self) -> Result<Reading> {
        let cpu_reading = self.cpu.read()?;
        let gpu_reading = self.gpu.read()?;

        let mut merged = self.layout.new_reading();
        for socket in 0..self.layout.n_sockets() as u32 {
            for domain in CpuSensorLocation::ALL {
                let sensor = Sensor::Cpu { socket, domain };
                if let Some(v) = cpu_reading.raw_at(self.cpu.layout(), sensor) {
                    merged.set(&self.layout, sensor, v);
                }
            }
        }
        for device in 0..self.layout.n_devices() as u32 {
            for kind in [Kind::Power, Kind::Energy] {
                let sensor = Sensor::Gpu { device, kind };
                if let Some(v) = gpu_reading.raw_at(self.gpu.layout(), sensor) {
                    merged.set(&self.layout, sensor, v);
                }
            }
        }
        merged.set_timestamp_now();
        Ok(merged)
    }
}

impl Clone for HybridReader {
    fn clone(&self) -> Self {
        HybridReader {
            cpu: self.cpu.clone(),
            gpu: self.gpu.clone(),
            layout: self.layout.clone(),
        }
    }
}

impl crate::reader_trait::EnergyReader for HybridReader {
    fn layout(&self) -> &SensorLayout {
        self.layout()
    }

    fn read(&mut self) -> Result<Reading> {
        HybridReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}
