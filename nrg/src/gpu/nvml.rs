//! NVIDIA GPU reader via NVML (`nvml-wrapper`), grounded in
//! `original_source/nrg/src/nvidia/reader_gpu.cpp`: probe power/energy
//! support per device at construction, keep only the supported
//! intersection, wrap every vendor error into the common taxonomy.

use std::sync::Arc;

use log::{debug, info};
use nvml_wrapper::Nvml;

use crate::error::{Error, Result};
use crate::mask::{DeviceMask, GpuReadingKind};
use crate::reading::{Reading, Sensor, SensorLayout};
use crate::units::Kind;

const NVML_POWER_SCALE: f64 = 0.001; // milliwatts -> watts
const NVML_ENERGY_SCALE: f64 = 0.001; // millijoules -> joules

struct DeviceSlot {
    index: u32,
    supports_power: bool,
    supports_energy: bool,
}

/// NVML is reference-counted by the driver itself: every `Nvml` instance
/// calls `nvmlInit` on construction and `nvmlShutdown` on drop, so sharing
/// one behind an `Arc` is sufficient for "first reader inits, last
/// destroyed shuts down" without any reference counting of our own.
pub struct NvmlReader {
    lib: Arc<Nvml>,
    devices: Vec<DeviceSlot>,
    layout: SensorLayout,
}

impl NvmlReader {
    pub fn new(device_mask: DeviceMask, kind: GpuReadingKind) -> Result<Self> {
        if device_mask.bits() == 0 {
            return Err(Error::setup("no devices set in mask"));
        }
        let lib = Nvml::init().map_err(|e| Error::setup(format!("failed to initialise NVML: {e}")))?;
        let count = lib
            .device_count()
            .map_err(|e| Error::setup(format!("failed to obtain device count: {e}")))?;

        let mut layout = SensorLayout::new(0, count as usize);
        let mut devices = Vec::new();
        for index in 0..count {
            if !device_mask.contains_device(index) {
                continue;
            }
            let device = lib
                .device_by_index(index)
                .map_err(|e| Error::setup(format!("failed to get device handle: {e}")))?;
            let name = device
                .name()
                .map_err(|e| Error::setup(format!("failed to get device name: {e}")))?;
            info!("device: {index}, name: {name}");

            let supports_power = kind.contains(GpuReadingKind::POWER) && device.power_usage().is_ok();
            let supports_energy =
                kind.contains(GpuReadingKind::ENERGY) && device.total_energy_consumption().is_ok();

            if supports_power {
                layout.set_scale(
                    Sensor::Gpu { device: index, kind: Kind::Power },
                    NVML_POWER_SCALE,
                    Kind::Power,
                );
            }
            if supports_energy {
                layout.set_scale(
                    Sensor::Gpu { device: index, kind: Kind::Energy },
                    NVML_ENERGY_SCALE,
                    Kind::Energy,
                );
            }
            if supports_power || supports_energy {
                debug!("device {index}: power={supports_power} energy={supports_energy}");
                devices.push(DeviceSlot {
                    index,
                    supports_power,
                    supports_energy,
                });
            }
        }
        if devices.is_empty() {
            return Err(Error::setup("no GPU events were added"));
        }

        Ok(NvmlReader {
            lib: Arc::new(lib),
            devices,
            layout,
        })
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    pub fn read(&mut self) -> Result<Reading> {
        let mut reading = self.layout.new_reading();
        for slot in &self.devices {
            let device = self
                .lib
                .device_by_index(slot.index)
                .map_err(|e| Error::read(format!("failed to get device handle: {e}")))?;
            // energy takes priority for the shared slot only when both are
            // supported and a single reading must be picked; in practice
            // only one GpuReadingKind bit is requested per region.
            if slot.supports_power {
                let power = device.power_usage().map_err(|e| Error::read(e.to_string()))?;
                reading.set(
                    &self.layout,
                    Sensor::Gpu { device: slot.index, kind: Kind::Power },
                    power as f64,
                );
            }
            if slot.supports_energy {
                let energy = device
                    .total_energy_consumption()
                    .map_err(|e| Error::read(e.to_string()))?;
                reading.set(
                    &self.layout,
                    Sensor::Gpu { device: slot.index, kind: Kind::Energy },
                    energy as f64,
                );
            }
        }
        reading.set_timestamp_now();
        Ok(reading)
    }
}

impl crate::reader_trait::EnergyReader for NvmlReader {
    fn layout(&self) -> &SensorLayout {
        self.layout()
    }

    fn read(&mut self) -> Result<Reading> {
        NvmlReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}

impl Clone for NvmlReader {
    fn clone(&self) -> Self {
        NvmlReader {
            lib: Arc::clone(&self.lib),
            devices: self
                .devices
                .iter()
                .map(|d| DeviceSlot {
                    index: d.index,
                    supports_power: d.supports_power,
                    supports_energy: d.supports_energy,
                })
                .collect(),
            layout: self.layout.clone(),
        }
    }
}
