//! GPU power/energy reader. Vendor backend is a compile-time choice,
//! same as `original_source/nrg/src/{nvidia,amd,none}/reader_gpu.cpp`
//! are alternate translation units selected by the build system.

#[cfg(feature = "gpu-nvidia")]
pub mod nvml;
#[cfg(feature = "gpu-rocm")]
pub mod rocm;
pub mod none;

use crate::error::Result;
use crate::mask::{DeviceMask, GpuReadingKind};
use crate::reading::{Reading, SensorLayout};

pub enum GpuReader {
    #[cfg(feature = "gpu-nvidia")]
    Nvml(nvml::NvmlReader),
    #[cfg(feature = "gpu-rocm")]
    Rocm(rocm::RocmReader),
    None(none::NoneReader),
}

impl GpuReader {
    #[cfg(feature = "gpu-nvidia")]
    pub fn new(device_mask: DeviceMask, kind: GpuReadingKind) -> Result<Self> {
        Ok(GpuReader::Nvml(nvml::NvmlReader::new(device_mask, kind)?))
    }

    #[cfg(all(feature = "gpu-rocm", not(feature = "gpu-nvidia")))]
    pub fn new(device_mask: DeviceMask, kind: GpuReadingKind) -> Result<Self> {
        Ok(GpuReader::Rocm(rocm::RocmReader::new(device_mask, kind)?))
    }

    #[cfg(not(any(feature = "gpu-nvidia", feature = "gpu-rocm")))]
    pub fn new(device_mask: DeviceMask, _kind: GpuReadingKind) -> Result<Self> {
        Ok(GpuReader::None(none::NoneReader::new(device_mask)?))
    }

    pub fn layout(&self) -> &SensorLayout {
        match self {
            #[cfg(feature = "gpu-nvidia")]
            GpuReader::Nvml(r) => r.layout(),
            #[cfg(feature = "gpu-rocm")]
            GpuReader::Rocm(r) => r.layout(),
            GpuReader::None(r) => r.layout(),
        }
    }

    pub fn read(&mut self) -> Result<Reading> {
        match self {
            #[cfg(feature = "gpu-nvidia")]
            GpuReader::Nvml(r) => r.read(),
            #[cfg(feature = "gpu-rocm")]
            GpuReader::Rocm(r) => r.read(),
            GpuReader::None(r) => r.read(),
        }
    }
}

impl Clone for GpuReader {
    fn clone(&self) -> Self {
        match self {
            #[cfg(feature = "gpu-nvidia")]
            GpuReader::Nvml(r) => GpuReader::Nvml(r.clone()),
            #[cfg(feature = "gpu-rocm")]
            GpuReader::Rocm(r) => GpuReader::Rocm(r.clone()),
            GpuReader::None(r) => GpuReader::None(r.clone()),
        }
    }
}

impl crate::reader_trait::EnergyReader for GpuReader {
    fn layout(&self) -> &SensorLayout {
        GpuReader::layout(self)
    }

    fn read(&mut self) -> Result<Reading> {
        GpuReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}
