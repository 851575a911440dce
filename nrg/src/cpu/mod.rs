//! CPU energy reader, architecture-selected at compile time:
//! RAPL via powercap sysfs on x86_64, OCC in-band sensors on ppc64.

#[cfg(target_arch = "x86_64")]
pub mod powercap;
#[cfg(target_arch = "powerpc64")]
pub mod occ;

use crate::error::Result;
use crate::mask::{LocationMask, SocketMask};
use crate::reading::{Reading, SensorLayout};

pub enum CpuReader {
    #[cfg(target_arch = "x86_64")]
    Powercap(powercap::PowercapReader),
    #[cfg(target_arch = "powerpc64")]
    Occ(occ::OccReader),
}

impl CpuReader {
    #[cfg(target_arch = "x86_64")]
    pub fn new(location_mask: LocationMask, socket_mask: SocketMask) -> Result<Self> {
        Ok(CpuReader::Powercap(powercap::PowercapReader::new(
            location_mask,
            socket_mask,
        )?))
    }

    #[cfg(target_arch = "powerpc64")]
    pub fn new(location_mask: LocationMask, socket_mask: SocketMask) -> Result<Self> {
        Ok(CpuReader::Occ(occ::OccReader::new(location_mask, socket_mask)?))
    }

    pub fn layout(&self) -> &SensorLayout {
        match self {
            #[cfg(target_arch = "x86_64")]
            CpuReader::Powercap(r) => r.layout(),
            #[cfg(target_arch = "powerpc64")]
            CpuReader::Occ(r) => r.layout(),
        }
    }

    pub fn read(&mut self) -> Result<Reading> {
        match self {
            #[cfg(target_arch = "x86_64")]
            CpuReader::Powercap(r) => r.read(),
            #[cfg(target_arch = "powerpc64")]
            CpuReader::Occ(r) => r.read(),
        }
    }
}

impl Clone for CpuReader {
    fn clone(&self) -> Self {
        match self {
            #[cfg(target_arch = "x86_64")]
            CpuReader::Powercap(r) => CpuReader::Powercap(r.clone()),
            #[cfg(target_arch = "powerpc64")]
            CpuReader::Occ(r) => CpuReader::Occ(r.clone()),
        }
    }
}

impl crate::reader_trait::EnergyReader for CpuReader {
    fn layout(&self) -> &SensorLayout {
        CpuReader::layout(self)
    }

    fn read(&mut self) -> Result<Reading> {
        CpuReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}
