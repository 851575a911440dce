//! No-op GPU reader selected when no vendor backend is compiled in
//! (mirrors `original_source/nrg/src/none/reader_gpu.cpp`): every sensor
//! reports "no such event", construction never fails.

use crate::error::Result;
use crate::mask::DeviceMask;
use crate::reading::{Reading, SensorLayout};

pub struct NoneReader {
    layout: SensorLayout,
}

impl NoneReader {
    pub fn new(_device_mask: DeviceMask) -> Result<Self> {
        Ok(NoneReader {
            layout: SensorLayout::new(0, 0),
        })
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    pub fn read(&mut self) -> Result<Reading> {
        let mut r = self.layout.new_reading();
        r.set_timestamp_now();
        Ok(r)
    }
}

impl Clone for NoneReader {
    fn clone(&self) -> Self {
        NoneReader {
            layout: self.layout.clone(),
        }
    }
}

impl crate::reader_trait::EnergyReader for NoneReader {
    fn layout(&self) -> &SensorLayout {
        self.layout()
    }

    fn read(&mut self) -> Result<Reading> {
        NoneReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}
