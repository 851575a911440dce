use crate::error::Result;
use crate::reading::{Reading, SensorLayout};

/// Common surface every energy reader exposes: construct with a mask,
/// take a timestamped reading on demand, report per-sensor values.
/// Object-safe so the hybrid reader can hold a heterogeneous list of
/// children.
pub trait EnergyReader: Send {
    fn layout(&self) -> &SensorLayout;
    fn read(&mut self) -> Result<Reading>;
    fn boxed_clone(&self) -> Box<dyn EnergyReader>;
}

impl Clone for Box<dyn EnergyReader> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}
