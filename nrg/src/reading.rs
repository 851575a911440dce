use std::ops::{Mul, Sub};
use std::time::Instant;

use crate::units::{Kind, Quantity};

/// Identifies one slot of a [`Reading`]'s flat value array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sensor {
    Cpu { socket: u32, domain: crate::mask::CpuSensorLocation },
    /// GPU devices carry one slot per [`Kind`]: a device may support power
    /// and energy simultaneously, and each needs its own scale/value,
    /// unlike CPU domains which are always energy.
    Gpu { device: u32, kind: Kind },
}

/// Per-slot scale/kind, resolved once at reader construction and shared
/// (by reference) by every [`Reading`] a reader produces.
#[derive(Clone, Debug)]
pub struct SensorLayout {
    n_sockets: usize,
    n_domains: usize,
    n_devices: usize,
    /// `None` where the mask excluded the slot ("no such event").
    scales: Vec<Option<(f64, Kind)>>,
}

impl SensorLayout {
    pub fn new(n_sockets: usize, n_devices: usize) -> Self {
        let n_domains = crate::mask::CpuSensorLocation::ALL.len();
        SensorLayout {
            n_sockets,
            n_domains,
            n_devices,
            scales: vec![None; n_sockets * n_domains + n_devices * 2],
        }
    }

    pub fn len(&self) -> usize {
        self.n_sockets * self.n_domains + self.n_devices * 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn gpu_base(&self) -> usize {
        self.n_sockets * self.n_domains
    }

    fn index(&self, sensor: Sensor) -> usize {
        match sensor {
            Sensor::Cpu { socket, domain } => {
                let domain_idx = crate::mask::CpuSensorLocation::ALL
                    .iter()
                    .position(|d| *d == domain)
                    .expect("CpuSensorLocation::ALL is exhaustive");
                socket as usize * self.n_domains + domain_idx
            }
            Sensor::Gpu { device, kind } => {
                let kind_idx = match kind {
                    Kind::Power => 0,
                    Kind::Energy => 1,
                };
                self.gpu_base() + device as usize * 2 + kind_idx
            }
        }
    }

    pub fn set_scale(&mut self, sensor: Sensor, scale: f64, kind: Kind) {
        let idx = self.index(sensor);
        self.scales[idx] = Some((scale, kind));
    }

    pub fn n_sockets(&self) -> usize {
        self.n_sockets
    }

    pub fn n_devices(&self) -> usize {
        self.n_devices
    }

    /// The (scale, kind) registered for `sensor` at construction, if any.
    /// Used by [`crate::hybrid::HybridReader`] to merge two child layouts
    /// sensor-by-sensor rather than by raw array offset, since a CPU-only
    /// and a GPU-only layout place the same logical sensor at different
    /// offsets.
    pub fn scale_of(&self, sensor: Sensor) -> Option<(f64, Kind)> {
        self.scales[self.index(sensor)]
    }

    pub fn new_reading(&self) -> Reading {
        Reading {
            timestamp: Instant::now(),
            values: vec![None; self.len()],
            sensor_times_ns: vec![None; self.len()],
        }
    }

    /// Reports "no such event" (`None`) when the mask excluded `sensor` at
    /// construction, otherwise the scaled [`Quantity`].
    pub fn value_at(&self, reading: &Reading, sensor: Sensor) -> Option<Quantity> {
        let idx = self.index(sensor);
        let (scale, kind) = self.scales[idx]?;
        let raw = reading.values[idx]?;
        Some(Quantity::new(raw, scale, kind))
    }

    pub(crate) fn raw_index(&self, sensor: Sensor) -> usize {
        self.index(sensor)
    }

    /// The OCC-style per-sensor sample timestamp for `sensor` in `reading`,
    /// if the reader that produced it records one (see
    /// [`Reading::set_sensor_time_ns`]); `None` for readers that don't.
    pub fn sensor_time_ns_at(&self, reading: &Reading, sensor: Sensor) -> Option<u64> {
        if self.scales[self.index(sensor)].is_none() {
            return None;
        }
        reading.sensor_time_ns_at(self, sensor)
    }
}

/// A monotonic-clock timestamp plus a flat vector of raw counter values.
/// `None` means the sensor was excluded by the mask at construction.
///
/// `sensor_times_ns` carries the OCC per-sensor sample timestamp (§4.A
/// ppc64: the ping/pong record's own 512 MHz tick timestamp, converted to
/// nanoseconds) when a reader has one to report; readers that only produce
/// one timestamp per `read()` call (RAPL, GPU) leave every slot `None` and
/// callers fall back to [`Reading::timestamp`].
#[derive(Clone, Debug)]
pub struct Reading {
    timestamp: Instant,
    values: Vec<Option<f64>>,
    sensor_times_ns: Vec<Option<u64>>,
}

impl Reading {
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn set_timestamp_now(&mut self) {
        self.timestamp = Instant::now();
    }

    pub(crate) fn set_raw(&mut self, idx: usize, value: f64) {
        self.values[idx] = Some(value);
    }

    pub fn set(&mut self, layout: &SensorLayout, sensor: Sensor, value: f64) {
        let idx = layout.raw_index(sensor);
        self.values[idx] = Some(value);
    }

    /// Records the sensor's own sample timestamp (nanoseconds), distinct
    /// from the `Reading`'s overall `timestamp` which marks when `read()`
    /// as a whole was taken.
    pub fn set_sensor_time_ns(&mut self, layout: &SensorLayout, sensor: Sensor, ns: u64) {
        let idx = layout.raw_index(sensor);
        self.sensor_times_ns[idx] = Some(ns);
    }

    /// The raw (unscaled) value stored for `sensor` under `layout`, if any.
    pub fn raw_at(&self, layout: &SensorLayout, sensor: Sensor) -> Option<f64> {
        self.values[layout.raw_index(sensor)]
    }

    /// The per-sensor sample timestamp recorded via
    /// [`Reading::set_sensor_time_ns`], if any.
    pub fn sensor_time_ns_at(&self, layout: &SensorLayout, sensor: Sensor) -> Option<u64> {
        self.sensor_times_ns[layout.raw_index(sensor)]
    }
}

impl PartialEq for Reading {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

/// Element-wise subtraction. Sensors absent from either side stay absent.
impl Sub for &Reading {
    type Output = Reading;

    fn sub(self, rhs: &Reading) -> Reading {
        let values = self
            .values
            .iter()
            .zip(rhs.values.iter())
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(a - b),
                _ => None,
            })
            .collect();
        Reading {
            timestamp: self.timestamp,
            values,
            sensor_times_ns: self.sensor_times_ns.clone(),
        }
    }
}

/// Element-wise scalar multiply.
impl Mul<f64> for &Reading {
    type Output = Reading;

    fn mul(self, rhs: f64) -> Reading {
        Reading {
            timestamp: self.timestamp,
            values: self.values.iter().map(|v| v.map(|v| v * rhs)).collect(),
            sensor_times_ns: self.sensor_times_ns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::CpuSensorLocation;

    #[test]
    fn sensor_time_round_trips_for_a_registered_sensor() {
        let mut layout = SensorLayout::new(1, 0);
        let sensor = Sensor::Cpu { socket: 0, domain: CpuSensorLocation::Package };
        layout.set_scale(sensor, 1.0, Kind::Power);
        let mut reading = layout.new_reading();
        reading.set(&layout, sensor, 42.0);
        reading.set_sensor_time_ns(&layout, sensor, 123_456);
        assert_eq!(layout.sensor_time_ns_at(&reading, sensor), Some(123_456));
    }

    #[test]
    fn sensor_time_is_none_for_an_unregistered_sensor() {
        let layout = SensorLayout::new(1, 0);
        let sensor = Sensor::Cpu { socket: 0, domain: CpuSensorLocation::Package };
        let reading = layout.new_reading();
        assert_eq!(layout.sensor_time_ns_at(&reading, sensor), None);
    }

    #[test]
    fn sensor_time_defaults_to_none_when_unset() {
        let mut layout = SensorLayout::new(1, 0);
        let sensor = Sensor::Cpu { socket: 0, domain: CpuSensorLocation::Package };
        layout.set_scale(sensor, 1.0, Kind::Power);
        let reading = layout.new_reading();
        assert_eq!(layout.sensor_time_ns_at(&reading, sensor), None);
    }
}
