//! Energy readers and the per-region sampler engine: RAPL-via-powercap
//! and OCC in-band sensors on the CPU side, NVML/ROCm SMI on the GPU
//! side, a hybrid fan-out reader, and the sampler engine that drives any
//! of them at a policy-defined cadence.

pub mod counter;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod hybrid;
pub mod mask;
pub mod reader_trait;
pub mod reading;
pub mod sampler;
pub mod socket;
pub mod units;

pub use cpu::CpuReader;
pub use error::{Error, Result};
pub use gpu::GpuReader;
pub use hybrid::HybridReader;
pub use mask::{CpuSensorLocation, DeviceMask, GpuReadingKind, LocationMask, SocketMask};
pub use reader_trait::EnergyReader;
pub use reading::{Reading, Sensor, SensorLayout};
pub use sampler::{Sampler, SamplingPolicy};
pub use units::{Kind, Quantity};
