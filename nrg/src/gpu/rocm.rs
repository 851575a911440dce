//! AMD GPU reader via ROCm SMI, loaded dynamically with `libloading`
//! since no `rsmi-sys`-style binding ships in the retrieval pack. Grounded
//! in `original_source/nrg/src/amd/reader_gpu.cpp`: ROCm SMI exposes only
//! instantaneous power, never a cumulative energy counter, so every
//! energy request is unsupported by construction.

use std::ffi::{c_char, CStr};
use std::sync::Arc;

use libloading::{Library, Symbol};
use log::info;

use crate::error::{Error, Result};
use crate::mask::{DeviceMask, GpuReadingKind};
use crate::reading::{Reading, Sensor, SensorLayout};
use crate::units::Kind;

const ROCM_SMI_LIB: &str = "librocm_smi64.so";
const RSMI_STATUS_SUCCESS: i32 = 0;
const ROCM_POWER_SCALE: f64 = 0.000_001; // microwatts -> watts

type InitFn = unsafe extern "C" fn(u64) -> i32;
type ShutdownFn = unsafe extern "C" fn() -> i32;
type DeviceCountFn = unsafe extern "C" fn(*mut u32) -> i32;
type PowerAveFn = unsafe extern "C" fn(u32, u32, *mut u64) -> i32;
type NameGetFn = unsafe extern "C" fn(u32, *mut c_char, usize) -> i32;
type StatusStringFn = unsafe extern "C" fn(i32, *mut *const c_char) -> i32;

/// Owns the dlopen'd handle and the init/shutdown pair. `rsmi_init` is
/// called once in [`RocmLib::load`], `rsmi_shut_down` once in `Drop`;
/// sharing the handle behind an `Arc` gives the "first reader inits, last
/// destroyed shuts down" behavior without any reference counting of our own.
struct RocmLib {
    lib: Library,
}

impl RocmLib {
    fn load() -> Result<Self> {
        let lib = unsafe { Library::new(ROCM_SMI_LIB) }
            .map_err(|e| Error::setup(format!("failed to load {ROCM_SMI_LIB}: {e}")))?;
        let status = unsafe {
            let init: Symbol<InitFn> = lib
                .get(b"rsmi_init\0")
                .map_err(|e| Error::setup(format!("missing rsmi_init symbol: {e}")))?;
            init(0)
        };
        if status != RSMI_STATUS_SUCCESS {
            return Err(Error::setup(format!(
                "failed to initialise ROCm SMI: status {status}"
            )));
        }
        Ok(RocmLib { lib })
    }

    fn status_str(&self, status: i32) -> String {
        unsafe {
            let Ok(f) = self.lib.get::<StatusStringFn>(b"rsmi_status_string\0") else {
                return format!("status {status}");
            };
            let mut ptr: *const c_char = std::ptr::null();
            if f(status, &mut ptr) != RSMI_STATUS_SUCCESS || ptr.is_null() {
                return format!("status {status}");
            }
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }

    fn device_count(&self) -> Result<u32> {
        unsafe {
            let f: Symbol<DeviceCountFn> = self
                .lib
                .get(b"rsmi_num_monitor_devices\0")
                .map_err(|e| Error::setup(format!("missing rsmi_num_monitor_devices: {e}")))?;
            let mut count = 0u32;
            let status = f(&mut count);
            if status != RSMI_STATUS_SUCCESS {
                return Err(Error::setup(format!(
                    "failed to obtain device count: {}",
                    self.status_str(status)
                )));
            }
            Ok(count)
        }
    }

    fn device_name(&self, index: u32) -> Option<String> {
        unsafe {
            let f: Symbol<NameGetFn> = self.lib.get(b"rsmi_dev_name_get\0").ok()?;
            let mut buf = vec![0i8; 512];
            let status = f(index, buf.as_mut_ptr() as *mut c_char, buf.len());
            if status != RSMI_STATUS_SUCCESS {
                return None;
            }
            Some(CStr::from_ptr(buf.as_ptr() as *const c_char).to_string_lossy().into_owned())
        }
    }

    fn power_ave(&self, index: u32) -> Result<u64> {
        unsafe {
            let f: Symbol<PowerAveFn> = self
                .lib
                .get(b"rsmi_dev_power_ave_get\0")
                .map_err(|e| Error::read(format!("missing rsmi_dev_power_ave_get: {e}")))?;
            let mut power = 0u64;
            let status = f(index, 0, &mut power);
            if status != RSMI_STATUS_SUCCESS {
                return Err(Error::read(self.status_str(status)));
            }
            Ok(power)
        }
    }
}

impl Drop for RocmLib {
    fn drop(&mut self) {
        unsafe {
            if let Ok(f) = self.lib.get::<ShutdownFn>(b"rsmi_shut_down\0") {
                let _: i32 = f();
            }
        }
    }
}

// Library is Send/Sync in practice (ROCm SMI's own handle is process-global);
// libloading's Library itself already implements both.
unsafe impl Send for RocmLib {}
unsafe impl Sync for RocmLib {}

pub struct RocmReader {
    lib: Arc<RocmLib>,
    devices: Vec<u32>,
    layout: SensorLayout,
}

impl RocmReader {
    pub fn new(device_mask: DeviceMask, kind: GpuReadingKind) -> Result<Self> {
        if device_mask.bits() == 0 {
            return Err(Error::setup("no devices set in mask"));
        }
        if !kind.contains(GpuReadingKind::POWER) {
            return Err(Error::setup(
                "ROCm SMI only supports power readings, energy was requested",
            ));
        }
        let lib = RocmLib::load()?;
        let count = lib.device_count()?;

        let mut layout = SensorLayout::new(0, count as usize);
        let mut devices = Vec::new();
        for index in 0..count {
            if !device_mask.contains_device(index) {
                continue;
            }
            if let Some(name) = lib.device_name(index) {
                info!("device: {index}, name: {name}");
            }
            if lib.power_ave(index).is_ok() {
                layout.set_scale(
                    Sensor::Gpu { device: index, kind: Kind::Power },
                    ROCM_POWER_SCALE,
                    Kind::Power,
                );
                devices.push(index);
            }
        }
        if devices.is_empty() {
            return Err(Error::setup("no GPU events were added"));
        }

        Ok(RocmReader {
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
        for &index in &self.devices {
            let power = self.lib.power_ave(index)?;
            reading.set(
                &self.layout,
                Sensor::Gpu { device: index, kind: Kind::Power },
                power as f64,
            );
        }
        reading.set_timestamp_now();
        Ok(reading)
    }
}

impl Clone for RocmReader {
    fn clone(&self) -> Self {
        RocmReader {
            lib: Arc::clone(&self.lib),
            devices: self.devices.clone(),
            layout: self.layout.clone(),
        }
    }
}

impl crate::reader_trait::EnergyReader for RocmReader {
    fn layout(&self) -> &SensorLayout {
        self.layout()
    }

    fn read(&mut self) -> Result<Reading> {
        RocmReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}

