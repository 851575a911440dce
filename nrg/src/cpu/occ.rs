//! ppc64 (POWER9) On-Chip-Controller in-band sensors reader.
//!
//! Reads `/sys/firmware/opal/exports/occ_inband_sensors`, a binary export
//! of OCC firmware sensor memory, segmented 150 KiB per OCC (up to 8 OCCs).
//! All multi-byte integers in this file are big-endian.
//! There is no existing Rust crate for this format (it is IBM-firmware
//! specific and undocumented outside kernel/op-build sources), so this
//! module is a from-scratch binary parser using `byteorder` for the
//! big-endian reads, the same way the `cpu::powercap` sibling module
//! parses its own plain-text sysfs format by hand.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::fs::FileExt;

use byteorder::{BigEndian, ReadBytesExt};
use log::debug;

use crate::error::{Error, Result};
use crate::mask::{CpuSensorLocation, LocationMask, SocketMask};
use crate::reading::{Reading, Sensor, SensorLayout};
use crate::units::Kind;

const OCC_SENSORS_PATH: &str = "/sys/firmware/opal/exports/occ_inband_sensors";
const OCC_SEGMENT_SIZE: u64 = 150 * 1024;
const MAX_OCCS: u32 = 8;

const HEADER_SIZE: usize = 1024;
const NAMES_OFFSET: u64 = 0x400;
const PING_OFFSET: u64 = 0xDC00;
const PONG_OFFSET: u64 = 0x18C00;
const BUFFER_SIZE: usize = 40 * 1024;

const SENSOR_NAME_ENTRY_SIZE: usize = 48;

/// 512 MHz tick domain -> nanoseconds.
fn ticks_to_ns(ticks: u64) -> u64 {
    ticks.saturating_mul(1000) / 512
}

fn gsid_name_to_location(name: &str) -> Option<CpuSensorLocation> {
    match name {
        "PWRSYS" => Some(CpuSensorLocation::System),
        "PWRGPU" => Some(CpuSensorLocation::GpuRail),
        "PWRPROC" => Some(CpuSensorLocation::Package),
        "PWRMEM" => Some(CpuSensorLocation::Dram),
        "PWRVDD" => Some(CpuSensorLocation::Cores),
        "PWRVDN" => Some(CpuSensorLocation::Uncore),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct SensorNameEntry {
    name: String,
    unit: String,
    #[allow(dead_code)]
    gsid: u16,
    scale: f64,
    structure_version: u8,
    reading_offset: u32,
}

fn parse_scaling_factor(raw: u32) -> f64 {
    // (mantissa << 8) | int8_exponent: low byte is a signed exponent,
    // the remaining upper bits are the mantissa.
    let exponent = (raw & 0xFF) as u8 as i8;
    let mantissa = (raw >> 8) as i64;
    mantissa as f64 * 10f64.powi(exponent as i32)
}

fn parse_sensor_name_entry(buf: &[u8]) -> Result<SensorNameEntry> {
    if buf.len() < SENSOR_NAME_ENTRY_SIZE {
        return Err(Error::format("truncated OCC sensor_names_entry"));
    }
    let name = String::from_utf8_lossy(&buf[0..16])
        .trim_end_matches('\0')
        .to_owned();
    let unit = String::from_utf8_lossy(&buf[16..20])
        .trim_end_matches('\0')
        .to_owned();
    let mut rest = &buf[20..];
    let gsid = rest.read_u16::<BigEndian>().map_err(|e| Error::format(e.to_string()))?;
    let _freq = rest.read_u32::<BigEndian>().map_err(|e| Error::format(e.to_string()))?;
    let scale_raw = rest.read_u32::<BigEndian>().map_err(|e| Error::format(e.to_string()))?;
    let _kind = rest.read_u16::<BigEndian>().map_err(|e| Error::format(e.to_string()))?;
    let _location = rest.read_u16::<BigEndian>().map_err(|e| Error::format(e.to_string()))?;
    let structure_version = rest.read_u8().map_err(|e| Error::format(e.to_string()))?;
    let reading_offset = rest.read_u32::<BigEndian>().map_err(|e| Error::format(e.to_string()))?;

    Ok(SensorNameEntry {
        name,
        unit,
        gsid,
        scale: parse_scaling_factor(scale_raw),
        structure_version,
        reading_offset,
    })
}

struct OccSensor {
    entry: SensorNameEntry,
    location: CpuSensorLocation,
}

struct OccBlock {
    occ_index: u32,
    base: u64,
    sensors: Vec<OccSensor>,
}

fn read_header(file: &File, base: u64) -> Result<Option<[u8; HEADER_SIZE]>> {
    let mut header = [0u8; HEADER_SIZE];
    match file.read_exact_at(&mut header, base) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    Ok(Some(header))
}

fn parse_block(file: &File, occ_index: u32, base: u64) -> Result<Option<OccBlock>> {
    let header = match read_header(file, base)? {
        Some(h) => h,
        None => return Ok(None),
    };
    let valid = header[0];
    let header_version = header[1];
    if valid != 1 {
        return Ok(None);
    }
    if header_version != 1 {
        return Err(Error::format(format!(
            "OCC {occ_index}: unsupported header_version {header_version}"
        )));
    }
    let sensor_count = u16::from_be_bytes([header[4], header[5]]) as usize;

    let mut names_buf = vec![0u8; sensor_count * SENSOR_NAME_ENTRY_SIZE];
    file.read_exact_at(&mut names_buf, base + NAMES_OFFSET)?;

    let mut sensors = Vec::new();
    for chunk in names_buf.chunks_exact(SENSOR_NAME_ENTRY_SIZE) {
        let entry = parse_sensor_name_entry(chunk)?;
        if entry.structure_version != 1 {
            return Err(Error::format(format!(
                "OCC {occ_index}: unsupported sensor structure version {}",
                entry.structure_version
            )));
        }
        if let Some(location) = gsid_name_to_location(&entry.name) {
            sensors.push(OccSensor { entry, location });
        }
    }
    debug!(
        "OCC {occ_index}: {} of {sensor_count} sensors selected",
        sensors.len()
    );
    Ok(Some(OccBlock { occ_index, base, sensors }))
}

struct SampleRecord {
    valid: bool,
    timestamp_ticks: u64,
    raw_sample: u32,
}

fn parse_sample_record(buf: &[u8], offset: usize) -> Option<SampleRecord> {
    // valid byte, then (after padding to an 8-byte boundary) a 64-bit
    // timestamp and a scaled sample value.
    let valid_off = offset;
    let ts_off = offset + 8;
    let sample_off = offset + 16;
    if buf.len() < sample_off + 4 {
        return None;
    }
    let valid = buf[valid_off] == 1;
    let timestamp_ticks = u64::from_be_bytes(buf[ts_off..ts_off + 8].try_into().ok()?);
    let raw_sample = u32::from_be_bytes(buf[sample_off..sample_off + 4].try_into().ok()?);
    Some(SampleRecord {
        valid,
        timestamp_ticks,
        raw_sample,
    })
}

/// Reads OCC in-band power sensors (ppc64/POWER9).
pub struct OccReader {
    file: File,
    blocks: Vec<OccBlock>,
    layout: SensorLayout,
}

impl OccReader {
    pub fn new(location_mask: LocationMask, socket_mask: SocketMask) -> Result<Self> {
        if location_mask.is_empty() || socket_mask.is_empty() {
            return Err(Error::setup("empty location or socket mask"));
        }
        let file = File::open(OCC_SENSORS_PATH)?;

        let mut blocks = Vec::new();
        for occ_index in 0..MAX_OCCS {
            let base = occ_index as u64 * OCC_SEGMENT_SIZE;
            if let Some(block) = parse_block(&file, occ_index, base)? {
                blocks.push(block);
            }
        }
        if blocks.is_empty() {
            return Err(Error::setup("no valid OCC blocks found"));
        }

        // Only sockets within socket_mask get registered; a system-wide
        // sensor like PWRSYS is modeled as socket 0's System domain, so only
        // OCC 0 registers the system-power sensor on a single-socket machine.
        let mut layout = SensorLayout::new(blocks.len(), 0);
        for block in &blocks {
            let socket = block.occ_index;
            if !socket_mask.contains_socket(socket) {
                continue;
            }
            for sensor in &block.sensors {
                if !location_mask.contains_location(sensor.location) {
                    continue;
                }
                if !matches!(sensor.entry.unit.as_str(), "W" | "WATT" | "WATTS" | "watt") {
                    return Err(Error::format(format!(
                        "unrecognized OCC sensor unit '{}'",
                        sensor.entry.unit
                    )));
                }
                layout.set_scale(
                    Sensor::Cpu { socket, domain: sensor.location },
                    sensor.entry.scale,
                    Kind::Power,
                );
            }
        }

        Ok(OccReader { file, blocks, layout })
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    pub fn read(&mut self) -> Result<Reading> {
        let mut reading = self.layout.new_reading();
        for block in &self.blocks {
            let mut ping = vec![0u8; BUFFER_SIZE];
            let mut pong = vec![0u8; BUFFER_SIZE];
            self.file.seek(SeekFrom::Start(block.base + PING_OFFSET))?;
            self.file.read_exact(&mut ping)?;
            self.file.seek(SeekFrom::Start(block.base + PONG_OFFSET))?;
            self.file.read_exact(&mut pong)?;

            for sensor in &block.sensors {
                let offset = sensor.entry.reading_offset as usize;
                let ping_rec = parse_sample_record(&ping, offset);
                let pong_rec = parse_sample_record(&pong, offset);

                let chosen = match (ping_rec, pong_rec) {
                    (Some(p), Some(q)) => match (p.valid, q.valid) {
                        (true, true) => {
                            // prefer pong on a tie.
                            if p.timestamp_ticks > q.timestamp_ticks {
                                Some(p)
                            } else {
                                Some(q)
                            }
                        }
                        (true, false) => Some(p),
                        (false, true) => Some(q),
                        (false, false) => None,
                    },
                    (Some(p), None) if p.valid => Some(p),
                    (None, Some(q)) if q.valid => Some(q),
                    _ => None,
                };

                let record = chosen.ok_or_else(|| {
                    Error::read(format!(
                        "OCC {}: both ping and pong invalid for sensor '{}'",
                        block.occ_index, sensor.entry.name
                    ))
                })?;

                let sensor_key = Sensor::Cpu { socket: block.occ_index, domain: sensor.location };
                reading.set(&self.layout, sensor_key, record.raw_sample as f64);
                reading.set_sensor_time_ns(&self.layout, sensor_key, ticks_to_ns(record.timestamp_ticks));
            }
        }
        reading.set_timestamp_now();
        Ok(reading)
    }
}

impl crate::reader_trait::EnergyReader for OccReader {
    fn layout(&self) -> &SensorLayout {
        self.layout()
    }

    fn read(&mut self) -> Result<Reading> {
        OccReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}

impl Clone for OccReader {
    fn clone(&self) -> Self {
        let file = self
            .file
            .try_clone()
            .expect("duplicating an already-open OCC fd should not fail");
        OccReader {
            file,
            blocks: self
                .blocks
                .iter()
                .map(|b| OccBlock {
                    occ_index: b.occ_index,
                    base: b.base,
                    sensors: b
                        .sensors
                        .iter()
                        .map(|s| OccSensor {
                            entry: s.entry.clone(),
                            location: s.location,
                        })
                        .collect(),
                })
                .collect(),
            layout: self.layout.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_factor_decodes_mantissa_and_exponent() {
        // mantissa=1, exponent=-3 -> 1 * 10^-3 = 0.001
        let raw = (1u32 << 8) | (0xFDu32); // 0xFD as i8 is -3
        assert!((parse_scaling_factor(raw) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn ticks_convert_to_nanoseconds() {
        assert_eq!(ticks_to_ns(512), 1000);
        assert_eq!(ticks_to_ns(0), 0);
    }

    #[test]
    fn gsid_name_maps_to_canonical_locations() {
        assert_eq!(gsid_name_to_location("PWRSYS"), Some(CpuSensorLocation::System));
        assert_eq!(gsid_name_to_location("PWRGPU"), Some(CpuSensorLocation::GpuRail));
        assert_eq!(gsid_name_to_location("unknown"), None);
    }
}
