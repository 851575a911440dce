//! x86_64 RAPL energy reader, via the powercap sysfs interface.
//! See https://www.kernel.org/doc/html/latest/power/powercap/powercap.html
//!
//! Adapted from `rapl_probes::powercap`, generalized to honor a
//! `LocationMask`/`SocketMask` pair instead of reading every zone
//! unconditionally.

use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::counter::WrappingCounter;
use crate::error::{Error, Result};
use crate::mask::{CpuSensorLocation, LocationMask, SocketMask};
use crate::reading::{Reading, Sensor, SensorLayout};
use crate::units::Kind;

const POWERCAP_RAPL_PATH: &str = "/sys/class/powercap/intel-rapl";
const POWER_ZONE_PREFIX: &str = "intel-rapl";
const POWERCAP_ENERGY_UNIT: f64 = 0.000_001; // 1 microjoule

/// A power zone discovered under `POWERCAP_RAPL_PATH`.
#[derive(Debug, Clone)]
pub struct PowerZone {
    pub name: String,
    pub domain: CpuSensorLocation,
    pub path: PathBuf,
    pub socket_id: Option<u32>,
    pub children: Vec<PowerZone>,
}

impl PowerZone {
    pub fn energy_path(&self) -> PathBuf {
        self.path.join("energy_uj")
    }

    pub fn max_energy_path(&self) -> PathBuf {
        self.path.join("max_energy_range_uj")
    }
}

fn parse_zone_domain(name: &str) -> Option<CpuSensorLocation> {
    match name {
        "psys" => Some(CpuSensorLocation::System),
        "core" => Some(CpuSensorLocation::Cores),
        "uncore" => Some(CpuSensorLocation::Uncore),
        "dram" => Some(CpuSensorLocation::Dram),
        _ if name.starts_with("package-") => Some(CpuSensorLocation::Package),
        _ => None,
    }
}

/// Discovers all RAPL power zones under `root` (normally
/// [`POWERCAP_RAPL_PATH`], overridable for tests).
pub fn discover_zones(root: &Path) -> Result<Vec<PowerZone>> {
    fn explore(dir: &Path, parent_socket: Option<u32>) -> Result<Vec<PowerZone>> {
        let mut zones = Vec::new();
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(zones),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
            if !path.is_dir() || !file_name.starts_with(POWER_ZONE_PREFIX) {
                continue;
            }
            let name = fs::read_to_string(path.join("name"))?.trim().to_owned();
            let socket_id = if let Some(parent) = parent_socket {
                Some(parent)
            } else if let Some(id_str) = name.strip_prefix("package-") {
                Some(
                    id_str
                        .parse::<u32>()
                        .map_err(|e| Error::format(format!("bad package id in '{name}': {e}")))?,
                )
            } else {
                None
            };
            let domain = parse_zone_domain(&name)
                .ok_or_else(|| Error::format(format!("unknown RAPL powercap zone '{name}'")))?;
            let children = explore(&path, socket_id)?;
            zones.push(PowerZone {
                name,
                domain,
                path,
                socket_id,
                children,
            });
        }
        zones.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(zones)
    }
    explore(root, None)
}

pub fn all_power_zones() -> Result<Vec<PowerZone>> {
    discover_zones(Path::new(POWERCAP_RAPL_PATH))
}

fn flatten(zones: &[PowerZone], out: &mut Vec<PowerZone>) {
    for z in zones {
        flatten(&z.children, out);
        out.push(z.clone());
    }
}

struct OpenedZone {
    file: File,
    max: u64,
    socket: u32,
    domain: CpuSensorLocation,
    counter: WrappingCounter,
}

/// Reads RAPL energy counters through the powercap sysfs files.
/// Each clone opens its own file descriptors so that closing one copy
/// never affects another.
pub struct PowercapReader {
    zones: Vec<OpenedZone>,
    layout: SensorLayout,
}

impl PowercapReader {
    pub fn new(location_mask: LocationMask, socket_mask: SocketMask) -> Result<Self> {
        if location_mask.is_empty() || socket_mask.is_empty() {
            return Err(Error::setup("empty location or socket mask"));
        }
        let mut flat = Vec::new();
        flatten(&all_power_zones()?, &mut flat);

        let selected: Vec<&PowerZone> = flat
            .iter()
            .filter(|z| location_mask.contains_location(z.domain))
            .filter(|z| match z.socket_id {
                Some(s) => socket_mask.contains_socket(s),
                None => true, // psys has no socket
            })
            .collect();

        if selected.is_empty() {
            return Err(Error::setup(
                "no powercap zone matches the requested location/socket mask",
            ));
        }

        let max_socket = selected.iter().filter_map(|z| z.socket_id).max().unwrap_or(0);
        let mut layout = SensorLayout::new(max_socket as usize + 1, 0);

        let mut zones = Vec::with_capacity(selected.len());
        for zone in &selected {
            let file = File::open(zone.energy_path())?;
            let max_str = fs::read_to_string(zone.max_energy_path())?;
            let max: u64 = max_str
                .trim_end()
                .parse()
                .map_err(|e| Error::format(format!("bad max_energy_range_uj: {e}")))?;
            let socket = zone.socket_id.unwrap_or(0);
            layout.set_scale(
                Sensor::Cpu { socket, domain: zone.domain },
                POWERCAP_ENERGY_UNIT,
                Kind::Energy,
            );
            zones.push(OpenedZone {
                file,
                max,
                socket,
                domain: zone.domain,
                counter: WrappingCounter::new(max),
            });
        }

        debug!("powercap reader opened {} zone(s)", zones.len());
        Ok(PowercapReader { zones, layout })
    }

    pub fn layout(&self) -> &SensorLayout {
        &self.layout
    }

    pub fn read(&mut self) -> Result<Reading> {
        let mut reading = self.layout.new_reading();
        for zone in &mut self.zones {
            zone.file.seek(std::io::SeekFrom::Start(0))?;
            let mut buf = String::new();
            zone.file.read_to_string(&mut buf)?;
            let raw: u64 = buf
                .trim_end()
                .parse()
                .map_err(|e| Error::read(format!("bad energy_uj content: {e}")))?;
            let reported = zone.counter.observe(raw);
            reading.set(
                &self.layout,
                Sensor::Cpu { socket: zone.socket, domain: zone.domain },
                reported as f64,
            );
        }
        reading.set_timestamp_now();
        Ok(reading)
    }
}

impl Clone for PowercapReader {
    fn clone(&self) -> Self {
        let mut zones = Vec::with_capacity(self.zones.len());
        for z in &self.zones {
            let file = z
                .file
                .try_clone()
                .expect("duplicating an already-open powercap fd should not fail");
            zones.push(OpenedZone {
                file,
                max: z.max,
                socket: z.socket,
                domain: z.domain,
                counter: WrappingCounter::new(z.max),
            });
        }
        PowercapReader {
            zones,
            layout: self.layout.clone(),
        }
    }
}

impl crate::reader_trait::EnergyReader for PowercapReader {
    fn layout(&self) -> &SensorLayout {
        self.layout()
    }

    fn read(&mut self) -> Result<Reading> {
        PowercapReader::read(self)
    }

    fn boxed_clone(&self) -> Box<dyn crate::reader_trait::EnergyReader> {
        Box::new(self.clone())
    }
}

/// Cross-checks the discovered powercap domains against the expected
/// number of sockets (§2 "supplemented features" of SPEC_FULL.md) and
/// warns (does not fail) on a mismatch.
pub fn warn_on_domain_inconsistency(zones: &[PowerZone], expected_sockets: usize) {
    let sockets: std::collections::HashSet<u32> = zones.iter().filter_map(|z| z.socket_id).collect();
    if sockets.len() != expected_sockets {
        warn!(
            "powercap reports {} socket(s) but {} were expected from cpu topology",
            sockets.len(),
            expected_sockets
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File as StdFile;
    use std::io::Write;

    fn write_zone(root: &Path, name_on_disk: &str, zone_name: &str, energy: u64, max: u64) {
        let dir = root.join(name_on_disk);
        fs::create_dir_all(&dir).unwrap();
        StdFile::create(dir.join("name"))
            .unwrap()
            .write_all(zone_name.as_bytes())
            .unwrap();
        StdFile::create(dir.join("energy_uj"))
            .unwrap()
            .write_all(energy.to_string().as_bytes())
            .unwrap();
        StdFile::create(dir.join("max_energy_range_uj"))
            .unwrap()
            .write_all(max.to_string().as_bytes())
            .unwrap();
    }

    #[test]
    fn discovers_package_and_dram_zones() {
        let tmp = tempfile::tempdir().unwrap();
        write_zone(tmp.path(), "intel-rapl:0", "package-0", 1000, 1_000_000);
        write_zone(
            tmp.path(),
            "intel-rapl:0/intel-rapl:0:0",
            "dram",
            500,
            1_000_000,
        );

        let zones = discover_zones(tmp.path()).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].domain, CpuSensorLocation::Package);
        assert_eq!(zones[0].children.len(), 1);
        assert_eq!(zones[0].children[0].domain, CpuSensorLocation::Dram);
    }

    #[test]
    fn unknown_zone_name_is_a_format_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_zone(tmp.path(), "intel-rapl:0", "mystery-zone", 0, 1);
        let err = discover_zones(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }
}
