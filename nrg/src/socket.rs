//! CPU socket topology enumeration: parses Linux cpulist syntax
//! (`"0,64"`, `"0-3"`, `"0-1,64-66"`) and reads each online CPU's
//! `topology/physical_package_id` to determine the socket count.

use std::collections::BTreeSet;
use std::fs;
use std::num::ParseIntError;

use crate::error::{Error, Result};

fn parse_cpulist_item(item: &str) -> Result<Vec<u32>> {
    let bounds: Vec<u32> = item
        .split('-')
        .map(str::parse)
        .collect::<std::result::Result<Vec<u32>, ParseIntError>>()
        .map_err(|e| Error::format(format!("invalid cpulist item '{item}': {e}")))?;
    match bounds.as_slice() {
        [start, end] => Ok((*start..=*end).collect()),
        [n] => Ok(vec![*n]),
        _ => Err(Error::format(format!("invalid cpulist item '{item}'"))),
    }
}

fn parse_cpu_list(cpulist: &str) -> Result<Vec<u32>> {
    cpulist
        .trim_end()
        .split(',')
        .map(parse_cpulist_item)
        .collect::<Result<Vec<Vec<u32>>>>()
        .map(|v| v.into_iter().flatten().collect())
}

pub fn online_cpus() -> Result<Vec<u32>> {
    let list = fs::read_to_string("/sys/devices/system/cpu/online")?;
    parse_cpu_list(&list)
}

fn physical_package_id(cpu: u32) -> Result<u32> {
    let path = format!("/sys/devices/system/cpu/cpu{cpu}/topology/physical_package_id");
    let raw = fs::read_to_string(&path)?;
    raw.trim_end()
        .parse()
        .map_err(|e| Error::format(format!("bad physical_package_id at {path}: {e}")))
}

/// Distinct socket ids across every online CPU, ascending.
pub fn discover_sockets() -> Result<Vec<u32>> {
    let mut sockets = BTreeSet::new();
    for cpu in online_cpus()? {
        sockets.insert(physical_package_id(cpu)?);
    }
    if sockets.is_empty() {
        return Err(Error::setup("no online CPUs found"));
    }
    Ok(sockets.into_iter().collect())
}

pub fn socket_count() -> Result<usize> {
    Ok(discover_sockets()?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_ranged_cpulist() {
        assert_eq!(parse_cpu_list("0").unwrap(), vec![0]);
        assert_eq!(parse_cpu_list("0,64").unwrap(), vec![0, 64]);
        assert_eq!(parse_cpu_list("0-3").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0-1,64-66").unwrap(), vec![0, 1, 64, 65, 66]);
    }

    #[test]
    fn rejects_malformed_item() {
        assert!(parse_cpu_list("0-1-2").is_err());
    }
}
