//! Capture device enumeration and selection.
//!
//! Devices are addressed by a stable integer index (the position in the
//! enumeration order), persisted in `networkSettings.json` as
//! `selectedAdapter`; `"auto"` asks libpcap for its default device.

use serde::Serialize;

use crate::CaptureError;

/// One row of `--list-devices` output; also serialized for UI consumers.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub description: Option<String>,
}

/// How the operator picked a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    #[default]
    Auto,
    Index(usize),
}

impl std::str::FromStr for DeviceSelection {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            s.parse().map(Self::Index)
        }
    }
}

pub fn list_devices() -> Result<Vec<DeviceInfo>, CaptureError> {
    let devices = pcap::Device::list()?;
    Ok(devices
        .into_iter()
        .enumerate()
        .map(|(index, device)| DeviceInfo {
            index,
            name: device.name,
            description: device.desc,
        })
        .collect())
}

/// Resolve a selection to a concrete pcap device.
pub fn resolve_device(selection: DeviceSelection) -> Result<pcap::Device, CaptureError> {
    match selection {
        DeviceSelection::Auto => pcap::Device::lookup()?.ok_or(CaptureError::NoDevice),
        DeviceSelection::Index(index) => {
            let mut devices = pcap::Device::list()?;
            if index >= devices.len() {
                return Err(CaptureError::BadIndex(index));
            }
            Ok(devices.swap_remove(index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parses_auto_and_indices() {
        assert_eq!("auto".parse::<DeviceSelection>().unwrap(), DeviceSelection::Auto);
        assert_eq!("AUTO".parse::<DeviceSelection>().unwrap(), DeviceSelection::Auto);
        assert_eq!("3".parse::<DeviceSelection>().unwrap(), DeviceSelection::Index(3));
        assert!("ethX".parse::<DeviceSelection>().is_err());
    }
}
