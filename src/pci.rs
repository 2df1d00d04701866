//! One-time PCI bus snapshot and GPU-to-device correlation.
//!
//! The snapshot is read from sysfs once at startup and never refreshed, so
//! cards added or removed while running are not picked up.

use crate::data::{LogicalDeviceIdentity, PciIdentity, PhysicalDeviceDescriptor};
use crate::error::ProbeError;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Clone, Debug, Default)]
pub struct BusSnapshot {
    devices: Vec<PhysicalDeviceDescriptor>,
}

impl BusSnapshot {
    pub fn new(devices: Vec<PhysicalDeviceDescriptor>) -> Self {
        Self { devices }
    }

    /// Scan `root` (normally `/sys/bus/pci/devices`) into a snapshot ordered by
    /// domain, bus, slot and function.
    pub fn scan(root: &Path) -> Result<Self, ProbeError> {
        let entries = fs::read_dir(root).map_err(|err| {
            ProbeError::Init(format!("cannot scan PCI bus at {}: {err}", root.display()))
        })?;

        let mut devices = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            match read_descriptor(&entry.path(), &name) {
                Some(descriptor) => devices.push(descriptor),
                None => warn!("skipping unreadable PCI entry {name}"),
            }
        }

        devices.sort_by_key(|d| {
            (
                d.identity.domain,
                d.identity.bus,
                d.identity.slot,
                d.function,
            )
        });
        debug!("PCI bus snapshot holds {} devices", devices.len());
        Ok(Self::new(devices))
    }

    pub fn devices(&self) -> &[PhysicalDeviceDescriptor] {
        &self.devices
    }

    /// Base address of the register space of the device matching `identity`.
    ///
    /// If several entries match, the first in scan order wins; uniqueness is
    /// not verified.
    pub fn correlate(&self, identity: &LogicalDeviceIdentity) -> Result<u64, ProbeError> {
        let descriptor = self
            .devices
            .iter()
            .find(|d| d.identity == *identity)
            .ok_or(ProbeError::DeviceNotFound(*identity))?;

        debug!(
            "GPU {identity} is function {} at base {:#x}",
            descriptor.function, descriptor.base_address
        );
        Ok(descriptor.base_address)
    }
}

// "0000:01:00.0" -> (domain, bus, slot, function)
fn parse_address(name: &str) -> Option<(u32, u32, u32, u32)> {
    let (domain, rest) = name.split_once(':')?;
    let (bus, rest) = rest.split_once(':')?;
    let (slot, function) = rest.split_once('.')?;
    Some((
        u32::from_str_radix(domain, 16).ok()?,
        u32::from_str_radix(bus, 16).ok()?,
        u32::from_str_radix(slot, 16).ok()?,
        u32::from_str_radix(function, 16).ok()?,
    ))
}

fn parse_hex(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

fn read_hex_file(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok().as_deref().and_then(parse_hex)
}

// First line of `resource` is BAR0: "start end flags"
fn read_bar0(device_path: &Path) -> Option<u64> {
    let resource = fs::read_to_string(device_path.join("resource")).ok()?;
    let first = resource.lines().next()?;
    parse_hex(first.split_whitespace().next()?)
}

fn read_descriptor(device_path: &Path, name: &str) -> Option<PhysicalDeviceDescriptor> {
    let (domain, bus, slot, function) = parse_address(name)?;
    let vendor_id = u16::try_from(read_hex_file(&device_path.join("vendor"))?).ok()?;
    let device_id = u16::try_from(read_hex_file(&device_path.join("device"))?).ok()?;
    let base_address = read_bar0(device_path)?;

    Some(PhysicalDeviceDescriptor {
        identity: PciIdentity {
            vendor_id,
            device_id,
            domain,
            bus,
            slot,
        },
        function,
        base_address,
    })
}
