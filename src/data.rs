use serde::Serialize;
use std::fmt;

// PCI identity tuple. NVML and the bus scan report it independently, so the
// two are compared field by field rather than assumed to line up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PciIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub domain: u32,
    pub bus: u32,
    pub slot: u32,
}

impl PciIdentity {
    /// Splits NVML's combined id: device id in the high half, vendor id in the low half.
    pub fn from_combined_id(combined: u32, domain: u32, bus: u32, slot: u32) -> Self {
        Self {
            vendor_id: (combined & 0xffff) as u16,
            device_id: (combined >> 16) as u16,
            domain,
            bus,
            slot,
        }
    }
}

impl fmt::Display for PciIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x} [{:04x}:{:04x}]",
            self.domain, self.bus, self.slot, self.vendor_id, self.device_id
        )
    }
}

/// Identity of a logical device as reported by the vendor API.
pub type LogicalDeviceIdentity = PciIdentity;

// One physical device from the bus scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalDeviceDescriptor {
    pub identity: PciIdentity,
    pub function: u32,
    pub base_address: u64,
}

// Temperatures of one GPU for one cycle, all in whole °C
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GpuReading {
    pub index: u32,
    pub core: u32,
    pub junction: u32,
    pub vram: u32,
}

/// One complete round of readings, ordered by logical device index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamplingCycle {
    readings: Vec<GpuReading>,
}

impl SamplingCycle {
    pub fn new(readings: Vec<GpuReading>) -> Self {
        Self { readings }
    }

    pub fn readings(&self) -> &[GpuReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }
}
