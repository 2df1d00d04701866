//! Fakes shared by the unit tests.

use crate::cancel::CancellationToken;
use crate::data::{PciIdentity, PhysicalDeviceDescriptor};
use crate::error::ProbeError;
use crate::monitor::{TelemetrySampler, TelemetrySource};
use crate::pci::BusSnapshot;
use crate::registers::{Register, RegisterReader, HOTSPOT, VRAM};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::io;

pub fn identity(device_id: u16, bus: u32) -> PciIdentity {
    PciIdentity {
        vendor_id: 0x10de,
        device_id,
        domain: 0,
        bus,
        slot: 0,
    }
}

pub fn descriptor(identity: PciIdentity, base_address: u64) -> PhysicalDeviceDescriptor {
    PhysicalDeviceDescriptor {
        identity,
        function: 0,
        base_address,
    }
}

pub struct FakeGpu {
    pub core: u32,
    pub identity: PciIdentity,
    pub core_fails: bool,
}

impl FakeGpu {
    pub fn new(core: u32, device_id: u16, bus: u32) -> Self {
        Self {
            core,
            identity: identity(device_id, bus),
            core_fails: false,
        }
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub gpus: Vec<FakeGpu>,
    /// Cancels the token on the n-th core temperature query (1-based).
    pub cancel_on_query: Option<(u32, CancellationToken)>,
    queries: Cell<u32>,
}

impl TelemetrySource for FakeSource {
    type Handle<'a> = usize;

    fn device_count(&self) -> Result<u32, ProbeError> {
        Ok(self.gpus.len() as u32)
    }

    fn handle(&self, index: u32) -> Result<usize, ProbeError> {
        let index = index as usize;
        if index < self.gpus.len() {
            Ok(index)
        } else {
            Err(ProbeError::query(index as u32, "no such device"))
        }
    }

    fn core_temperature(&self, index: u32, handle: &usize) -> Result<u32, ProbeError> {
        let queries = self.queries.get() + 1;
        self.queries.set(queries);
        if let Some((at, token)) = &self.cancel_on_query {
            if *at == queries {
                token.cancel();
            }
        }

        let gpu = &self.gpus[*handle];
        if gpu.core_fails {
            return Err(ProbeError::query(index, "temperature unavailable"));
        }
        Ok(gpu.core)
    }

    fn pci_identity(&self, _index: u32, handle: &usize) -> Result<PciIdentity, ProbeError> {
        Ok(self.gpus[*handle].identity)
    }
}

#[derive(Default)]
pub struct FakeRegisters {
    raw: HashMap<(u64, u64), u32>,
    failing: HashSet<u64>,
}

impl FakeRegisters {
    pub fn set(&mut self, base_address: u64, register: &Register, raw: u32) {
        self.raw.insert((base_address, register.offset), raw);
    }

    pub fn fail_at(&mut self, base_address: u64) {
        self.failing.insert(base_address);
    }
}

impl RegisterReader for FakeRegisters {
    fn read(&self, base_address: u64, register: &Register) -> Result<u32, ProbeError> {
        if self.failing.contains(&base_address) {
            return Err(ProbeError::io(
                "/dev/mem",
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        self.raw
            .get(&(base_address, register.offset))
            .map(|raw| register.rule.apply(*raw))
            .ok_or_else(|| ProbeError::io("/dev/mem", io::Error::from(io::ErrorKind::NotFound)))
    }
}

/// Two GPUs: core 55/91, junction 60/97, vram 50/90.
pub fn two_gpu_parts() -> (FakeSource, BusSnapshot, FakeRegisters) {
    let source = FakeSource {
        gpus: vec![FakeGpu::new(55, 0x2204, 1), FakeGpu::new(91, 0x2204, 2)],
        ..Default::default()
    };
    let snapshot = BusSnapshot::new(vec![
        descriptor(identity(0x1aef, 1), 0xf000_0000),
        descriptor(identity(0x2204, 1), 0xf100_0000),
        descriptor(identity(0x2204, 2), 0xf200_0000),
    ]);

    let mut registers = FakeRegisters::default();
    registers.set(0xf100_0000, &HOTSPOT, 60 << 8);
    registers.set(0xf100_0000, &VRAM, 50 * 32 + 31);
    registers.set(0xf200_0000, &HOTSPOT, 0xffff_0000 | (97 << 8));
    registers.set(0xf200_0000, &VRAM, 90 * 32);

    (source, snapshot, registers)
}

pub fn two_gpu_rig() -> TelemetrySampler<FakeSource, FakeRegisters> {
    let (source, snapshot, registers) = two_gpu_parts();
    TelemetrySampler::new(source, snapshot, registers).unwrap()
}
