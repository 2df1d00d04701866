use crate::data::{GpuReading, LogicalDeviceIdentity, PciIdentity, SamplingCycle};
use crate::error::ProbeError;
use crate::pci::BusSnapshot;
use crate::registers::{RegisterReader, HOTSPOT, VRAM};
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::{Device, Nvml};
use tracing::{debug, info};

/// Logical device enumeration and per-device queries from the vendor API.
pub trait TelemetrySource {
    type Handle<'a>
    where
        Self: 'a;

    fn device_count(&self) -> Result<u32, ProbeError>;
    fn handle(&self, index: u32) -> Result<Self::Handle<'_>, ProbeError>;
    fn core_temperature(&self, index: u32, handle: &Self::Handle<'_>) -> Result<u32, ProbeError>;
    fn pci_identity(
        &self,
        index: u32,
        handle: &Self::Handle<'_>,
    ) -> Result<LogicalDeviceIdentity, ProbeError>;
}

// NVML is shut down when this is dropped
pub struct NvmlSource {
    nvml: Nvml,
}

impl NvmlSource {
    pub fn init() -> Result<Self, ProbeError> {
        let nvml = Nvml::init().map_err(|err| ProbeError::Init(format!("NVML: {err}")))?;
        Ok(Self { nvml })
    }
}

impl TelemetrySource for NvmlSource {
    type Handle<'a> = Device<'a>;

    fn device_count(&self) -> Result<u32, ProbeError> {
        self.nvml
            .device_count()
            .map_err(|err| ProbeError::Init(format!("failed to get device count: {err}")))
    }

    fn handle(&self, index: u32) -> Result<Device<'_>, ProbeError> {
        self.nvml
            .device_by_index(index)
            .map_err(|err| ProbeError::Init(format!("failed to get handle for GPU {index}: {err}")))
    }

    fn core_temperature(&self, index: u32, handle: &Device<'_>) -> Result<u32, ProbeError> {
        handle
            .temperature(TemperatureSensor::Gpu)
            .map_err(|err| ProbeError::query(index, format!("failed to get temperature: {err}")))
    }

    fn pci_identity(&self, index: u32, handle: &Device<'_>) -> Result<PciIdentity, ProbeError> {
        let pci = handle
            .pci_info()
            .map_err(|err| ProbeError::query(index, format!("failed to get PCI info: {err}")))?;
        Ok(PciIdentity::from_combined_id(
            pci.pci_device_id,
            pci.domain,
            pci.bus,
            pci.device,
        ))
    }
}

/// Runs one measurement cycle across every GPU.
pub struct TelemetrySampler<S, R> {
    source: S,
    snapshot: BusSnapshot,
    reader: R,
    device_count: u32,
}

impl<S: TelemetrySource, R: RegisterReader> TelemetrySampler<S, R> {
    pub fn new(source: S, snapshot: BusSnapshot, reader: R) -> Result<Self, ProbeError> {
        let device_count = source.device_count()?;
        if device_count == 0 {
            return Err(ProbeError::Init("no NVIDIA GPUs found".into()));
        }
        info!(
            "{device_count} GPU(s), {} PCI device(s) in bus snapshot",
            snapshot.devices().len()
        );
        Ok(Self {
            source,
            snapshot,
            reader,
            device_count,
        })
    }

    pub fn device_count(&self) -> u32 {
        self.device_count
    }

    /// Either every GPU yields a reading or the whole cycle fails.
    pub fn sample(&self) -> Result<SamplingCycle, ProbeError> {
        let readings = (0..self.device_count)
            .map(|index| self.sample_device(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SamplingCycle::new(readings))
    }

    fn sample_device(&self, index: u32) -> Result<GpuReading, ProbeError> {
        let handle = self.source.handle(index)?;
        let core = self.source.core_temperature(index, &handle)?;
        let identity = self.source.pci_identity(index, &handle)?;
        let base_address = self.snapshot.correlate(&identity)?;

        let junction = self.reader.read(base_address, &HOTSPOT)?;
        let vram = self.reader.read(base_address, &VRAM)?;
        debug!("GPU {index}: core {core} junction {junction} vram {vram}");

        Ok(GpuReading {
            index,
            core,
            junction,
            vram,
        })
    }
}
