use crate::cli::Cli;
use std::path::PathBuf;
use std::time::Duration;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEV_MEM_PATH: &str = "/dev/mem";
pub const PCI_DEVICES_PATH: &str = "/sys/bus/pci/devices";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    Once,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub format: OutputFormat,
    pub mode: RunMode,
    pub refresh_interval: Duration,
    pub mem_path: PathBuf,
    pub pci_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: OutputFormat::Table,
            mode: RunMode::Continuous,
            refresh_interval: REFRESH_INTERVAL,
            mem_path: PathBuf::from(DEV_MEM_PATH),
            pci_root: PathBuf::from(PCI_DEVICES_PATH),
        }
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            format: if cli.json {
                OutputFormat::Json
            } else {
                OutputFormat::Table
            },
            mode: if cli.once {
                RunMode::Once
            } else {
                RunMode::Continuous
            },
            ..Self::default()
        }
    }
}
