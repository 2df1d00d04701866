use crate::data::PciIdentity;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("this program requires root privileges")]
    Privilege,
    #[error("initialization failed: {0}")]
    Init(String),
    #[error("no PCI device matches GPU {0}")]
    DeviceNotFound(PciIdentity),
    #[error("cannot access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("query failed for GPU {index}: {reason}")]
    Query { index: u32, reason: String },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl ProbeError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ProbeError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn query(index: u32, reason: impl ToString) -> Self {
        ProbeError::Query {
            index,
            reason: reason.to_string(),
        }
    }
}
