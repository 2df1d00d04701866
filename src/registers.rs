//! Vendor register table and the physical-memory reader behind it.
//!
//! Junction and VRAM temperatures are not exposed by NVML. They are read from
//! BAR0 of the card through `/dev/mem`: one page is mapped read-only around
//! the register, a single 32-bit value is loaded and the mapping is dropped
//! again before the call returns.

use crate::error::ProbeError;
use memmap2::{Mmap, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extracts `(raw >> shift) & mask` and divides it by `divisor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeRule {
    pub shift: u32,
    pub mask: u32,
    pub divisor: u32,
}

impl DecodeRule {
    pub const fn apply(&self, raw: u32) -> u32 {
        ((raw >> self.shift) & self.mask) / self.divisor
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Register {
    pub name: &'static str,
    /// Byte offset from the start of BAR0.
    pub offset: u64,
    pub rule: DecodeRule,
}

/// Hotspot (junction) temperature: bits 15..8, whole degrees.
pub const HOTSPOT: Register = Register {
    name: "hotspot",
    offset: 0x0002_046C,
    rule: DecodeRule {
        shift: 8,
        mask: 0xff,
        divisor: 1,
    },
};

/// VRAM temperature: bits 11..0 in 1/32 °C steps.
pub const VRAM: Register = Register {
    name: "vram",
    offset: 0x0000_E2A8,
    rule: DecodeRule {
        shift: 0,
        mask: 0x0fff,
        divisor: 32,
    },
};

pub trait RegisterReader {
    /// Read `register` relative to `base_address` and return it calibrated in °C.
    fn read(&self, base_address: u64, register: &Register) -> Result<u32, ProbeError>;
}

pub struct DevMemReader {
    path: PathBuf,
}

impl DevMemReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RegisterReader for DevMemReader {
    fn read(&self, base_address: u64, register: &Register) -> Result<u32, ProbeError> {
        let target = base_address.checked_add(register.offset).ok_or_else(|| {
            ProbeError::io(
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "register address overflows"),
            )
        })?;

        let window = RegisterWindow::map(&self.path, target, page_size())?;
        let raw = window.read_u32()?;
        let value = register.rule.apply(raw);
        debug!(
            "{} register at {target:#x}: raw {raw:#010x} -> {value}°C",
            register.name
        );
        Ok(value)
    }
}

// One mapped page. Unmapped and closed when dropped.
struct RegisterWindow<'a> {
    path: &'a Path,
    map: Mmap,
    offset: usize,
    _file: File,
}

impl<'a> RegisterWindow<'a> {
    fn map(path: &'a Path, target: u64, page_size: u64) -> Result<Self, ProbeError> {
        let window_start = target & !(page_size - 1);
        let offset = (target - window_start) as usize;

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .map_err(|err| ProbeError::io(path, err))?;

        // SAFETY: the mapping is read-only, private to this window and never
        // handed out; it is dropped before the window is.
        let map = unsafe {
            MmapOptions::new()
                .offset(window_start)
                .len(page_size as usize)
                .map(&file)
        }
        .map_err(|err| ProbeError::io(path, err))?;

        Ok(Self {
            path,
            map,
            offset,
            _file: file,
        })
    }

    fn read_u32(&self) -> Result<u32, ProbeError> {
        let end = self.offset + std::mem::size_of::<u32>();
        if self.offset % std::mem::align_of::<u32>() != 0 || end > self.map.len() {
            return Err(ProbeError::io(
                self.path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("register offset {:#x} is not a readable word", self.offset),
                ),
            ));
        }

        // SAFETY: in bounds and 4-byte aligned inside a page-aligned mapping.
        let raw = unsafe { std::ptr::read_volatile(self.map.as_ptr().add(self.offset).cast::<u32>()) };
        Ok(raw)
    }
}

fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

/// Raw physical memory is only readable by root.
pub fn ensure_privileged() -> Result<(), ProbeError> {
    // SAFETY: geteuid cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        return Err(ProbeError::Privilege);
    }
    Ok(())
}
