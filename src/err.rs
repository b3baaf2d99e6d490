use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("General error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to open block device backing file {}: {source}", .path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Block device I/O failure: {0}")]
    IoFailure(#[from] io::Error),

    #[error("Out of range: {what} 0x{index:x} (limit 0x{limit:x})")]
    OutOfRange {
        what: &'static str,
        index: u64,
        limit: u64,
    },

    #[error("Device busy: command rejected while an operation is in flight")]
    DeviceBusy,

    #[error(
        "Overlapping MMIO region: new region [0x{new_start:08x}, 0x{new_end:08x}) overlaps with existing region [0x{existing_start:08x}, 0x{existing_end:08x})"
    )]
    OverlappingRegion {
        existing_start: u64,
        existing_end: u64,
        new_start: u64,
        new_end: u64,
    },
}

impl DeviceError {
    pub fn open_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::OpenFailed {
            path: path.into(),
            source,
        }
    }

    pub fn out_of_range(what: &'static str, index: u64, limit: u64) -> Self {
        Self::OutOfRange { what, index, limit }
    }

    pub fn closed_store() -> Self {
        Self::IoFailure(io::Error::new(
            io::ErrorKind::NotConnected,
            "backing store is not open",
        ))
    }

    pub fn overlapping_region(existing: (u64, u64), new: (u64, u64)) -> Self {
        Self::OverlappingRegion {
            existing_start: existing.0,
            existing_end: existing.1,
            new_start: new.0,
            new_end: new.1,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("line {line}: unknown directive '{directive}'")]
    UnknownDirective { line: usize, directive: String },

    #[error("line {line}: expected {expected} operand(s), found {found}")]
    OperandCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid number '{text}'")]
    InvalidNumber { line: usize, text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DeviceError::out_of_range("data pointer", 0x200, 0x200);
        assert!(err.to_string().contains("data pointer"));
        assert!(err.to_string().contains("0x200"));

        let err = DeviceError::overlapping_region((0x10, 0x20), (0x18, 0x28));
        assert!(err.to_string().contains("0x00000018"));

        let err = DeviceError::open_failed(
            "/nonexistent/disk.img",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.to_string().contains("/nonexistent/disk.img"));
    }

    #[test]
    fn test_sim_error_from_device_error() {
        let err: SimError = DeviceError::DeviceBusy.into();
        assert!(matches!(err, SimError::Device(DeviceError::DeviceBusy)));
        assert!(err.to_string().contains("busy"));
    }
}
