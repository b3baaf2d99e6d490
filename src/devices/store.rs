//! Host file backing the emulated block device.
//!
//! The file is a flat sequence of 512-byte sectors with no header: sector `i`
//! occupies bytes `[i * 512, i * 512 + 512)`. Nothing else is ever written.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::err::DeviceError;

pub const SECTOR_SIZE: usize = 512;

pub type Sector = [u8; SECTOR_SIZE];

/// Sector-granular medium driven by the block device controller.
pub trait SectorStore {
    fn read_sector(&mut self, index: u32) -> Result<Sector, DeviceError>;
    fn write_sector(&mut self, index: u32, data: &Sector) -> Result<(), DeviceError>;

    /// Flush and release the medium. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), DeviceError>;

    /// Whether the medium is still completing an earlier operation.
    fn in_flight(&self) -> bool {
        false
    }

    /// Human readable name for logs and the monitor.
    fn describe(&self) -> String;
}

#[derive(Debug)]
pub struct BackingStore {
    path: PathBuf,
    file: Option<File>,
    auto_extend: bool,
}

impl BackingStore {
    /// Opens (creating if needed) `path` for binary read/write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        Self::open_with(path, false)
    }

    /// Like [`BackingStore::open`], but reads past the end of the file grow it
    /// with zeroes instead of failing.
    pub fn open_with(path: impl AsRef<Path>, auto_extend: bool) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DeviceError::open_failed(&path, e))?;

        log::info!("Opened backing store {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
            auto_extend,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn file(&mut self) -> Result<&mut File, DeviceError> {
        self.file.as_mut().ok_or_else(DeviceError::closed_store)
    }
}

fn sector_offset(index: u32) -> u64 {
    u64::from(index) * SECTOR_SIZE as u64
}

impl SectorStore for BackingStore {
    fn read_sector(&mut self, index: u32) -> Result<Sector, DeviceError> {
        let auto_extend = self.auto_extend;
        let file = self.file()?;
        let offset = sector_offset(index);
        let len = file.metadata()?.len();

        if offset >= len {
            if !auto_extend {
                return Err(DeviceError::out_of_range(
                    "sector",
                    u64::from(index),
                    len / SECTOR_SIZE as u64,
                ));
            }
            file.set_len(offset + SECTOR_SIZE as u64)?;
            log::debug!("Extended backing store to {} bytes", offset + SECTOR_SIZE as u64);
            return Ok([0; SECTOR_SIZE]);
        }

        let mut sector = [0; SECTOR_SIZE];
        file.seek(SeekFrom::Start(offset))?;
        // A trailing partial sector is a short read
        file.read_exact(&mut sector)?;
        Ok(sector)
    }

    fn write_sector(&mut self, index: u32, data: &Sector) -> Result<(), DeviceError> {
        let file = self.file()?;
        let offset = sector_offset(index);
        let len = file.metadata()?.len();
        if offset > len {
            file.set_len(offset)?;
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_data()?;
            log::info!("Closed backing store {}", self.path.display());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close backing store {}: {e}", self.path.display());
        }
    }
}
