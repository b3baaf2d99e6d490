use std::io::{self, Write};

use crate::devices::{MmioDevice, SENTINEL};
use crate::err::DeviceError;

/// Console register offsets
pub const CONSOLE_OUT: u64 = 0x00; // Output Register (write-only)

/// Write-only character sink.
///
/// Every byte is flushed before the register write returns so program output
/// stays ordered with the simulator's own diagnostics.
pub struct ConsoleDevice {
    output: Box<dyn Write + Send>,
    written: u64,
}

impl Default for ConsoleDevice {
    fn default() -> Self {
        Self::new(io::stdout())
    }
}

impl ConsoleDevice {
    pub fn new<W>(output: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            output: Box::new(output),
            written: 0,
        }
    }

    /// Number of bytes emitted since the last reset
    pub fn written(&self) -> u64 {
        self.written
    }

    fn emit(&mut self, byte: u8) -> Result<(), DeviceError> {
        self.output.write_all(&[byte])?;
        self.output.flush()?;
        self.written += 1;
        Ok(())
    }
}

impl MmioDevice for ConsoleDevice {
    fn read(&mut self, _offset: u64) -> Result<u32, DeviceError> {
        Ok(SENTINEL)
    }

    fn write(&mut self, offset: u64, value: u32) -> Result<(), DeviceError> {
        if offset == CONSOLE_OUT {
            self.emit(value as u8)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.written = 0;
    }

    fn get_size(&self) -> u64 {
        4
    }
}
