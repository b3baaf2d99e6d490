use crate::devices::register::{Register, RoRegister};
use crate::devices::{MmioDevice, SENTINEL};
use crate::err::DeviceError;
use crate::regs::KeyStatus;
use std::collections::VecDeque;

/// Keyboard register offsets
pub const KEY_STATUS: u64 = 0x00; // Key Status Register
pub const KEY_DATA: u64 = 0x04; // Key Data Register (read pops)

pub const DEFAULT_KEY_CAPACITY: usize = 16;

/// Bounded scan-code FIFO.
///
/// Like a real keyboard controller buffer, it never stalls the producer: once
/// full, each new scan code pushes out the oldest queued one.
pub struct KeyboardQueue {
    entries: VecDeque<u32>,
    capacity: usize,
    status: RoRegister,
    dropped: u64,
}

impl Default for KeyboardQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_KEY_CAPACITY)
    }
}

impl KeyboardQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut queue = Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            status: RoRegister::new(0),
            dropped: 0,
        };
        queue.update_status();
        queue
    }

    /// Queue a scan code, dropping the oldest one when full
    pub fn inject(&mut self, scan_code: u32) {
        if self.entries.len() == self.capacity {
            if let Some(lost) = self.entries.pop_front() {
                self.dropped += 1;
                log::debug!("Keyboard queue full, dropped scan code {lost:#x}");
            }
        }
        self.entries.push_back(scan_code);
        self.update_status();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Scan codes lost to overflow since the last reset
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn update_status(&mut self) {
        let mut status = KeyStatus::new();
        status.set_data_available(!self.entries.is_empty());
        self.status.set_value(status.raw());
    }

    fn pop(&mut self) -> u32 {
        let code = self.entries.pop_front().unwrap_or(SENTINEL);
        self.update_status();
        code
    }
}

impl MmioDevice for KeyboardQueue {
    fn read(&mut self, offset: u64) -> Result<u32, DeviceError> {
        let value = match offset {
            KEY_STATUS => self.status.read(),
            KEY_DATA => self.pop(),
            _ => SENTINEL,
        };
        Ok(value)
    }

    fn write(&mut self, _offset: u64, _value: u32) -> Result<(), DeviceError> {
        // Both registers are read-only
        Ok(())
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.dropped = 0;
        self.update_status();
    }

    fn get_size(&self) -> u64 {
        8 // KEY_STATUS, KEY_DATA
    }

    fn interrupt_pending(&self) -> bool {
        !self.entries.is_empty()
    }
}
