//! Status words exposed through the device register file.

use bitfield::bitfield;

bitfield! {
    /// STATUS - Block device controller status register
    ///
    /// Read-only from the guest. BUSY is only ever set inside a single
    /// COMMAND write, so a guest never observes it.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BlockStatus(u32);

    // Bits [31:3] - Reserved, RES0

    /// Bit [2] - A successful transfer is waiting to be acknowledged
    pub interrupt_pending, set_interrupt_pending: 2;

    /// Bit [1] - A failed or rejected command is waiting to be acknowledged
    pub error, set_error: 1;

    /// Bit [0] - A transfer is in progress
    pub busy, set_busy: 0;
}

impl BlockStatus {
    /// Create a status word with all bits cleared
    pub const fn new() -> Self {
        Self(0)
    }

    /// Create a status word from a raw u32 value
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Get raw u32 value
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl Default for BlockStatus {
    fn default() -> Self {
        Self::new()
    }
}

bitfield! {
    /// KEY_STATUS - Keyboard status register
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct KeyStatus(u32);

    // Bits [31:1] - Reserved, RES0

    /// Bit [0] - At least one scan code is queued
    pub data_available, set_data_available: 0;
}

impl KeyStatus {
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl Default for KeyStatus {
    fn default() -> Self {
        Self::new()
    }
}
