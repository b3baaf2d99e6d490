//! Register-mapped block device controller.
//!
//! The guest selects a sector through SECTOR, stages or drains a 512-byte
//! buffer one word at a time through DATA, and starts transfers by writing
//! COMMAND. Transfers complete synchronously inside the COMMAND write; the
//! guest still sees the usual completion protocol: INTERRUPT_PENDING (or
//! ERROR) is raised and stays raised until acknowledged with ACK_INTERRUPT.
//!
//! Every finished or rejected command queues one completion, and each
//! ACK_INTERRUPT retires exactly the oldest one. INTERRUPT_PENDING reflects
//! queued successes, ERROR queued failures. The data pointer only rewinds when
//! a command is dispatched.

use std::collections::VecDeque;

use crate::devices::register::{Register, RwRegister};
use crate::devices::store::{BackingStore, SECTOR_SIZE, Sector, SectorStore};
use crate::devices::{MmioDevice, SENTINEL, WORD_SIZE};
use crate::err::DeviceError;
use crate::regs::BlockStatus;

/// Block controller register offsets
pub const BLK_STATUS: u64 = 0x0; // Status Register (read-only)
pub const BLK_COMMAND: u64 = 0x4; // Command Register (write-only)
pub const BLK_SECTOR: u64 = 0x8; // Sector Select Register
pub const BLK_DATA: u64 = 0xC; // Data Port

/// Command codes accepted by BLK_COMMAND
pub const CMD_READ_SECTOR: u32 = 1;
pub const CMD_WRITE_SECTOR: u32 = 2;
pub const CMD_ACK_INTERRUPT: u32 = 3;

const WORD: usize = WORD_SIZE as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    ReadSector,
    WriteSector,
    AckInterrupt,
}

impl TryFrom<u32> for Command {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            CMD_READ_SECTOR => Ok(Command::ReadSector),
            CMD_WRITE_SECTOR => Ok(Command::WriteSector),
            CMD_ACK_INTERRUPT => Ok(Command::AckInterrupt),
            other => Err(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Completion {
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug)]
enum Transfer {
    Read,
    Write,
}

pub struct BlockDeviceController<S: SectorStore = BackingStore> {
    store: Option<S>,
    status: BlockStatus,
    sector: RwRegister,
    /// Byte offset of the next data port access. Equal to SECTOR_SIZE once the
    /// buffer has been fully drained.
    data_pointer: usize,
    buffer: Sector,
    /// Finished or rejected commands not yet acknowledged, oldest first.
    completions: VecDeque<Completion>,
}

impl<S: SectorStore> Default for BlockDeviceController<S> {
    fn default() -> Self {
        Self {
            store: None,
            status: BlockStatus::new(),
            sector: RwRegister::new(0),
            data_pointer: 0,
            buffer: [0; SECTOR_SIZE],
            completions: VecDeque::new(),
        }
    }
}

impl<S: SectorStore> BlockDeviceController<S> {
    /// Attach a medium, resetting the controller. Any previously attached
    /// medium is closed first.
    pub fn attach(&mut self, store: S) {
        self.detach();
        log::info!("Block device attached to {}", store.describe());
        self.store = Some(store);
        self.reset();
    }

    /// Flush and release the medium. Does nothing when nothing is attached.
    pub fn detach(&mut self) {
        if let Some(mut store) = self.store.take() {
            if let Err(e) = store.close() {
                log::warn!("Failed to flush {} on detach: {e}", store.describe());
            }
            log::info!("Block device detached from {}", store.describe());
        }
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn sector_index(&self) -> u32 {
        self.sector.read()
    }

    pub fn data_pointer(&self) -> usize {
        self.data_pointer
    }

    /// Commands still waiting for an ACK_INTERRUPT
    pub fn pending_completions(&self) -> usize {
        self.completions.len()
    }

    fn is_busy(&self) -> bool {
        self.status.busy() || self.store.as_ref().is_some_and(|store| store.in_flight())
    }

    fn dispatch(&mut self, value: u32) -> Result<(), DeviceError> {
        match Command::try_from(value) {
            Ok(Command::ReadSector) => self.transfer(Transfer::Read),
            Ok(Command::WriteSector) => self.transfer(Transfer::Write),
            Ok(Command::AckInterrupt) => {
                self.acknowledge();
                Ok(())
            }
            Err(code) => {
                log::warn!("Ignoring unknown block device command {code:#x}");
                Ok(())
            }
        }
    }

    fn transfer(&mut self, transfer: Transfer) -> Result<(), DeviceError> {
        if self.is_busy() {
            self.complete(Completion::Failed);
            return Err(DeviceError::DeviceBusy);
        }

        self.status.set_busy(true);
        self.data_pointer = 0;
        let index = self.sector.read();

        let buffer = &mut self.buffer;
        let result = match (self.store.as_mut(), transfer) {
            (None, _) => Err(DeviceError::closed_store()),
            (Some(store), Transfer::Read) => {
                store.read_sector(index).map(|sector| *buffer = sector)
            }
            (Some(store), Transfer::Write) => store.write_sector(index, buffer),
        };

        self.status.set_busy(false);
        match result {
            Ok(()) => {
                log::debug!("{transfer:?} of sector {index} complete");
                self.complete(Completion::Done);
            }
            Err(e) => {
                log::warn!("{transfer:?} of sector {index} failed: {e}");
                self.complete(Completion::Failed);
            }
        }
        Ok(())
    }

    fn complete(&mut self, completion: Completion) {
        self.completions.push_back(completion);
        self.update_status();
    }

    fn acknowledge(&mut self) {
        if let Some(retired) = self.completions.pop_front() {
            log::trace!("Acknowledged {retired:?} completion");
        }
        self.update_status();
    }

    fn update_status(&mut self) {
        let done = self.completions.contains(&Completion::Done);
        let failed = self.completions.contains(&Completion::Failed);
        self.status.set_interrupt_pending(done);
        self.status.set_error(failed);
    }

    fn read_data(&mut self) -> u32 {
        let p = self.data_pointer;
        if p + WORD > SECTOR_SIZE {
            log::trace!("Data port drained, returning sentinel");
            return SENTINEL;
        }
        let mut word = [0; WORD];
        word.copy_from_slice(&self.buffer[p..p + WORD]);
        self.data_pointer += WORD;
        u32::from_le_bytes(word)
    }

    fn write_data(&mut self, value: u32) -> Result<(), DeviceError> {
        let p = self.data_pointer;
        if p + WORD > SECTOR_SIZE {
            return Err(DeviceError::out_of_range(
                "data pointer",
                p as u64,
                SECTOR_SIZE as u64,
            ));
        }
        self.buffer[p..p + WORD].copy_from_slice(&value.to_le_bytes());
        self.data_pointer += WORD;
        Ok(())
    }
}

impl<S: SectorStore> Drop for BlockDeviceController<S> {
    fn drop(&mut self) {
        self.detach();
    }
}

impl<S: SectorStore> MmioDevice for BlockDeviceController<S> {
    fn read(&mut self, offset: u64) -> Result<u32, DeviceError> {
        let value = match offset {
            BLK_STATUS => self.status.raw(),
            BLK_SECTOR => self.sector.read(),
            BLK_DATA => self.read_data(),
            // COMMAND is write-only
            _ => SENTINEL,
        };
        Ok(value)
    }

    fn write(&mut self, offset: u64, value: u32) -> Result<(), DeviceError> {
        match offset {
            BLK_COMMAND => self.dispatch(value)?,
            BLK_SECTOR => self.sector.write(value)?,
            BLK_DATA => self.write_data(value)?,
            // STATUS is read-only, ignore writes
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.status = BlockStatus::new();
        self.sector.reset();
        self.data_pointer = 0;
        self.buffer = [0; SECTOR_SIZE];
        self.completions.clear();
    }

    fn get_size(&self) -> u64 {
        0x10 // STATUS, COMMAND, SECTOR, DATA
    }

    fn interrupt_pending(&self) -> bool {
        self.status.interrupt_pending()
    }
}
