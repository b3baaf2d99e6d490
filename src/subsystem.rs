//! The device subsystem as seen by the CPU core.
//!
//! One explicitly owned [`IoSubsystem`] holds every emulated peripheral and the
//! address decoder in front of them. The core calls [`IoSubsystem::read_register`]
//! and [`IoSubsystem::write_register`] for every access in the I/O region and
//! polls [`IoSubsystem::interrupt_pending`] between quanta.

use std::io::{self, Write};
use std::path::Path;

use crate::devices::block::{BLK_COMMAND, BLK_DATA, BLK_SECTOR, BLK_STATUS};
use crate::devices::console::CONSOLE_OUT;
use crate::devices::keyboard::{DEFAULT_KEY_CAPACITY, KEY_DATA, KEY_STATUS};
use crate::devices::{
    AddressDecoder, BackingStore, BlockDeviceController, ConsoleDevice, DeviceId,
    KeyboardQueue, MmioDevice, SENTINEL, SectorStore,
};
use crate::err::DeviceError;

pub const IO_BASE: u32 = 0xFFFF_0000;
pub const CONSOLE_BASE: u32 = IO_BASE + 0x04;
pub const KEYBOARD_BASE: u32 = IO_BASE + 0x10;
pub const BLOCK_BASE: u32 = IO_BASE + 0x20;

/// Absolute register addresses
pub const CONSOLE_OUT_ADDR: u32 = CONSOLE_BASE + CONSOLE_OUT as u32;
pub const KEY_STATUS_ADDR: u32 = KEYBOARD_BASE + KEY_STATUS as u32;
pub const KEY_DATA_ADDR: u32 = KEYBOARD_BASE + KEY_DATA as u32;
pub const BLK_STATUS_ADDR: u32 = BLOCK_BASE + BLK_STATUS as u32;
pub const BLK_COMMAND_ADDR: u32 = BLOCK_BASE + BLK_COMMAND as u32;
pub const BLK_SECTOR_ADDR: u32 = BLOCK_BASE + BLK_SECTOR as u32;
pub const BLK_DATA_ADDR: u32 = BLOCK_BASE + BLK_DATA as u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemConfig {
    /// Scan codes held before the oldest is dropped
    pub key_capacity: usize,
    /// Grow the backing file on reads past its end instead of failing them
    pub auto_extend: bool,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            key_capacity: DEFAULT_KEY_CAPACITY,
            auto_extend: false,
        }
    }
}

pub struct IoSubsystem<S: SectorStore = BackingStore> {
    config: SubsystemConfig,
    decoder: AddressDecoder,
    console: ConsoleDevice,
    keyboard: KeyboardQueue,
    block: BlockDeviceController<S>,
}

impl IoSubsystem<BackingStore> {
    /// Builds the subsystem with the console wired to host stdout.
    pub fn new(config: SubsystemConfig) -> Result<Self, DeviceError> {
        Self::with_console(config, io::stdout())
    }

    /// Opens `path` as the block device medium. Failure here is fatal for
    /// the simulator and must be reported before any program runs.
    pub fn attach_block_device(&mut self, path: impl AsRef<Path>) -> Result<(), DeviceError> {
        let store = BackingStore::open_with(path, self.config.auto_extend)?;
        self.attach_store(store);
        Ok(())
    }
}

impl<S: SectorStore> IoSubsystem<S> {
    pub fn with_console<W>(config: SubsystemConfig, console_output: W) -> Result<Self, DeviceError>
    where
        W: Write + Send + 'static,
    {
        let console = ConsoleDevice::new(console_output);
        let keyboard = KeyboardQueue::with_capacity(config.key_capacity);
        let block = BlockDeviceController::default();

        let mut decoder = AddressDecoder::default();
        decoder.register_region(
            u64::from(CONSOLE_BASE),
            console.get_size(),
            DeviceId::Console,
        )?;
        decoder.register_region(
            u64::from(KEYBOARD_BASE),
            keyboard.get_size(),
            DeviceId::Keyboard,
        )?;
        decoder.register_region(u64::from(BLOCK_BASE), block.get_size(), DeviceId::Block)?;

        Ok(Self {
            config,
            decoder,
            console,
            keyboard,
            block,
        })
    }

    pub fn attach_store(&mut self, store: S) {
        self.block.attach(store);
    }

    /// Flushes and closes the block device medium. Safe to call repeatedly.
    pub fn detach_block_device(&mut self) {
        self.block.detach();
    }

    /// Register write from the CPU core. Unmapped addresses are ignored and
    /// device-level rejections are only logged.
    pub fn write_register(&mut self, address: u32, value: u32) {
        if let Err(e) = self.try_write_register(address, value) {
            log::warn!("Write of {value:#x} to {address:#010x} rejected: {e}");
        }
    }

    /// Like [`IoSubsystem::write_register`], but reports device-level
    /// rejections (busy controller, data port overrun, console sink failure).
    pub fn try_write_register(&mut self, address: u32, value: u32) -> Result<(), DeviceError> {
        let Some((id, offset)) = self.decoder.decode(u64::from(address)) else {
            log::debug!("Ignoring write of {value:#x} to unmapped address {address:#010x}");
            return Ok(());
        };
        log::debug!("Write {value:#x} to {address:#010x} ({id:?} + {offset:#x})");
        self.device_mut(id).write(offset, value)
    }

    /// Register read from the CPU core. Unmapped addresses read as the
    /// all-ones sentinel.
    pub fn read_register(&mut self, address: u32) -> u32 {
        let Some((id, offset)) = self.decoder.decode(u64::from(address)) else {
            log::debug!("Read from unmapped address {address:#010x}");
            return SENTINEL;
        };
        let value = self.device_mut(id).read(offset).unwrap_or_else(|e| {
            log::warn!("Read from {address:#010x} failed: {e}");
            SENTINEL
        });
        log::debug!("Read {value:#x} from {address:#010x} ({id:?} + {offset:#x})");
        value
    }

    /// Called by an interactive front end between simulation steps.
    pub fn inject_key_scan_code(&mut self, code: u32) {
        log::debug!("Injecting scan code {code:#x}");
        self.keyboard.inject(code);
    }

    /// OR of every device's interrupt request, evaluated against current state.
    pub fn interrupt_pending(&self) -> bool {
        self.decoder
            .regions()
            .any(|(_, _, id)| self.device(id).interrupt_pending())
    }

    /// Returns every device to its power-on state. The attached medium stays
    /// attached.
    pub fn reset(&mut self) {
        self.console.reset();
        self.keyboard.reset();
        self.block.reset();
    }

    pub fn config(&self) -> &SubsystemConfig {
        &self.config
    }

    pub fn block(&self) -> &BlockDeviceController<S> {
        &self.block
    }

    pub fn keyboard(&self) -> &KeyboardQueue {
        &self.keyboard
    }

    pub fn console(&self) -> &ConsoleDevice {
        &self.console
    }

    fn device(&self, id: DeviceId) -> &dyn MmioDevice {
        match id {
            DeviceId::Console => &self.console,
            DeviceId::Keyboard => &self.keyboard,
            DeviceId::Block => &self.block,
        }
    }

    fn device_mut(&mut self, id: DeviceId) -> &mut dyn MmioDevice {
        match id {
            DeviceId::Console => &mut self.console,
            DeviceId::Keyboard => &mut self.keyboard,
            DeviceId::Block => &mut self.block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::block::tests::MemStore;
    use crate::devices::block::{CMD_ACK_INTERRUPT, CMD_READ_SECTOR, CMD_WRITE_SECTOR};
    use crate::devices::console::tests::CaptureSink;
    use crate::devices::store::SECTOR_SIZE;
    use tempfile::tempdir;

    const WORDS_PER_SECTOR: usize = SECTOR_SIZE / 4;

    fn file_subsystem() -> (IoSubsystem, CaptureSink) {
        let sink = CaptureSink::default();
        let io = IoSubsystem::with_console(SubsystemConfig::default(), sink.clone()).unwrap();
        (io, sink)
    }

    fn mem_subsystem(store: MemStore) -> IoSubsystem<MemStore> {
        let mut io =
            IoSubsystem::with_console(SubsystemConfig::default(), CaptureSink::default()).unwrap();
        io.attach_store(store);
        io
    }

    fn write_sector<S: SectorStore>(io: &mut IoSubsystem<S>, index: u32, words: &[u32]) {
        io.write_register(BLK_SECTOR_ADDR, index);
        for &word in words {
            io.write_register(BLK_DATA_ADDR, word);
        }
        io.write_register(BLK_COMMAND_ADDR, CMD_WRITE_SECTOR);
        io.write_register(BLK_COMMAND_ADDR, CMD_ACK_INTERRUPT);
    }

    fn read_sector<S: SectorStore>(io: &mut IoSubsystem<S>, index: u32) -> Vec<u8> {
        io.write_register(BLK_SECTOR_ADDR, index);
        io.write_register(BLK_COMMAND_ADDR, CMD_READ_SECTOR);
        let mut bytes = Vec::with_capacity(SECTOR_SIZE);
        for _ in 0..WORDS_PER_SECTOR {
            bytes.extend_from_slice(&io.read_register(BLK_DATA_ADDR).to_le_bytes());
        }
        io.write_register(BLK_COMMAND_ADDR, CMD_ACK_INTERRUPT);
        bytes
    }

    #[test]
    fn test_sector_persists_across_reattach() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");

        let (mut io, _) = file_subsystem();
        io.attach_block_device(&path).unwrap();
        write_sector(&mut io, 3, &[0xAAAA_AAAA; WORDS_PER_SECTOR]);
        assert_eq!(io.read_register(BLK_STATUS_ADDR), 0);
        io.detach_block_device();
        io.detach_block_device();

        io.attach_block_device(&path).unwrap();
        assert_eq!(read_sector(&mut io, 3), vec![0xAA; SECTOR_SIZE]);
        assert_eq!(io.read_register(BLK_STATUS_ADDR), 0);
        io.detach_block_device();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * SECTOR_SIZE as u64);
    }

    #[test]
    fn test_sector_round_trip_through_registers() {
        let dir = tempdir().unwrap();
        let (mut io, _) = file_subsystem();
        io.attach_block_device(dir.path().join("disk.img")).unwrap();

        for index in [0u32, 5, 2] {
            let words: Vec<u32> = (0..WORDS_PER_SECTOR as u32)
                .map(|i| (index << 16) | i)
                .collect();
            write_sector(&mut io, index, &words);
            let expected: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
            assert_eq!(read_sector(&mut io, index), expected);
        }
    }

    #[test]
    fn test_console_output_flushed_per_write() {
        let (mut io, sink) = file_subsystem();
        for &byte in b"hi\n" {
            io.write_register(CONSOLE_OUT_ADDR, u32::from(byte));
            let len = sink.bytes.lock().unwrap().len();
            assert_eq!(*sink.flushed_len.lock().unwrap(), len);
        }
        assert_eq!(*sink.bytes.lock().unwrap(), b"hi\n");
        assert_eq!(io.console().written(), 3);
        assert_eq!(io.read_register(CONSOLE_OUT_ADDR), SENTINEL);
    }

    #[test]
    fn test_unmapped_accesses_are_harmless() {
        let (mut io, sink) = file_subsystem();
        for address in [0x0, 0x1000, IO_BASE, IO_BASE + 0x8, CONSOLE_OUT_ADDR + 1, u32::MAX] {
            io.write_register(address, 0x41);
            assert_eq!(io.read_register(address), SENTINEL);
            assert!(io.try_write_register(address, 0x41).is_ok());
        }
        assert!(sink.bytes.lock().unwrap().is_empty());
        assert!(!io.interrupt_pending());
    }

    #[test]
    fn test_keyboard_through_registers() {
        let (mut io, _) = file_subsystem();
        assert_eq!(io.read_register(KEY_STATUS_ADDR), 0);
        assert_eq!(io.read_register(KEY_DATA_ADDR), SENTINEL);

        for code in 1..=17 {
            io.inject_key_scan_code(code);
        }
        assert!(io.interrupt_pending());

        let mut drained = Vec::new();
        while io.read_register(KEY_STATUS_ADDR) == 1 {
            drained.push(io.read_register(KEY_DATA_ADDR));
        }
        assert_eq!(drained, (2..=17).collect::<Vec<u32>>());
        assert!(!io.interrupt_pending());
    }

    #[test]
    fn test_interrupt_line_follows_ack() {
        let mut io = mem_subsystem(MemStore::default());
        assert!(!io.interrupt_pending());

        io.write_register(BLK_COMMAND_ADDR, CMD_WRITE_SECTOR);
        assert!(io.interrupt_pending());
        assert!(io.interrupt_pending());

        io.write_register(BLK_COMMAND_ADDR, CMD_ACK_INTERRUPT);
        assert!(!io.interrupt_pending());

        io.inject_key_scan_code(0x1E);
        assert!(io.interrupt_pending());
        io.read_register(KEY_DATA_ADDR);
        assert!(!io.interrupt_pending());
    }

    #[test]
    fn test_busy_controller_rejects_commands() {
        let store = MemStore {
            in_flight: true,
            ..Default::default()
        };
        let mut io = mem_subsystem(store);
        io.write_register(BLK_SECTOR_ADDR, 8);

        let err = io
            .try_write_register(BLK_COMMAND_ADDR, CMD_READ_SECTOR)
            .unwrap_err();
        assert!(matches!(err, DeviceError::DeviceBusy));
        assert_eq!(io.read_register(BLK_STATUS_ADDR), 0b010);
        assert_eq!(io.read_register(BLK_SECTOR_ADDR), 8);
        assert!(!io.interrupt_pending());

        // The plain entry point swallows the rejection
        io.write_register(BLK_COMMAND_ADDR, CMD_WRITE_SECTOR);
        assert_eq!(io.read_register(BLK_STATUS_ADDR), 0b010);
    }

    #[test]
    fn test_attach_failure_is_reported() {
        let dir = tempdir().unwrap();
        let (mut io, _) = file_subsystem();
        let err = io
            .attach_block_device(dir.path().join("no").join("such").join("disk.img"))
            .unwrap_err();
        assert!(matches!(err, DeviceError::OpenFailed { .. }));
        assert!(!io.block().is_attached());
    }

    #[test]
    fn test_reset_keeps_medium() {
        let mut io = mem_subsystem(MemStore::default());
        io.inject_key_scan_code(1);
        io.write_register(BLK_COMMAND_ADDR, CMD_WRITE_SECTOR);
        io.reset();

        assert!(!io.interrupt_pending());
        assert!(io.keyboard().is_empty());
        assert!(io.block().is_attached());
        assert_eq!(io.config(), &SubsystemConfig::default());
    }
}
