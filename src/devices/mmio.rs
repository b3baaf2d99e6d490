use std::collections::BTreeMap;

use crate::err::DeviceError;

/// Value returned for reads that no register backs.
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// Every device register is one 32-bit word.
pub const WORD_SIZE: u64 = 4;

pub trait MmioDevice {
    fn read(&mut self, offset: u64) -> Result<u32, DeviceError>;
    fn write(&mut self, offset: u64, value: u32) -> Result<(), DeviceError>;
    fn reset(&mut self);
    fn get_size(&self) -> u64;

    /// Whether this device currently drives the shared interrupt line.
    fn interrupt_pending(&self) -> bool {
        false
    }
}

/// Devices that can own a region of the I/O space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceId {
    Console,
    Keyboard,
    Block,
}

#[derive(Debug)]
struct MmioRegion {
    base_addr: u64,
    size: u64,
    device: DeviceId,
}

/// Static map from physical addresses to the device register that backs them.
///
/// Regions are registered once while the subsystem is built. Decoding is a
/// total function: anything outside a region, or not word-aligned, simply
/// decodes to `None`.
#[derive(Debug, Default)]
pub struct AddressDecoder {
    regions: BTreeMap<u64, MmioRegion>, // Sorted by base address
}

impl AddressDecoder {
    pub fn register_region(
        &mut self,
        base: u64,
        size: u64,
        device: DeviceId,
    ) -> Result<(), DeviceError> {
        // Check for overlaps
        if let Some(existing) = self.find_overlap(base, size) {
            return Err(DeviceError::overlapping_region(
                existing,
                (base, base + size),
            ));
        }

        self.regions.insert(
            base,
            MmioRegion {
                base_addr: base,
                size,
                device,
            },
        );

        Ok(())
    }

    /// Resolve `addr` to the owning device and the register offset within it.
    pub fn decode(&self, addr: u64) -> Option<(DeviceId, u64)> {
        if addr & (WORD_SIZE - 1) != 0 {
            return None;
        }
        let region = self.find_region(addr)?;
        let offset = addr - region.base_addr;

        // Ensure the whole word is inside the region
        if offset + WORD_SIZE > region.size {
            return None;
        }
        Some((region.device, offset))
    }

    pub fn regions(&self) -> impl Iterator<Item = (u64, u64, DeviceId)> + '_ {
        self.regions
            .values()
            .map(|region| (region.base_addr, region.size, region.device))
    }

    fn find_region(&self, addr: u64) -> Option<&MmioRegion> {
        // Find the region that could contain this address
        let (_, region) = self.regions.range(..=addr).next_back()?;

        // Verify address is actually within this region
        (addr < region.base_addr + region.size).then_some(region)
    }

    /// find a overlapping region if it exists, O(log n)
    fn find_overlap(&self, base: u64, size: u64) -> Option<(u64, u64)> {
        let new_end = base + size;

        if let Some((_, region)) = self.regions.range(base..).next() {
            if region.base_addr < new_end {
                return Some((region.base_addr, region.base_addr + region.size));
            }
        }

        if let Some((_, region)) = self.regions.range(..base).next_back() {
            let existing_end = region.base_addr + region.size;
            if existing_end > base {
                return Some((region.base_addr, existing_end));
            }
        }

        None
    }
}
