//! Flash layout and timing parameters

use crate::error::{Error, Result};
use core::fmt;

/// Value every byte reads back as after an erase
pub const ERASED_VALUE: u8 = 0xFF;

/// Largest number of sectors the erase tracker can follow
pub const MAX_SECTORS: usize = 8192;

/// Largest program page the pipeline buffers for write verification
pub const MAX_PAGE_SIZE: usize = 1024;

/// Bytes cleared by one sector erase command (0x20 / 0x21)
pub const SECTOR_ERASE_SIZE: u32 = 4096;

/// JEDEC manufacturer and device identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JedecId {
    /// Manufacturer byte (e.g. 0x01 Spansion, 0xEF Winbond)
    pub manufacturer: u8,
    /// Device word: memory type and capacity
    pub device: u16,
}

impl JedecId {
    /// Create an id from its parts
    pub const fn new(manufacturer: u8, device: u16) -> Self {
        Self {
            manufacturer,
            device,
        }
    }

    /// The id as the 24-bit value printed in datasheets
    pub const fn raw(&self) -> u32 {
        ((self.manufacturer as u32) << 16) | self.device as u32
    }

    /// A floating or shorted bus reads back as all zeros or all ones
    pub const fn is_blank(&self) -> bool {
        matches!(
            (self.manufacturer, self.device),
            (0x00, 0x0000) | (0xFF, 0xFFFF)
        )
    }
}

impl fmt::Display for JedecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.raw())
    }
}

/// Erase and program granularity of the attached chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Total addressable bytes
    pub total_size: u32,
    /// Smallest erasable unit
    pub sector_size: u32,
    /// Largest programmable unit
    pub page_size: u32,
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self {
            total_size: 16 * 1024 * 1024,
            sector_size: 4096,
            page_size: 256,
        }
    }
}

impl FlashGeometry {
    /// Check the geometry is usable by the pipeline
    ///
    /// Sizes must be powers of two and pages must fit within sectors. The
    /// sector is the unit one erase command clears, and the page size and
    /// sector count must fit the pipeline's buffers.
    pub fn validate(&self) -> Result<()> {
        let pow2 = |v: u32| v != 0 && v.is_power_of_two();
        if !pow2(self.total_size) || !pow2(self.sector_size) || !pow2(self.page_size) {
            return Err(Error::InvalidGeometry);
        }
        if self.sector_size != SECTOR_ERASE_SIZE || self.page_size as usize > MAX_PAGE_SIZE {
            return Err(Error::InvalidGeometry);
        }
        if self.page_size > self.sector_size || self.sector_size > self.total_size {
            return Err(Error::InvalidGeometry);
        }
        if self.sector_count() > MAX_SECTORS {
            return Err(Error::InvalidGeometry);
        }
        Ok(())
    }

    /// Number of erase sectors
    pub fn sector_count(&self) -> usize {
        (self.total_size / self.sector_size) as usize
    }

    /// Index of the sector containing `addr`
    pub fn sector_index(&self, addr: u32) -> usize {
        (addr / self.sector_size) as usize
    }

    /// Start address of the sector containing `addr`
    pub fn sector_start(&self, addr: u32) -> u32 {
        addr & !(self.sector_size - 1)
    }

    /// Offset of `addr` within its page
    pub fn page_offset(&self, addr: u32) -> u32 {
        addr & (self.page_size - 1)
    }

    /// Check that `addr..addr + len` lies inside the chip
    pub fn contains(&self, addr: u32, len: usize) -> bool {
        (addr as u64) + (len as u64) <= self.total_size as u64
    }
}

/// Polling parameters for operations that leave the chip busy
///
/// Timeouts bound how long a dispatch can stall the control loop. The
/// defaults match rated maxima for 4 KiB sector erase and 256 byte page
/// program on common 3 V serial NOR parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashTimings {
    /// Delay between status polls while programming
    pub program_poll_us: u32,
    /// Give up on a page program after this long
    pub page_program_timeout_us: u32,
    /// Delay between status polls while erasing
    pub erase_poll_us: u32,
    /// Give up on a sector erase after this long
    pub sector_erase_timeout_us: u32,
}

impl Default for FlashTimings {
    fn default() -> Self {
        Self {
            program_poll_us: 10,
            page_program_timeout_us: 10_000,
            erase_poll_us: 10_000,
            sector_erase_timeout_us: 500_000,
        }
    }
}
