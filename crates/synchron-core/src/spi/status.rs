//! Status register 1 bit definitions

use bitflags::bitflags;

bitflags! {
    /// Status register 1 as returned by RDSR
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusRegister: u8 {
        /// Write In Progress / Busy
        const WIP  = 1 << 0;
        /// Write Enable Latch
        const WEL  = 1 << 1;
        /// Block Protect bit 0
        const BP0  = 1 << 2;
        /// Block Protect bit 1
        const BP1  = 1 << 3;
        /// Block Protect bit 2
        const BP2  = 1 << 4;
        /// Status Register Write Disable
        const SRWD = 1 << 7;

        /// All block protect bits
        const BP = Self::BP0.bits() | Self::BP1.bits() | Self::BP2.bits();
    }
}

impl StatusRegister {
    /// True while an erase or program is still running
    pub fn is_busy(self) -> bool {
        self.contains(Self::WIP)
    }

    /// True once WREN has armed the chip for the next erase/program
    pub fn write_enabled(self) -> bool {
        self.contains(Self::WEL)
    }
}
