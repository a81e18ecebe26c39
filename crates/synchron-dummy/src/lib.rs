//! synchron-dummy - In-memory SPI NOR flash emulator
//!
//! [`DummyFlash`] answers the subset of the JEDEC command set the blade node
//! uses and follows the physics of the real part: erase sets bytes to 0xFF,
//! programming can only clear bits, both need the write enable latch and
//! leave the chip busy for a few status polls. Fault modes let tests check
//! how the node copes with a dead or hung chip.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use synchron_core::error::{Error, Result};
use synchron_core::flash::{FlashGeometry, JedecId, ERASED_VALUE};
use synchron_core::programmer::SpiMaster;
use synchron_core::spi::{opcodes, SpiCommand, StatusRegister};

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Identification returned by RDID
    pub jedec_id: JedecId,
    /// Chip layout
    pub geometry: FlashGeometry,
    /// Status polls a page program stays busy for
    pub program_busy_polls: u32,
    /// Status polls a sector erase stays busy for
    pub erase_busy_polls: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            jedec_id: JedecId::new(0x01, 0x2018), // Spansion S25FL128
            geometry: FlashGeometry::default(),
            program_busy_polls: 1,
            erase_busy_polls: 3,
        }
    }
}

/// Misbehaviour to emulate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fault {
    /// Behave like a healthy chip
    #[default]
    None,
    /// Every transaction times out
    Unresponsive,
    /// WIP never clears after a program or erase
    StuckBusy,
    /// WREN is ignored, so the write enable latch never sets
    IgnoreWriteEnable,
}

/// Dummy flash
///
/// Emulates a flash chip in memory for testing purposes.
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    write_enabled: bool,
    busy_polls: u32,
    stuck: bool,
    fault: Fault,
    erase_count: usize,
    program_count: usize,
}

impl DummyFlash {
    /// Create a new dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![ERASED_VALUE; config.geometry.total_size as usize];
        Self {
            config,
            data,
            write_enabled: false,
            busy_polls: 0,
            stuck: false,
            fault: Fault::None,
            erase_count: 0,
            program_count: 0,
        }
    }

    /// Create a new dummy flash with default configuration (16 MiB, 4 KiB sectors)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Switch fault emulation
    pub fn set_fault(&mut self, fault: Fault) {
        self.fault = fault;
        if fault != Fault::StuckBusy {
            self.stuck = false;
        }
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Sector erases carried out
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Page programs carried out
    pub fn program_count(&self) -> usize {
        self.program_count
    }

    fn status(&self) -> StatusRegister {
        let mut status = StatusRegister::empty();
        status.set(StatusRegister::WEL, self.write_enabled);
        status.set(StatusRegister::WIP, self.is_busy());
        status
    }

    fn is_busy(&self) -> bool {
        self.stuck || self.busy_polls > 0
    }

    fn start_busy(&mut self, polls: u32) {
        self.busy_polls = polls;
        self.stuck = self.fault == Fault::StuckBusy;
    }

    fn handle_read(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let addr = cmd.address.unwrap_or(0) as usize;
        let len = cmd.read_buf.len();

        if addr + len > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        cmd.read_buf.copy_from_slice(&self.data[addr..addr + len]);
        Ok(())
    }

    fn handle_page_program(&mut self, cmd: &SpiCommand<'_>) -> Result<()> {
        if !self.write_enabled {
            log::debug!("Page program without WEL ignored");
            return Ok(());
        }

        let addr = cmd.address.unwrap_or(0) as usize;
        if addr >= self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        // The chip wraps within the page rather than crossing into the next
        let page_size = self.config.geometry.page_size as usize;
        let page_base = addr & !(page_size - 1);
        for (i, &byte) in cmd.write_data.iter().enumerate() {
            let offset = (addr - page_base + i) % page_size;
            self.data[page_base + offset] &= byte;
        }

        self.write_enabled = false;
        self.program_count += 1;
        self.start_busy(self.config.program_busy_polls);
        Ok(())
    }

    fn handle_sector_erase(&mut self, cmd: &SpiCommand<'_>) -> Result<()> {
        if !self.write_enabled {
            log::debug!("Sector erase without WEL ignored");
            return Ok(());
        }

        let sector_size = self.config.geometry.sector_size as usize;
        let addr = cmd.address.unwrap_or(0) as usize & !(sector_size - 1);

        if addr + sector_size > self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }

        self.data[addr..addr + sector_size].fill(ERASED_VALUE);

        self.write_enabled = false;
        self.erase_count += 1;
        self.start_busy(self.config.erase_busy_polls);
        Ok(())
    }
}

impl SpiMaster for DummyFlash {
    fn max_read_len(&self) -> usize {
        4096
    }

    fn max_write_len(&self) -> usize {
        self.config.geometry.page_size as usize
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        if self.fault == Fault::Unresponsive {
            return Err(Error::SpiTimeout);
        }

        if cmd.opcode == opcodes::RDSR {
            if let Some(byte) = cmd.read_buf.first_mut() {
                *byte = self.status().bits();
            }
            self.busy_polls = self.busy_polls.saturating_sub(1);
            return Ok(());
        }

        // A busy chip ignores everything but status reads
        if self.is_busy() {
            log::debug!("Opcode 0x{:02X} ignored while busy", cmd.opcode);
            return Ok(());
        }

        match cmd.opcode {
            // JEDEC ID
            opcodes::RDID => {
                let id = self.config.jedec_id;
                let bytes = [id.manufacturer, (id.device >> 8) as u8, id.device as u8];
                let len = core::cmp::min(cmd.read_buf.len(), bytes.len());
                cmd.read_buf[..len].copy_from_slice(&bytes[..len]);
                Ok(())
            }

            opcodes::WREN => {
                self.write_enabled = self.fault != Fault::IgnoreWriteEnable;
                Ok(())
            }

            opcodes::READ | opcodes::READ_4B => self.handle_read(cmd),
            opcodes::PP | opcodes::PP_4B => self.handle_page_program(cmd),
            opcodes::SE_20 | opcodes::SE_21 => self.handle_sector_erase(cmd),

            // Unknown opcode
            _ => Err(Error::OpcodeNotSupported),
        }
    }

    fn delay_us(&mut self, _us: u32) {
        // No delay needed for in-memory operations
    }
}
