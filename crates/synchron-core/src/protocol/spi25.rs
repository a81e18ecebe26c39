//! SPI25 protocol implementation
//!
//! This module implements the common SPI flash command sequences
//! as defined by JEDEC. Every sequence that changes the array arms the chip
//! with WREN, confirms the write enable latch, and then polls WIP with a
//! bounded number of status reads so a dead or stuck chip can never hang the
//! caller.

use crate::error::{Error, Result};
use crate::programmer::SpiMaster;
use crate::spi::{opcodes, AddressWidth, SpiCommand, StatusRegister};

/// Read the JEDEC ID from a flash chip
///
/// Returns (manufacturer_id, device_id) on success.
pub fn read_jedec_id<M: SpiMaster + ?Sized>(master: &mut M) -> Result<(u8, u16)> {
    let mut buf = [0u8; 3];
    let mut cmd = SpiCommand::read_reg(opcodes::RDID, &mut buf);
    master.execute(&mut cmd)?;

    let manufacturer = buf[0];
    let device = u16::from_be_bytes([buf[1], buf[2]]);

    Ok((manufacturer, device))
}

/// Read the status register 1
pub fn read_status<M: SpiMaster + ?Sized>(master: &mut M) -> Result<StatusRegister> {
    let mut buf = [0u8; 1];
    let mut cmd = SpiCommand::read_reg(opcodes::RDSR, &mut buf);
    master.execute(&mut cmd)?;
    Ok(StatusRegister::from_bits_retain(buf[0]))
}

/// Send the Write Enable command
pub fn write_enable<M: SpiMaster + ?Sized>(master: &mut M) -> Result<()> {
    let mut cmd = SpiCommand::simple(opcodes::WREN);
    master.execute(&mut cmd)
}

/// Send WREN and confirm the chip latched it
///
/// Chips of this class silently ignore WREN while write protected or in
/// deep power down, so the latch is read back rather than assumed.
pub fn arm_write<M: SpiMaster + ?Sized>(master: &mut M) -> Result<()> {
    write_enable(master)?;
    let status = read_status(master)?;
    if !status.write_enabled() {
        log::debug!("WEL not set after WREN (status 0x{:02X})", status.bits());
        return Err(Error::WriteEnableFailed);
    }
    Ok(())
}

/// Wait for the WIP (Write In Progress) bit to clear
///
/// Polls the status register until the Write In Progress bit clears.
///
/// # Arguments
/// * `poll_delay_us` - Delay in microseconds between status register polls
/// * `timeout_us` - Maximum time to wait before returning Error::Timeout
///
/// # Typical poll delays (from flashprog):
/// * Page program: 10us
/// * 4KB sector erase: 10,000us (10ms)
pub fn wait_ready<M: SpiMaster + ?Sized>(
    master: &mut M,
    poll_delay_us: u32,
    timeout_us: u32,
) -> Result<()> {
    let max_polls = if poll_delay_us > 0 {
        (timeout_us / poll_delay_us).max(1)
    } else {
        timeout_us.max(1)
    };

    for _ in 0..max_polls {
        let status = read_status(master)?;
        if !status.is_busy() {
            return Ok(());
        }
        if poll_delay_us > 0 {
            master.delay_us(poll_delay_us);
        }
    }

    Err(Error::Timeout)
}

/// Read data from flash, splitting into transactions the master can carry
pub fn read<M: SpiMaster + ?Sized>(
    master: &mut M,
    width: AddressWidth,
    addr: u32,
    buf: &mut [u8],
) -> Result<()> {
    let opcode = match width {
        AddressWidth::FourByte => opcodes::READ_4B,
        _ => opcodes::READ,
    };
    let max_len = master.max_read_len().max(1);
    let mut offset = 0;

    while offset < buf.len() {
        let chunk_len = core::cmp::min(max_len, buf.len() - offset);
        let chunk = &mut buf[offset..offset + chunk_len];
        let mut cmd = SpiCommand::read(opcode, addr + offset as u32, width, chunk);
        master.execute(&mut cmd)?;
        offset += chunk_len;
    }

    Ok(())
}

/// Program a single page (up to page_size bytes)
///
/// The data must not cross a page boundary; chips wrap to the start of the
/// page instead of continuing into the next one.
pub fn program_page<M: SpiMaster + ?Sized>(
    master: &mut M,
    width: AddressWidth,
    addr: u32,
    data: &[u8],
    poll_delay_us: u32,
    timeout_us: u32,
) -> Result<()> {
    let opcode = match width {
        AddressWidth::FourByte => opcodes::PP_4B,
        _ => opcodes::PP,
    };

    arm_write(master)?;

    let mut cmd = SpiCommand::write(opcode, addr, width, data);
    master.execute(&mut cmd)?;

    wait_ready(master, poll_delay_us, timeout_us)
}

/// Erase the 4 KiB sector containing `addr`
pub fn sector_erase<M: SpiMaster + ?Sized>(
    master: &mut M,
    width: AddressWidth,
    addr: u32,
    poll_delay_us: u32,
    timeout_us: u32,
) -> Result<()> {
    let opcode = match width {
        AddressWidth::FourByte => opcodes::SE_21,
        _ => opcodes::SE_20,
    };

    arm_write(master)?;

    let mut cmd = SpiCommand::erase(opcode, addr, width);
    master.execute(&mut cmd)?;

    wait_ready(master, poll_delay_us, timeout_us)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    /// Scripted chip: answers RDSR from a queue and records opcodes
    struct ScriptedChip {
        status: Vec<u8>,
        opcodes: Vec<u8>,
        delays: u32,
    }

    impl ScriptedChip {
        fn new(status: &[u8]) -> Self {
            Self {
                status: status.iter().rev().copied().collect(),
                opcodes: Vec::new(),
                delays: 0,
            }
        }
    }

    impl SpiMaster for ScriptedChip {
        fn max_read_len(&self) -> usize {
            16
        }

        fn max_write_len(&self) -> usize {
            256
        }

        fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
            self.opcodes.push(cmd.opcode);
            match cmd.opcode {
                opcodes::RDSR => {
                    // Last scripted value repeats forever
                    let value = if self.status.len() > 1 {
                        self.status.pop().unwrap_or(0)
                    } else {
                        self.status.first().copied().unwrap_or(0)
                    };
                    cmd.read_buf[0] = value;
                }
                opcodes::RDID => cmd.read_buf.copy_from_slice(&[0x01, 0x20, 0x18]),
                opcodes::READ => {
                    let base = cmd.address.unwrap_or(0);
                    for (i, b) in cmd.read_buf.iter_mut().enumerate() {
                        *b = (base as usize + i) as u8;
                    }
                }
                _ => {}
            }
            Ok(())
        }

        fn delay_us(&mut self, _us: u32) {
            self.delays += 1;
        }
    }

    #[test]
    fn test_read_jedec_id() {
        let mut chip = ScriptedChip::new(&[0]);
        assert_eq!(read_jedec_id(&mut chip).unwrap(), (0x01, 0x2018));
    }

    #[test]
    fn test_wait_ready_times_out() {
        let mut chip = ScriptedChip::new(&[StatusRegister::WIP.bits()]);
        assert_eq!(wait_ready(&mut chip, 10, 100), Err(Error::Timeout));
        assert_eq!(chip.delays, 10);
    }

    #[test]
    fn test_wait_ready_clears() {
        let wip = StatusRegister::WIP.bits();
        let mut chip = ScriptedChip::new(&[wip, wip, 0]);
        assert_eq!(wait_ready(&mut chip, 10, 1000), Ok(()));
        assert_eq!(chip.delays, 2);
    }

    #[test]
    fn test_arm_write_requires_wel() {
        let mut chip = ScriptedChip::new(&[0]);
        assert_eq!(arm_write(&mut chip), Err(Error::WriteEnableFailed));

        let mut chip = ScriptedChip::new(&[StatusRegister::WEL.bits()]);
        assert_eq!(arm_write(&mut chip), Ok(()));
        assert_eq!(chip.opcodes, [opcodes::WREN, opcodes::RDSR]);
    }

    #[test]
    fn test_sector_erase_sequence() {
        let wel = StatusRegister::WEL.bits();
        let mut chip = ScriptedChip::new(&[wel, 0]);
        sector_erase(&mut chip, AddressWidth::ThreeByte, 0x1000, 10_000, 500_000).unwrap();
        assert_eq!(
            chip.opcodes,
            [opcodes::WREN, opcodes::RDSR, opcodes::SE_20, opcodes::RDSR]
        );
    }

    #[test]
    fn test_read_is_chunked() {
        let mut chip = ScriptedChip::new(&[0]);
        let mut buf = [0u8; 40];
        read(&mut chip, AddressWidth::ThreeByte, 0x100, &mut buf).unwrap();
        assert_eq!(chip.opcodes.len(), 3);
        assert_eq!(buf[0], 0x00);
        assert_eq!(buf[39], 39);
    }
}
