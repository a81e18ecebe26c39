//! `SpiMaster` over an `embedded-hal` SPI device
//!
//! This is the driver used on the blade itself: the HAL owns chip select and
//! bus locking, we only lay out the opcode/address header and the data
//! phases as one transaction.

use crate::error::{Error, Result};
use crate::programmer::SpiMaster;
use crate::spi::{SpiCommand, MAX_HEADER_LEN};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};

/// Largest read issued in one transaction
const MAX_READ_LEN: usize = 4096;

/// Page program never carries more than one page
const MAX_WRITE_LEN: usize = 256;

/// SPI master backed by an `embedded-hal` 1.0 [`SpiDevice`] and delay source
pub struct HalSpiMaster<SPI, D> {
    spi: SPI,
    delay: D,
}

impl<SPI, D> HalSpiMaster<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    /// Wrap an SPI device and a delay provider
    pub fn new(spi: SPI, delay: D) -> Self {
        Self { spi, delay }
    }

    /// Give back the wrapped peripherals
    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }
}

impl<SPI, D> SpiMaster for HalSpiMaster<SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    fn max_read_len(&self) -> usize {
        MAX_READ_LEN
    }

    fn max_write_len(&self) -> usize {
        MAX_WRITE_LEN
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let mut header = [0u8; MAX_HEADER_LEN];
        let header_len = cmd.encode_header(&mut header);

        let result = match (cmd.has_write(), cmd.has_read()) {
            (false, false) => self
                .spi
                .transaction(&mut [Operation::Write(&header[..header_len])]),
            (true, false) => self.spi.transaction(&mut [
                Operation::Write(&header[..header_len]),
                Operation::Write(cmd.write_data),
            ]),
            (false, true) => self.spi.transaction(&mut [
                Operation::Write(&header[..header_len]),
                Operation::Read(&mut *cmd.read_buf),
            ]),
            (true, true) => self.spi.transaction(&mut [
                Operation::Write(&header[..header_len]),
                Operation::Write(cmd.write_data),
                Operation::Read(&mut *cmd.read_buf),
            ]),
        };

        result.map_err(|e| {
            log::debug!("SPI transaction for opcode 0x{:02X} failed: {:?}", cmd.opcode, e);
            Error::SpiTransferFailed
        })
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::{opcodes, AddressWidth};
    use embedded_hal::spi::{ErrorKind, ErrorType};
    use std::vec::Vec;

    /// Records every transaction as a flat list of written bytes
    #[derive(Default)]
    struct RecordingSpi {
        written: Vec<Vec<u8>>,
        reply: u8,
        fail: bool,
    }

    impl ErrorType for RecordingSpi {
        type Error = ErrorKind;
    }

    impl SpiDevice for RecordingSpi {
        fn transaction(
            &mut self,
            operations: &mut [Operation<'_, u8>],
        ) -> core::result::Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            let mut out = Vec::new();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(data) => out.extend_from_slice(data),
                    Operation::Read(buf) => buf.fill(self.reply),
                    _ => {}
                }
            }
            self.written.push(out);
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_page_program_layout() {
        let mut master = HalSpiMaster::new(RecordingSpi::default(), NoDelay);
        let data = [0xDE, 0xAD];
        let mut cmd = SpiCommand::write(opcodes::PP, 0x00_0100, AddressWidth::ThreeByte, &data);
        master.execute(&mut cmd).unwrap();

        let (spi, _) = master.release();
        assert_eq!(spi.written, std::vec![std::vec![0x02, 0x00, 0x01, 0x00, 0xDE, 0xAD]]);
    }

    #[test]
    fn test_read_fills_buffer() {
        let spi = RecordingSpi {
            reply: 0x5A,
            ..Default::default()
        };
        let mut master = HalSpiMaster::new(spi, NoDelay);
        let mut buf = [0u8; 3];
        let mut cmd = SpiCommand::read_reg(opcodes::RDID, &mut buf);
        master.execute(&mut cmd).unwrap();
        assert_eq!(buf, [0x5A; 3]);
    }

    #[test]
    fn test_bus_error_maps_to_transfer_failed() {
        let spi = RecordingSpi {
            fail: true,
            ..Default::default()
        };
        let mut master = HalSpiMaster::new(spi, NoDelay);
        let mut cmd = SpiCommand::simple(opcodes::WREN);
        assert_eq!(master.execute(&mut cmd), Err(Error::SpiTransferFailed));
    }
}
