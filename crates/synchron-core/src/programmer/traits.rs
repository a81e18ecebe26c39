//! Flash driver trait definitions

use crate::error::Result;
use crate::spi::SpiCommand;

/// SPI master trait
///
/// This trait represents the raw transaction primitive of the flash chip
/// driver. Each call to [`execute`](SpiMaster::execute) is one chip-select
/// assertion: opcode, optional address, then the write and read phases.
///
/// Implementations must return within a bounded time. A chip that does not
/// answer is reported as [`Error::SpiTimeout`](crate::Error::SpiTimeout) or
/// [`Error::SpiTransferFailed`](crate::Error::SpiTransferFailed), never by
/// blocking the control loop indefinitely.
pub trait SpiMaster {
    /// Get the maximum number of bytes that can be read in a single transaction
    fn max_read_len(&self) -> usize;

    /// Get the maximum number of bytes that can be written in a single transaction
    fn max_write_len(&self) -> usize;

    /// Execute a single SPI command
    ///
    /// The command contains all the information needed for the transaction:
    /// - `opcode`: The SPI command opcode
    /// - `address`: Optional address (with width)
    /// - `write_data`: Data to write after the header
    /// - `read_buf`: Buffer to read data into
    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

impl<M: SpiMaster + ?Sized> SpiMaster for &mut M {
    fn max_read_len(&self) -> usize {
        (**self).max_read_len()
    }

    fn max_write_len(&self) -> usize {
        (**self).max_write_len()
    }

    fn execute(&mut self, cmd: &mut SpiCommand<'_>) -> Result<()> {
        (**self).execute(cmd)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
