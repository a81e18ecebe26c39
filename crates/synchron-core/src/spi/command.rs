//! SPI command structure

use super::AddressWidth;

/// Longest opcode + address header a command can carry
pub const MAX_HEADER_LEN: usize = 5;

/// A single SPI transaction
///
/// Designed to avoid allocation - uses slices for data.
/// The lifetime parameter `'a` ties the command to the buffers it references.
pub struct SpiCommand<'a> {
    /// The opcode byte
    pub opcode: u8,

    /// Address (if any)
    pub address: Option<u32>,

    /// Address width
    pub address_width: AddressWidth,

    /// Data to write after opcode/address
    pub write_data: &'a [u8],

    /// Buffer to read into (mutable)
    pub read_buf: &'a mut [u8],
}

impl<'a> SpiCommand<'a> {
    /// Create a simple command with no address or data (e.g., WREN)
    pub fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Create a read register command with no address (e.g., RDSR, RDID)
    pub fn read_reg(opcode: u8, buf: &'a mut [u8]) -> Self {
        Self {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            write_data: &[],
            read_buf: buf,
        }
    }

    /// Create an addressed read command (e.g., READ)
    pub fn read(opcode: u8, addr: u32, width: AddressWidth, buf: &'a mut [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: width,
            write_data: &[],
            read_buf: buf,
        }
    }

    /// Create an addressed write command (e.g., PP)
    pub fn write(opcode: u8, addr: u32, width: AddressWidth, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: width,
            write_data: data,
            read_buf: &mut [],
        }
    }

    /// Create an addressed erase command (e.g., SE)
    pub fn erase(opcode: u8, addr: u32, width: AddressWidth) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: width,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Returns true if this command has a read phase
    pub fn has_read(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Returns true if this command has a write phase
    pub fn has_write(&self) -> bool {
        !self.write_data.is_empty()
    }

    /// Number of opcode + address bytes clocked out before the data phase
    pub fn header_len(&self) -> usize {
        1 + self.address_width.bytes() as usize
    }

    /// Encode opcode and address into `buf`, returning the header length
    ///
    /// `buf` must hold at least [`MAX_HEADER_LEN`] bytes.
    pub fn encode_header(&self, buf: &mut [u8]) -> usize {
        buf[0] = self.opcode;
        if let Some(addr) = self.address {
            self.address_width.encode(addr, &mut buf[1..]);
        }
        self.header_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::opcodes;

    #[test]
    fn test_encode_header_3b() {
        let cmd = SpiCommand::erase(opcodes::SE_20, 0x01_F000, AddressWidth::ThreeByte);
        let mut buf = [0u8; MAX_HEADER_LEN];
        let len = cmd.encode_header(&mut buf);
        assert_eq!(len, 4);
        assert_eq!(&buf[..len], &[0x20, 0x01, 0xF0, 0x00]);
    }

    #[test]
    fn test_simple_has_no_phases() {
        let cmd = SpiCommand::simple(opcodes::WREN);
        assert!(!cmd.has_read());
        assert!(!cmd.has_write());
        assert_eq!(cmd.header_len(), 1);
    }
}
