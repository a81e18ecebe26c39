//! Frame and flash integrity checksum
//!
//! CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no
//! reflection, no final XOR. The `crc` catalogue lists it as
//! `CRC_16_IBM_3740`. The same algorithm covers wire frames and VERIFY
//! read-backs, so a host can compute either with one routine.

use crc::{Crc, Digest, CRC_16_IBM_3740};

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the checksum of a byte range
pub fn checksum(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// Incremental checksum over data that arrives in pieces
///
/// Feeding the same bytes through any sequence of [`Checksum::update`] calls
/// yields the value [`checksum`] returns for their concatenation.
pub struct Checksum {
    digest: Digest<'static, u16>,
}

impl Checksum {
    /// Start a new checksum
    pub fn new() -> Self {
        Self {
            digest: CRC16.digest(),
        }
    }

    /// Fold more bytes into the checksum
    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// Finish and return the checksum value
    pub fn finalize(self) -> u16 {
        self.digest.finalize()
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_is_initial_value() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_single_bit_flip_changes_checksum() {
        let header = [0x01, 0x01, 0x00, 0x00];
        let reference = checksum(&header);
        for byte in 0..header.len() {
            for bit in 0..8 {
                let mut corrupted = header;
                corrupted[byte] ^= 1 << bit;
                assert_ne!(checksum(&corrupted), reference);
            }
        }
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: [u8; 37] = core::array::from_fn(|i| (i * 7 + 3) as u8);
        let mut sum = Checksum::new();
        sum.update(&data[..5]);
        sum.update(&[]);
        sum.update(&data[5..30]);
        sum.update(&data[30..]);
        assert_eq!(sum.finalize(), checksum(&data));
    }
}
