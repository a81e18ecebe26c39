//! Error types for synchron-core
//!
//! This module provides a no_std compatible error type that is shared by the
//! flash pipeline, the SPI command sequences and the protocol dispatcher.

use core::fmt;

/// Details about an erase failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseFailure {
    /// Erase command was rejected by the chip or the bus
    CommandFailed {
        /// Sector address where erase was attempted
        addr: u32,
    },
    /// The chip stayed busy past the rated sector erase time
    Timeout {
        /// Sector address where erase was attempted
        addr: u32,
    },
}

/// Details about a page program failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// The write would run past the end of its page
    PageBoundary {
        /// Requested start address
        addr: u32,
        /// Requested length
        len: usize,
    },
    /// The containing sector was not erased in this update session
    NotErased {
        /// Start address of the sector
        sector: u32,
    },
    /// The data needs a cleared bit to be set again, which only an erase can do
    BitConflict {
        /// Address of the first conflicting byte
        addr: u32,
        /// Byte currently stored in flash
        have: u8,
        /// Byte the write asked for
        want: u8,
    },
    /// The chip stayed busy past the rated page program time
    Timeout {
        /// Page address where the program was attempted
        addr: u32,
    },
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // SPI errors
    /// SPI transfer failed
    SpiTransferFailed,
    /// The chip did not answer on the bus in time
    SpiTimeout,
    /// Opcode is not supported by the flash driver
    OpcodeNotSupported,

    // Chip errors
    /// Flash chip not found (JEDEC ID read back as all zeros or all ones)
    ChipNotFound,
    /// JEDEC ID does not match expected value
    JedecIdMismatch,
    /// Write enable latch did not set after WREN
    WriteEnableFailed,

    // Operation errors
    /// Erase operation failed
    EraseError(EraseFailure),
    /// Write/program operation failed
    WriteError(WriteFailure),
    /// Read-back checksum differs from the expected value
    VerifyMismatch {
        /// Checksum supplied by the host
        expected: u16,
        /// Checksum computed from flash
        actual: u16,
    },
    /// Operation timed out
    Timeout,

    // Address/size errors
    /// Address is beyond flash chip size
    AddressOutOfBounds,
    /// Length is zero or larger than the operation allows
    InvalidLength,
    /// Provided buffer is too small for the operation
    BufferTooSmall,

    // Configuration errors
    /// Flash geometry is inconsistent or exceeds the tracking capacity
    InvalidGeometry,
    /// Slice width or rate bound is unusable
    InvalidSchedule,

    // Protocol errors
    /// Command payload has the wrong shape for its opcode
    InvalidPayload,
    /// Session metadata is out of range
    InvalidMetadata,
    /// Opcode has no handler
    UnknownCommand(u8),
    /// Identity string is too long or not plain printable ASCII
    InvalidIdentity,
}

impl fmt::Display for EraseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandFailed { addr } => {
                write!(f, "erase command failed at address 0x{:06X}", addr)
            }
            Self::Timeout { addr } => {
                write!(f, "erase timed out at address 0x{:06X}", addr)
            }
        }
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageBoundary { addr, len } => write!(
                f,
                "write of {} bytes at 0x{:06X} crosses a page boundary",
                len, addr
            ),
            Self::NotErased { sector } => {
                write!(f, "sector 0x{:06X} was not erased before writing", sector)
            }
            Self::BitConflict { addr, have, want } => write!(
                f,
                "write at 0x{:06X} needs bits set: have 0x{:02X}, want 0x{:02X}",
                addr, have, want
            ),
            Self::Timeout { addr } => {
                write!(f, "page program timed out at address 0x{:06X}", addr)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpiTransferFailed => write!(f, "SPI transfer failed"),
            Self::SpiTimeout => write!(f, "SPI operation timed out"),
            Self::OpcodeNotSupported => write!(f, "SPI opcode not supported by flash driver"),
            Self::ChipNotFound => write!(f, "flash chip not found"),
            Self::JedecIdMismatch => write!(f, "JEDEC ID mismatch"),
            Self::WriteEnableFailed => write!(f, "write enable latch not set"),
            Self::EraseError(failure) => write!(f, "{}", failure),
            Self::WriteError(failure) => write!(f, "{}", failure),
            Self::VerifyMismatch { expected, actual } => write!(
                f,
                "verify failed: expected checksum 0x{:04X}, computed 0x{:04X}",
                expected, actual
            ),
            Self::Timeout => write!(f, "operation timed out"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::InvalidLength => write!(f, "invalid length"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidGeometry => write!(f, "invalid flash geometry"),
            Self::InvalidSchedule => write!(f, "invalid slice schedule"),
            Self::InvalidPayload => write!(f, "malformed command payload"),
            Self::InvalidMetadata => write!(f, "session metadata out of range"),
            Self::UnknownCommand(cmd) => write!(f, "unknown command 0x{:02X}", cmd),
            Self::InvalidIdentity => write!(f, "invalid node identity string"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
