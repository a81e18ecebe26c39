//! SPI types and command structures
//!
//! This module provides types for representing SPI transactions, the status
//! register, and the JEDEC opcodes used by the flash pipeline.

mod address;
mod command;
pub mod opcodes;
mod status;

pub use address::AddressWidth;
pub use command::{SpiCommand, MAX_HEADER_LEN};
pub use status::StatusRegister;
