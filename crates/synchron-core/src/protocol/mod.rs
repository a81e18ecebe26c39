//! Flash chip command sequences
//!
//! This module contains the JEDEC SPI25 command sequences the flash pipeline
//! is built from.

pub mod spi25;

pub use spi25::*;
