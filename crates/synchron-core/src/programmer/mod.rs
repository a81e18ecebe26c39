//! Flash driver seam
//!
//! The flash pipeline never touches a bus directly. It hands [`SpiCommand`]s
//! to an [`SpiMaster`], which may be a HAL SPI peripheral ([`HalSpiMaster`]),
//! an in-memory emulator, or a test mock.
//!
//! [`SpiCommand`]: crate::spi::SpiCommand

mod hal;
mod traits;

pub use hal::HalSpiMaster;
pub use traits::SpiMaster;
