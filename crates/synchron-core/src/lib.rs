//! synchron-core - Control core of a rotating LED blade node
//!
//! This crate provides the three real-time responsibilities of a blade node
//! controller. It is `no_std` compatible and allocation free, so the same code
//! runs on the microcontroller and in host-side tests.
//!
//! - [`wire`] - framed command protocol: byte-stream reassembly, integrity
//!   check, command dispatch and response framing
//! - [`flash`] - erase/write/verify pipeline against an external SPI NOR chip
//! - [`slice`] - rotation angle to slice index conversion with one-shot
//!   crossing events
//!
//! Supporting modules carry the SPI transaction types ([`spi`]), the flash
//! driver seam ([`programmer`]), the JEDEC command sequences ([`protocol`]),
//! the CRC ([`integrity`]) and the control loop wiring ([`node`]).
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for the crate error type
//!
//! # Example
//!
//! ```ignore
//! use synchron_core::node::BladeNode;
//!
//! let mut node = BladeNode::new(engine, scheduler, link, sensor);
//! node.startup();
//! loop {
//!     node.run_once();
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod error;
pub mod flash;
pub mod integrity;
pub mod node;
pub mod programmer;
pub mod protocol;
pub mod slice;
pub mod spi;
pub mod transport;
pub mod wire;

pub use error::{Error, Result};
