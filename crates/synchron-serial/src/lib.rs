//! synchron-serial - Host links for the blade node
//!
//! Implementations of [`synchron_core::transport::Transport`] on top of the
//! operating system:
//!
//! - [`SerialTransport`] - a UART behind a serial device (8N1, no flow control)
//! - [`TcpTransport`] - a TCP socket, either listening for the host or
//!   connecting out to it
//!
//! Both poll with a short timeout and keep a small read-ahead buffer, so
//! `poll_byte` costs one system call per burst rather than per byte.

pub mod error;
mod readahead;
pub mod serial;
pub mod tcp;

pub use error::{LinkError, Result};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

/// Baud rate used when none is configured
pub const DEFAULT_BAUD: u32 = 115_200;
