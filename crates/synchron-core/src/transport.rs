//! Byte link to the host
//!
//! The control loop never blocks on the link: [`Transport::poll_byte`]
//! returns immediately (or after a very short timeout) whether or not a byte
//! is waiting.

use core::fmt::Debug;
use embedded_io::{Read, ReadReady, Write};

/// Non-blocking byte transport
pub trait Transport {
    /// Link error type
    type Error: Debug;

    /// Take the next inbound byte if one is available
    fn poll_byte(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Send bytes to the host
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn poll_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        (**self).poll_byte()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).write_bytes(bytes)
    }
}

/// Transport over an `embedded-io` port such as a HAL UART
pub struct IoTransport<P> {
    port: P,
}

impl<P> IoTransport<P> {
    /// Wrap a port
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Return the wrapped port
    pub fn release(self) -> P {
        self.port
    }
}

impl<P: Read + ReadReady + Write> Transport for IoTransport<P> {
    type Error = P::Error;

    fn poll_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        if !self.port.read_ready()? {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_io::ErrorType;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Default)]
    struct LoopbackPort {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
    }

    impl ErrorType for LoopbackPort {
        type Error = Infallible;
    }

    impl Read for LoopbackPort {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let mut n = 0;
            while n < buf.len() {
                match self.rx.pop_front() {
                    Some(b) => buf[n] = b,
                    None => break,
                }
                n += 1;
            }
            Ok(n)
        }
    }

    impl ReadReady for LoopbackPort {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.rx.is_empty())
        }
    }

    impl Write for LoopbackPort {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_poll_is_non_blocking() {
        let mut link = IoTransport::new(LoopbackPort::default());
        assert_eq!(link.poll_byte(), Ok(None));
    }

    #[test]
    fn test_bytes_in_order() {
        let mut port = LoopbackPort::default();
        port.rx.extend([0xAA, 0x55]);
        let mut link = IoTransport::new(port);
        assert_eq!(link.poll_byte(), Ok(Some(0xAA)));
        assert_eq!(link.poll_byte(), Ok(Some(0x55)));
        assert_eq!(link.poll_byte(), Ok(None));

        link.write_bytes(&[1, 2, 3]).unwrap();
        (&mut link).write_bytes(&[4]).unwrap();
        assert_eq!(link.release().tx, [1, 2, 3, 4]);
    }
}
