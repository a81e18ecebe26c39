//! Serial port link

use crate::error::{LinkError, Result};
use crate::readahead::ReadAhead;
use crate::DEFAULT_BAUD;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::time::Duration;
use synchron_core::transport::Transport;

/// Serial port transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    rx: ReadAhead,
}

impl SerialTransport {
    /// Open a serial port
    ///
    /// `baud` defaults to 115200. `poll_timeout` bounds how long
    /// [`poll_byte`](Transport::poll_byte) waits when no byte is pending.
    pub fn open(device: &str, baud: Option<u32>, poll_timeout: Duration) -> Result<Self> {
        let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

        let port = serialport::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(poll_timeout)
            .open()?;

        log::info!("Opened serial port {} at {} baud", device, baud_rate);

        Ok(Self {
            port,
            rx: ReadAhead::new(),
        })
    }

    /// Drop anything buffered in either direction
    pub fn clear(&mut self) -> Result<()> {
        self.rx.clear();
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

impl Transport for SerialTransport {
    type Error = LinkError;

    fn poll_byte(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.rx.pop() {
            return Ok(Some(byte));
        }
        // A UART has no end of stream; zero bytes is just silence
        self.rx.fill(&mut self.port)?;
        Ok(self.rx.pop())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}
