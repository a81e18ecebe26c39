//! TCP socket link

use crate::error::{LinkError, Result};
use crate::readahead::ReadAhead;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;
use synchron_core::transport::Transport;

/// TCP socket transport
///
/// In listening mode the transport accepts one host at a time without
/// blocking: until a host connects, polls return nothing and responses are
/// dropped. When the host disconnects the next one may connect.
pub struct TcpTransport {
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
    poll_timeout: Duration,
    rx: ReadAhead,
}

impl TcpTransport {
    /// Listen for a host on `addr`
    pub fn listen<A: ToSocketAddrs>(addr: A, poll_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| LinkError::ConnectionFailed(format!("Failed to bind: {}", e)))?;
        listener.set_nonblocking(true)?;
        log::info!("Waiting for host on {}", listener.local_addr()?);

        Ok(Self {
            listener: Some(listener),
            stream: None,
            poll_timeout,
            rx: ReadAhead::new(),
        })
    }

    /// Connect out to a host at `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A, poll_timeout: Duration) -> Result<Self> {
        let stream =
            TcpStream::connect(addr).map_err(|e| LinkError::ConnectionFailed(e.to_string()))?;
        log::info!("Connected to host at {}", stream.peer_addr()?);

        let mut transport = Self {
            listener: None,
            stream: None,
            poll_timeout,
            rx: ReadAhead::new(),
        };
        transport.attach(stream)?;
        Ok(transport)
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match (&self.listener, &self.stream) {
            (Some(listener), _) => Ok(listener.local_addr()?),
            (None, Some(stream)) => Ok(stream.local_addr()?),
            (None, None) => Err(LinkError::Closed),
        }
    }

    /// True while a host is attached
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn attach(&mut self, stream: TcpStream) -> Result<()> {
        // Frames are small; send them as soon as they are written
        stream.set_nodelay(true)?;
        if self.poll_timeout.is_zero() {
            stream.set_nonblocking(true)?;
        } else {
            stream.set_nonblocking(false)?;
            stream.set_read_timeout(Some(self.poll_timeout))?;
        }
        self.rx.clear();
        self.stream = Some(stream);
        Ok(())
    }

    fn accept(&mut self) -> Result<()> {
        let Some(listener) = &self.listener else {
            return Ok(());
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("Host connected from {}", peer);
                self.attach(stream)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Transport for TcpTransport {
    type Error = LinkError;

    fn poll_byte(&mut self) -> Result<Option<u8>> {
        if let Some(byte) = self.rx.pop() {
            return Ok(Some(byte));
        }

        if self.stream.is_none() {
            self.accept()?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match self.rx.fill(stream)? {
            Some(0) => {
                log::info!("Host disconnected");
                self.stream = None;
                if self.listener.is_some() {
                    Ok(None)
                } else {
                    Err(LinkError::Closed)
                }
            }
            _ => Ok(self.rx.pop()),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            log::debug!("No host attached, dropping {} bytes", bytes.len());
            return Ok(());
        };
        // Nonblocking sockets may refuse part of a write; retry until done
        let mut rest = bytes;
        while !rest.is_empty() {
            match stream.write(rest) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => rest = &rest[n..],
                Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn poll_until<T: Transport>(link: &mut T, count: usize) -> Vec<u8> {
        let mut got = Vec::new();
        for _ in 0..1000 {
            if let Ok(Some(byte)) = link.poll_byte() {
                got.push(byte);
                if got.len() == count {
                    break;
                }
            }
        }
        got
    }

    #[test]
    fn test_listen_without_host() {
        let mut link = TcpTransport::listen("127.0.0.1:0", Duration::from_millis(1)).unwrap();
        assert!(link.poll_byte().unwrap().is_none());
        assert!(!link.is_connected());
        link.write_bytes(&[1, 2, 3]).unwrap();
    }

    #[test]
    fn test_host_exchange() {
        let mut link = TcpTransport::listen("127.0.0.1:0", Duration::from_millis(1)).unwrap();
        let addr = link.local_addr().unwrap();

        let mut host = TcpStream::connect(addr).unwrap();
        host.write_all(&[0xAA, 0x55, 0x01]).unwrap();
        assert_eq!(poll_until(&mut link, 3), [0xAA, 0x55, 0x01]);

        link.write_bytes(&[0x80]).unwrap();
        let mut reply = [0u8; 1];
        host.read_exact(&mut reply).unwrap();
        assert_eq!(reply, [0x80]);
    }

    #[test]
    fn test_connect_to_host() {
        let host = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut link =
            TcpTransport::connect(host.local_addr().unwrap(), Duration::from_millis(1)).unwrap();
        assert!(link.is_connected());
        let (mut peer, _) = host.accept().unwrap();

        peer.write_all(&[0x01, 0x02]).unwrap();
        assert_eq!(poll_until(&mut link, 2), [0x01, 0x02]);

        link.write_bytes(&[0x81]).unwrap();
        let mut reply = [0u8; 1];
        peer.read_exact(&mut reply).unwrap();
        assert_eq!(reply, [0x81]);

        drop(peer);
        let closed = (0..1000).any(|_| matches!(link.poll_byte(), Err(LinkError::Closed)));
        assert!(closed);
        assert!(!link.is_connected());
    }
}
