use std::io::{self, ErrorKind, Read};

const READAHEAD_LEN: usize = 256;

/// Bytes read from the OS but not yet handed to the engine
pub(crate) struct ReadAhead {
    buf: [u8; READAHEAD_LEN],
    pos: usize,
    len: usize,
}

impl ReadAhead {
    pub(crate) fn new() -> Self {
        Self {
            buf: [0; READAHEAD_LEN],
            pos: 0,
            len: 0,
        }
    }

    pub(crate) fn pop(&mut self) -> Option<u8> {
        if self.pos < self.len {
            let byte = self.buf[self.pos];
            self.pos += 1;
            Some(byte)
        } else {
            None
        }
    }

    /// Refill from `source`; `Ok(None)` when nothing arrived within its
    /// timeout, `Ok(Some(0))` on end of stream
    pub(crate) fn fill<R: Read + ?Sized>(&mut self, source: &mut R) -> io::Result<Option<usize>> {
        self.pos = 0;
        self.len = 0;
        match source.read(&mut self.buf) {
            Ok(n) => {
                self.len = n;
                Ok(Some(n))
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.pos = 0;
        self.len = 0;
    }
}
