//! Frame view and encoding

use super::{
    CHECKSUM_LEN, FRAME_OVERHEAD, HEADER_LEN, MAX_RESPONSE_PAYLOAD, PROTOCOL_VERSION, RSP_ERR,
    RSP_INFO, RSP_OK, RSP_VERIFY_RESULT, SYNC,
};
use crate::error::{Error, Result};
use crate::integrity::Checksum;
use heapless::Vec;

/// A checked frame borrowed from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Protocol revision
    pub version: u8,
    /// Command or response opcode
    pub command: u8,
    /// Payload bytes
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Checksum over version, command, length and payload
    pub fn checksum(&self) -> u16 {
        frame_checksum(self.version, self.command, self.payload)
    }

    /// Number of bytes this frame occupies on the wire
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Parse one complete frame from the start of `bytes`
    ///
    /// Returns the frame and the number of bytes it used. Host-side
    /// decoders and tests use this; the node itself goes through
    /// [`FrameAssembler`](super::FrameAssembler).
    pub fn parse(bytes: &'a [u8]) -> Result<(Self, usize)> {
        if bytes.len() < FRAME_OVERHEAD || bytes[..2] != SYNC {
            return Err(Error::InvalidPayload);
        }
        let len = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
        let total = len + FRAME_OVERHEAD;
        if bytes.len() < total {
            return Err(Error::BufferTooSmall);
        }
        let frame = Frame {
            version: bytes[2],
            command: bytes[3],
            payload: &bytes[HEADER_LEN..HEADER_LEN + len],
        };
        let sent = u16::from_be_bytes([bytes[total - 2], bytes[total - 1]]);
        let actual = frame.checksum();
        if sent != actual {
            return Err(Error::VerifyMismatch {
                expected: sent,
                actual,
            });
        }
        Ok((frame, total))
    }
}

pub(super) fn frame_checksum(version: u8, command: u8, payload: &[u8]) -> u16 {
    let len = payload.len() as u16;
    let mut sum = Checksum::new();
    sum.update(&[version, command]);
    sum.update(&len.to_be_bytes());
    sum.update(payload);
    sum.finalize()
}

/// Write a frame for `command` and `payload` into `buf`
///
/// Returns the number of bytes written.
pub fn encode_frame(buf: &mut [u8], command: u8, payload: &[u8]) -> Result<usize> {
    if payload.len() > u16::MAX as usize {
        return Err(Error::InvalidLength);
    }
    let total = payload.len() + FRAME_OVERHEAD;
    if buf.len() < total {
        return Err(Error::BufferTooSmall);
    }

    buf[..2].copy_from_slice(&SYNC);
    buf[2] = PROTOCOL_VERSION;
    buf[3] = command;
    buf[4..HEADER_LEN].copy_from_slice(&(payload.len() as u16).to_be_bytes());
    buf[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    let crc = frame_checksum(PROTOCOL_VERSION, command, payload);
    buf[total - CHECKSUM_LEN..total].copy_from_slice(&crc.to_be_bytes());
    Ok(total)
}

/// Reply produced by command dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response opcode
    pub opcode: u8,
    /// Response payload
    pub payload: Vec<u8, MAX_RESPONSE_PAYLOAD>,
}

impl Response {
    fn empty(opcode: u8) -> Self {
        Self {
            opcode,
            payload: Vec::new(),
        }
    }

    /// Success, no payload
    pub fn ok() -> Self {
        Self::empty(RSP_OK)
    }

    /// Failure, no payload
    pub fn err() -> Self {
        Self::empty(RSP_ERR)
    }

    /// Identity record
    pub fn info(record: &[u8]) -> Result<Self> {
        let payload = Vec::from_slice(record).map_err(|_| Error::BufferTooSmall)?;
        Ok(Self {
            opcode: RSP_INFO,
            payload,
        })
    }

    /// Checksum computed by VERIFY, big-endian
    pub fn verify_result(crc: u16) -> Self {
        let mut payload = Vec::new();
        payload.extend(crc.to_be_bytes());
        Self {
            opcode: RSP_VERIFY_RESULT,
            payload,
        }
    }

    /// True for the ERR opcode
    pub fn is_err(&self) -> bool {
        self.opcode == RSP_ERR
    }

    /// Encode as a frame into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        encode_frame(buf, self.opcode, &self.payload)
    }
}
