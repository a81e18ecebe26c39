//! Byte stream to frame reassembly

use super::frame::{frame_checksum, Frame};
use super::{FRAME_OVERHEAD, HEADER_LEN, PROTOCOL_VERSION, RX_CAPACITY, SYNC};
use heapless::Vec;

/// Where the assembler is within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// Looking for the sync marker
    AwaitingSync,
    /// Marker seen, header incomplete
    AwaitingHeader,
    /// Header read, payload incomplete
    AwaitingPayload,
    /// Payload read, checksum incomplete
    AwaitingChecksum,
}

/// Outcome of feeding one byte
#[derive(Debug, PartialEq, Eq)]
pub enum Assembled<'a> {
    /// More bytes needed
    Pending,
    /// A frame arrived whose checksum did not match; it was discarded
    Corrupt,
    /// A frame passed its checksum
    Frame(Frame<'a>),
}

/// Counters kept by the assembler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Frames that passed the checksum
    pub frames_ok: u32,
    /// Complete frames dropped for a checksum mismatch
    pub crc_errors: u32,
    /// Bytes skipped while hunting for the sync marker
    pub resync_bytes: u32,
    /// Headers announcing a frame larger than the receive buffer
    pub overflows: u32,
}

/// Rebuilds frames from a byte stream that may contain noise
///
/// The buffer holds at most one frame attempt. A bad marker, an unsupported
/// version or an oversized length drops the first buffered byte and the scan
/// restarts, so a real frame hidden behind noise is still found. A complete
/// frame is handed out by reference; the buffer is cleared on the next push.
pub struct FrameAssembler<const N: usize = RX_CAPACITY> {
    buf: Vec<u8, N>,
    consumed: bool,
    stats: AssemblerStats,
}

impl<const N: usize> FrameAssembler<N> {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            consumed: false,
            stats: AssemblerStats::default(),
        }
    }

    /// Counters since creation
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Bytes currently buffered
    pub fn buffered(&self) -> usize {
        if self.consumed {
            0
        } else {
            self.buf.len()
        }
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buf.clear();
        self.consumed = false;
    }

    /// Current position within the frame
    pub fn state(&self) -> AssemblerState {
        let len = self.buffered();
        if len < SYNC.len() {
            return AssemblerState::AwaitingSync;
        }
        if len < HEADER_LEN {
            return AssemblerState::AwaitingHeader;
        }
        let total = self.frame_len();
        if len < total - 2 {
            AssemblerState::AwaitingPayload
        } else {
            AssemblerState::AwaitingChecksum
        }
    }

    /// Append one byte
    pub fn push(&mut self, byte: u8) -> Assembled<'_> {
        if self.consumed {
            self.reset();
        }
        if self.buf.push(byte).is_err() {
            // Only a buffer shorter than a header gets here
            self.stats.overflows += 1;
            self.buf.clear();
            return Assembled::Pending;
        }

        let Some(total) = self.scan() else {
            return Assembled::Pending;
        };

        self.consumed = true;
        let sent = u16::from_be_bytes([self.buf[total - 2], self.buf[total - 1]]);
        let frame = Frame {
            version: self.buf[2],
            command: self.buf[3],
            payload: &self.buf[HEADER_LEN..total - 2],
        };
        if frame_checksum(frame.version, frame.command, frame.payload) != sent {
            log::debug!(
                "Dropping frame 0x{:02X} ({} bytes): checksum mismatch",
                frame.command,
                total
            );
            self.stats.crc_errors += 1;
            return Assembled::Corrupt;
        }

        self.stats.frames_ok += 1;
        Assembled::Frame(frame)
    }

    /// Resynchronize until the buffer starts with a plausible frame;
    /// returns its length once all of it is buffered
    fn scan(&mut self) -> Option<usize> {
        loop {
            if self.buf.len() < SYNC.len() {
                return None;
            }
            if self.buf[..2] != SYNC {
                self.slide();
                continue;
            }
            if self.buf.len() < HEADER_LEN {
                return None;
            }

            let total = self.frame_len();
            if self.buf[2] != PROTOCOL_VERSION {
                log::trace!("Ignoring marker with version {}", self.buf[2]);
                self.slide();
                continue;
            }
            if total > N {
                log::debug!("Frame of {} bytes exceeds receive buffer", total);
                self.stats.overflows += 1;
                self.slide();
                continue;
            }

            return (self.buf.len() >= total).then_some(total);
        }
    }

    fn frame_len(&self) -> usize {
        u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize + FRAME_OVERHEAD
    }

    fn slide(&mut self) {
        let len = self.buf.len();
        self.buf.copy_within(1.., 0);
        self.buf.truncate(len - 1);
        self.stats.resync_bytes += 1;
    }
}

impl<const N: usize> Default for FrameAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_frame;

    fn frame_bytes(command: u8, payload: &[u8]) -> ([u8; 64], usize) {
        let mut buf = [0u8; 64];
        let n = encode_frame(&mut buf, command, payload).unwrap();
        (buf, n)
    }

    /// Feed bytes and collect the command of each frame that completes
    fn feed<const N: usize>(asm: &mut FrameAssembler<N>, bytes: &[u8]) -> std::vec::Vec<u8> {
        let mut commands = std::vec::Vec::new();
        for &b in bytes {
            if let Assembled::Frame(frame) = asm.push(b) {
                commands.push(frame.command);
            }
        }
        commands
    }

    #[test]
    fn test_single_frame() {
        let mut asm: FrameAssembler = FrameAssembler::new();
        let (bytes, n) = frame_bytes(0x11, &[1, 2, 3]);

        for &b in &bytes[..n - 1] {
            assert_eq!(asm.push(b), Assembled::Pending);
        }
        match asm.push(bytes[n - 1]) {
            Assembled::Frame(frame) => {
                assert_eq!(frame.version, 1);
                assert_eq!(frame.command, 0x11);
                assert_eq!(frame.payload, &[1, 2, 3]);
            }
            other => panic!("expected frame, got {:?}", other),
        }
        assert_eq!(asm.buffered(), 0);
        assert_eq!(asm.stats().frames_ok, 1);
    }

    #[test]
    fn test_states() {
        let mut asm: FrameAssembler = FrameAssembler::new();
        let (bytes, _) = frame_bytes(0x11, &[9, 9]);
        assert_eq!(asm.state(), AssemblerState::AwaitingSync);
        asm.push(bytes[0]);
        assert_eq!(asm.state(), AssemblerState::AwaitingSync);
        asm.push(bytes[1]);
        assert_eq!(asm.state(), AssemblerState::AwaitingHeader);
        for &b in &bytes[2..7] {
            asm.push(b);
        }
        assert_eq!(asm.state(), AssemblerState::AwaitingPayload);
        asm.push(bytes[7]);
        assert_eq!(asm.state(), AssemblerState::AwaitingChecksum);
    }

    #[test]
    fn test_noise_before_frame() {
        let mut asm: FrameAssembler = FrameAssembler::new();
        let noise = [0x00, 0xAA, 0xAA, 0x13, 0x55, 0xFF, 0xAA];
        assert!(feed(&mut asm, &noise).is_empty());

        let (bytes, n) = frame_bytes(0x01, &[]);
        assert_eq!(feed(&mut asm, &bytes[..n]), [0x01]);
        assert_eq!(asm.stats().resync_bytes, noise.len() as u32);
    }

    #[test]
    fn test_false_marker_inside_noise() {
        let mut asm: FrameAssembler = FrameAssembler::new();
        // A marker followed by a bogus version must not swallow the real frame
        let mut stream = std::vec![0xAA, 0x55, 0x07];
        let (bytes, n) = frame_bytes(0x01, &[]);
        stream.extend_from_slice(&bytes[..n]);
        assert_eq!(feed(&mut asm, &stream), [0x01]);
    }

    #[test]
    fn test_corrupt_frame_is_dropped() {
        let (bytes, n) = frame_bytes(0x01, &[]);
        for i in 2..n {
            let mut corrupted = bytes;
            corrupted[i] ^= 0x40;
            let mut asm: FrameAssembler = FrameAssembler::new();
            let got = feed(&mut asm, &corrupted[..n]);
            assert!(got.is_empty(), "byte {} corrupted still dispatched", i);
        }
    }

    #[test]
    fn test_checksum_failure_then_good_frame() {
        let mut asm: FrameAssembler = FrameAssembler::new();
        let (mut bad, n) = frame_bytes(0x10, &[0, 0, 0, 0]);
        bad[n - 1] ^= 0xFF;
        let corrupt = bad[..n]
            .iter()
            .filter(|&&b| asm.push(b) == Assembled::Corrupt)
            .count();
        assert_eq!(corrupt, 1);
        assert_eq!(asm.stats().crc_errors, 1);

        let (good, n) = frame_bytes(0x14, &[]);
        assert_eq!(feed(&mut asm, &good[..n]), [0x14]);
    }

    #[test]
    fn test_oversized_header_is_sync_loss() {
        let mut asm: FrameAssembler<32> = FrameAssembler::new();
        // Announces 100 payload bytes, more than 32 can hold
        let mut stream = std::vec![0xAA, 0x55, 0x01, 0x11, 0x00, 0x64];
        let (bytes, n) = frame_bytes(0x01, &[]);
        stream.extend_from_slice(&bytes[..n]);
        assert_eq!(feed(&mut asm, &stream), [0x01]);
        assert_eq!(asm.stats().overflows, 1);
    }

    #[test]
    fn test_buffer_shorter_than_header() {
        let mut asm: FrameAssembler<4> = FrameAssembler::new();
        for byte in [0xAA, 0x55, 0x01, 0x01] {
            assert_eq!(asm.push(byte), Assembled::Pending);
        }
        assert_eq!(asm.buffered(), 4);

        assert_eq!(asm.push(0x00), Assembled::Pending);
        assert_eq!(asm.stats().overflows, 1);
        assert_eq!(asm.buffered(), 0);

        asm.push(0xAA);
        assert_eq!(asm.buffered(), 1);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut asm: FrameAssembler = FrameAssembler::new();
        let mut stream = std::vec::Vec::new();
        for cmd in [0x01u8, 0x13, 0x14] {
            let (bytes, n) = frame_bytes(cmd, &[cmd; 4]);
            stream.extend_from_slice(&bytes[..n]);
        }
        assert_eq!(feed(&mut asm, &stream), [0x01, 0x13, 0x14]);
    }
}
