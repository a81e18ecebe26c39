//! Framed command protocol between host and node
//!
//! Every message on the link, in both directions, is one frame:
//!
//! ```text
//! [0xAA][0x55][version][command][len_hi][len_lo][payload..][crc_hi][crc_lo]
//! ```
//!
//! Multi-byte fields are big-endian. The checksum covers everything from
//! `version` to the end of the payload.
//!
//! - [`FrameAssembler`] rebuilds frames from an unreliable byte stream
//! - [`ProtocolEngine`] validates and dispatches them and builds responses

mod assembler;
mod engine;
mod frame;

pub use assembler::{AssemblerState, AssemblerStats, Assembled, FrameAssembler};
pub use engine::{EngineStats, Identity, ProtocolEngine, SessionMeta, DEFAULT_TARGET};
pub use frame::{encode_frame, Frame, Response};

/// Two-byte marker that opens every frame
pub const SYNC: [u8; 2] = [0xAA, 0x55];

/// Protocol revision carried in the version byte
pub const PROTOCOL_VERSION: u8 = 1;

/// Sync, version, command and length
pub const HEADER_LEN: usize = 6;

/// Trailing checksum
pub const CHECKSUM_LEN: usize = 2;

/// Bytes a frame adds around its payload
pub const FRAME_OVERHEAD: usize = HEADER_LEN + CHECKSUM_LEN;

/// Largest payload the node accepts
pub const MAX_PAYLOAD: usize = 4096;

/// Receive buffer size: one maximal frame
pub const RX_CAPACITY: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

/// Largest response payload the node produces
pub const MAX_RESPONSE_PAYLOAD: usize = 128;

/// Encoded size of the largest response frame
pub const MAX_RESPONSE_FRAME: usize = MAX_RESPONSE_PAYLOAD + FRAME_OVERHEAD;

/// Largest pixel count accepted by SET_META
pub const MAX_PIXELS: u16 = 1000;

/// Bytes per pixel in a LIVE_FRAME (brightness, blue, green, red)
pub const BYTES_PER_PIXEL: usize = 4;

// Command opcodes
/// Report node identity
pub const CMD_HELLO: u8 = 0x01;
/// Erase the flash sector containing an address
pub const CMD_ERASE: u8 = 0x10;
/// Program up to one flash page
pub const CMD_WRITE: u8 = 0x11;
/// Checksum a flash region
pub const CMD_VERIFY: u8 = 0x12;
/// Set slice and pixel counts for live frames
pub const CMD_SET_META: u8 = 0x13;
/// Arm the renderer and close the update session
pub const CMD_START: u8 = 0x14;
/// Pixel data for one slice; never answered
pub const CMD_LIVE_FRAME: u8 = 0x21;

// Response opcodes
/// Command succeeded
pub const RSP_OK: u8 = 0x80;
/// Command failed or opcode unknown
pub const RSP_ERR: u8 = 0x81;
/// Identity record
pub const RSP_INFO: u8 = 0x82;
/// Computed flash checksum
pub const RSP_VERIFY_RESULT: u8 = 0x83;

/// Human readable name of a command opcode
pub fn command_name(opcode: u8) -> &'static str {
    match opcode {
        CMD_HELLO => "HELLO",
        CMD_ERASE => "ERASE",
        CMD_WRITE => "WRITE",
        CMD_VERIFY => "VERIFY",
        CMD_SET_META => "SET_META",
        CMD_START => "START",
        CMD_LIVE_FRAME => "LIVE_FRAME",
        _ => "unknown",
    }
}
