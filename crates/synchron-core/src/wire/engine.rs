//! Command dispatch

use super::assembler::{Assembled, FrameAssembler};
use super::frame::{Frame, Response};
use super::{
    command_name, BYTES_PER_PIXEL, CMD_ERASE, CMD_HELLO, CMD_LIVE_FRAME, CMD_SET_META, CMD_START,
    CMD_VERIFY, CMD_WRITE, MAX_PIXELS, MAX_RESPONSE_PAYLOAD, PROTOCOL_VERSION, RX_CAPACITY,
};
use crate::error::{Error, Result};
use crate::flash::FlashPipeline;
use crate::node::Renderer;
use crate::programmer::SpiMaster;
use core::fmt::Write as _;
use heapless::String;

/// Longest target or firmware string in the identity record
pub const MAX_IDENTITY_LEN: usize = 32;

/// What HELLO reports about this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    target: String<MAX_IDENTITY_LEN>,
    firmware: String<MAX_IDENTITY_LEN>,
}

impl Identity {
    /// Build an identity; both strings must be printable ASCII without
    /// quotes or backslashes so they embed in the JSON record verbatim
    pub fn new(target: &str, firmware: &str) -> Result<Self> {
        Ok(Self {
            target: identity_field(target)?,
            firmware: identity_field(firmware)?,
        })
    }

    /// Node role, e.g. `blade`
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Firmware version string
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    /// JSON identity record sent in the INFO response
    pub fn record(&self) -> Result<String<MAX_RESPONSE_PAYLOAD>> {
        let mut out = String::new();
        write!(
            out,
            "{{\"target\":\"{}\",\"fw\":\"{}\",\"proto\":{}}}",
            self.target, self.firmware, PROTOCOL_VERSION
        )
        .map_err(|_| Error::BufferTooSmall)?;
        Ok(out)
    }
}

/// Target reported when none is configured
pub const DEFAULT_TARGET: &str = "blade";

/// Firmware string used when the crate version does not fit the record
const FALLBACK_FIRMWARE: &str = "unknown";

impl Default for Identity {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET, env!("CARGO_PKG_VERSION"))
            .or_else(|_| Self::new(DEFAULT_TARGET, FALLBACK_FIRMWARE))
            .unwrap_or_else(|_| Self {
                target: String::new(),
                firmware: String::new(),
            })
    }
}

fn identity_field(value: &str) -> Result<String<MAX_IDENTITY_LEN>> {
    let printable = value
        .bytes()
        .all(|b| (0x20..0x7F).contains(&b) && b != b'"' && b != b'\\');
    if value.is_empty() || !printable {
        return Err(Error::InvalidIdentity);
    }
    let mut field = String::new();
    field.push_str(value).map_err(|_| Error::InvalidIdentity)?;
    Ok(field)
}

/// Layout of LIVE_FRAME payloads, set by SET_META
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMeta {
    /// Slices per revolution the host renders
    pub slice_count: u16,
    /// Pixels per slice
    pub pixel_count: u16,
}

impl SessionMeta {
    /// Decode `[slice_count:u16][pixel_count:u16]`
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let [s0, s1, p0, p1] = payload else {
            return Err(Error::InvalidPayload);
        };
        let meta = Self {
            slice_count: u16::from_be_bytes([*s0, *s1]),
            pixel_count: u16::from_be_bytes([*p0, *p1]),
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Slice count must split a revolution evenly; pixel count must fit a frame
    pub fn validate(&self) -> Result<()> {
        if !(1..=360).contains(&self.slice_count) || 360 % self.slice_count != 0 {
            return Err(Error::InvalidMetadata);
        }
        if !(1..=MAX_PIXELS).contains(&self.pixel_count) {
            return Err(Error::InvalidMetadata);
        }
        Ok(())
    }

    /// Payload length of a LIVE_FRAME under this layout
    pub fn live_frame_len(&self) -> usize {
        2 + self.pixel_count as usize * BYTES_PER_PIXEL
    }
}

/// Counters for link diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames that passed the checksum
    pub frames_ok: u32,
    /// Frames dropped for a checksum mismatch
    pub crc_errors: u32,
    /// Bytes skipped while resynchronizing
    pub resync_bytes: u32,
    /// Headers larger than the receive buffer
    pub overflows: u32,
    /// Response frames produced
    pub responses: u32,
    /// LIVE_FRAMEs forwarded to the renderer
    pub live_frames: u32,
}

/// Protocol engine: reassembles frames and dispatches commands
///
/// Owns the flash pipeline and the renderer; a dispatched command runs to
/// completion before the next byte is consumed. Flash commands block for up
/// to their rated timeouts, so an update session and live rendering should
/// not overlap.
pub struct ProtocolEngine<M, R, const N: usize = RX_CAPACITY> {
    assembler: FrameAssembler<N>,
    dispatcher: Dispatcher<M, R>,
}

struct Dispatcher<M, R> {
    flash: FlashPipeline<M>,
    renderer: R,
    identity: Identity,
    meta: Option<SessionMeta>,
    armed: bool,
    responses: u32,
    live_frames: u32,
}

impl<M: SpiMaster, R: Renderer, const N: usize> ProtocolEngine<M, R, N> {
    /// Create an engine in the idle state
    pub fn new(flash: FlashPipeline<M>, renderer: R, identity: Identity) -> Self {
        Self {
            assembler: FrameAssembler::new(),
            dispatcher: Dispatcher {
                flash,
                renderer,
                identity,
                meta: None,
                armed: false,
                responses: 0,
                live_frames: 0,
            },
        }
    }

    /// Consume one inbound byte; returns the response if it completed a
    /// command frame that warrants one
    pub fn push_byte(&mut self, byte: u8) -> Option<Response> {
        match self.assembler.push(byte) {
            Assembled::Frame(frame) => self.dispatcher.dispatch(&frame),
            Assembled::Pending | Assembled::Corrupt => None,
        }
    }

    /// Consume a chunk of inbound bytes, handing each response to `on_response`
    pub fn feed<F: FnMut(Response)>(&mut self, bytes: &[u8], mut on_response: F) {
        for &byte in bytes {
            if let Some(response) = self.push_byte(byte) {
                on_response(response);
            }
        }
    }

    /// Counters since creation
    pub fn stats(&self) -> EngineStats {
        let rx = self.assembler.stats();
        EngineStats {
            frames_ok: rx.frames_ok,
            crc_errors: rx.crc_errors,
            resync_bytes: rx.resync_bytes,
            overflows: rx.overflows,
            responses: self.dispatcher.responses,
            live_frames: self.dispatcher.live_frames,
        }
    }

    /// Node identity
    pub fn identity(&self) -> &Identity {
        &self.dispatcher.identity
    }

    /// Metadata from the last valid SET_META
    pub fn meta(&self) -> Option<SessionMeta> {
        self.dispatcher.meta
    }

    /// True once START has been received
    pub fn is_armed(&self) -> bool {
        self.dispatcher.armed
    }

    /// The flash pipeline
    pub fn flash(&self) -> &FlashPipeline<M> {
        &self.dispatcher.flash
    }

    /// The flash pipeline, mutably
    pub fn flash_mut(&mut self) -> &mut FlashPipeline<M> {
        &mut self.dispatcher.flash
    }

    /// The renderer
    pub fn renderer(&self) -> &R {
        &self.dispatcher.renderer
    }

    /// The renderer, mutably
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.dispatcher.renderer
    }
}

impl<M: SpiMaster, R: Renderer> Dispatcher<M, R> {
    fn dispatch(&mut self, frame: &Frame<'_>) -> Option<Response> {
        log::debug!(
            "{} ({} byte payload)",
            command_name(frame.command),
            frame.payload.len()
        );

        let result = match frame.command {
            CMD_HELLO => self.hello(),
            CMD_ERASE => self.erase(frame.payload),
            CMD_WRITE => self.write(frame.payload),
            CMD_VERIFY => self.verify(frame.payload),
            CMD_SET_META => self.set_meta(frame.payload),
            CMD_START => Ok(self.start()),
            CMD_LIVE_FRAME => {
                self.live_frame(frame.payload);
                return None;
            }
            other => Err(Error::UnknownCommand(other)),
        };

        self.responses += 1;
        match result {
            Ok(response) => Some(response),
            Err(e) => {
                log::warn!("{} failed: {}", command_name(frame.command), e);
                Some(Response::err())
            }
        }
    }

    fn hello(&self) -> Result<Response> {
        let record = self.identity.record()?;
        Response::info(record.as_bytes())
    }

    fn erase(&mut self, payload: &[u8]) -> Result<Response> {
        let [a0, a1, a2, a3] = payload else {
            return Err(Error::InvalidPayload);
        };
        let addr = u32::from_be_bytes([*a0, *a1, *a2, *a3]);
        self.flash.erase_sector(addr)?;
        Ok(Response::ok())
    }

    fn write(&mut self, payload: &[u8]) -> Result<Response> {
        if payload.len() <= 4 {
            return Err(Error::InvalidPayload);
        }
        let (addr, data) = payload.split_at(4);
        let addr = u32::from_be_bytes([addr[0], addr[1], addr[2], addr[3]]);
        self.flash.write_page(addr, data)?;
        Ok(Response::ok())
    }

    fn verify(&mut self, payload: &[u8]) -> Result<Response> {
        let (region, expected) = match payload.len() {
            0 => (None, None),
            2 => (None, Some(be16(payload))),
            8 => (Some((be32(payload), be32(&payload[4..]))), None),
            10 => (
                Some((be32(payload), be32(&payload[4..]))),
                Some(be16(&payload[8..])),
            ),
            _ => return Err(Error::InvalidPayload),
        };

        let (addr, len) = match region {
            Some(region) => region,
            None => self.flash.written_span().ok_or(Error::InvalidLength)?,
        };

        let actual = self.flash.checksum_region(addr, len)?;
        log::info!(
            "Verified 0x{:06X}..0x{:06X}: checksum 0x{:04X}",
            addr,
            addr as u64 + len as u64,
            actual
        );
        match expected {
            Some(expected) if expected != actual => {
                Err(Error::VerifyMismatch { expected, actual })
            }
            _ => Ok(Response::verify_result(actual)),
        }
    }

    fn set_meta(&mut self, payload: &[u8]) -> Result<Response> {
        let meta = SessionMeta::parse(payload)?;
        log::info!(
            "Session: {} slices, {} pixels",
            meta.slice_count,
            meta.pixel_count
        );
        self.meta = Some(meta);
        Ok(Response::ok())
    }

    fn start(&mut self) -> Response {
        self.flash.end_session();
        self.renderer.arm();
        self.armed = true;
        log::info!("Renderer armed");
        Response::ok()
    }

    fn live_frame(&mut self, payload: &[u8]) {
        let Some(meta) = self.meta.filter(|_| self.armed) else {
            log::debug!("LIVE_FRAME before SET_META and START, dropped");
            return;
        };
        if payload.len() != meta.live_frame_len() {
            log::debug!(
                "LIVE_FRAME of {} bytes, expected {}",
                payload.len(),
                meta.live_frame_len()
            );
            return;
        }
        let slice = be16(payload);
        if slice >= meta.slice_count {
            log::debug!("LIVE_FRAME for slice {} of {}", slice, meta.slice_count);
            return;
        }
        self.renderer.swap_frame(slice, &payload[2..]);
        self.live_frames += 1;
    }
}

fn be16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn be32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
