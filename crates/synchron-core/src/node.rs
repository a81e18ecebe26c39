//! Control loop of a blade node
//!
//! One iteration polls the link for at most one byte, feeds it to the
//! protocol engine, then samples the rotation sensor and advances the slice
//! scheduler. Nothing in the loop waits on the host.

use crate::flash::JedecId;
use crate::programmer::SpiMaster;
use crate::slice::SliceScheduler;
use crate::transport::Transport;
use crate::wire::{ProtocolEngine, Response, MAX_RESPONSE_FRAME, RX_CAPACITY};

/// Source of rotor position
pub trait RotationSensor {
    /// Current rotor angle in degrees, nominally `[0, 360)`
    fn read_angle_deg(&mut self) -> f32;

    /// Monotonic milliseconds; may wrap
    fn read_time_ms(&mut self) -> u32;
}

/// LED output stage
pub trait Renderer {
    /// START was received; begin drawing
    fn arm(&mut self);

    /// A new slice began; called once per crossing
    fn on_slice(&mut self, slice: u16);

    /// Replace the pixels for `slice` (4 bytes per pixel)
    fn swap_frame(&mut self, slice: u16, pixels: &[u8]);
}

impl<R: Renderer + ?Sized> Renderer for &mut R {
    fn arm(&mut self) {
        (**self).arm()
    }

    fn on_slice(&mut self, slice: u16) {
        (**self).on_slice(slice)
    }

    fn swap_frame(&mut self, slice: u16, pixels: &[u8]) {
        (**self).swap_frame(slice, pixels)
    }
}

/// What one loop iteration did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    /// A byte arrived from the host
    pub received: bool,
    /// A response frame was sent
    pub responded: bool,
    /// Slice crossing seen this iteration
    pub slice: Option<u16>,
}

/// A blade node: protocol engine, scheduler and their collaborators
pub struct BladeNode<T, S, M, R, const N: usize = RX_CAPACITY> {
    engine: ProtocolEngine<M, R, N>,
    scheduler: SliceScheduler,
    link: T,
    sensor: S,
    expected_id: Option<JedecId>,
    link_errors: u32,
}

impl<T, S, M, R, const N: usize> BladeNode<T, S, M, R, N>
where
    T: Transport,
    S: RotationSensor,
    M: SpiMaster,
    R: Renderer,
{
    /// Assemble a node
    pub fn new(
        engine: ProtocolEngine<M, R, N>,
        scheduler: SliceScheduler,
        link: T,
        sensor: S,
    ) -> Self {
        Self {
            engine,
            scheduler,
            link,
            sensor,
            expected_id: None,
            link_errors: 0,
        }
    }

    /// Require this chip at startup
    pub fn with_expected_id(mut self, id: JedecId) -> Self {
        self.expected_id = Some(id);
        self
    }

    /// Check the flash chip
    ///
    /// A missing or unexpected chip is logged and the node keeps running:
    /// the link and the scheduler work without it.
    pub fn startup(&mut self) -> Option<JedecId> {
        let flash = self.engine.flash_mut();
        let result = match self.expected_id {
            Some(expected) => flash.identify_expected(expected),
            None => flash.identify(),
        };
        match result {
            Ok(id) => {
                log::info!("Flash {} ready ({} bytes)", id, flash.geometry().total_size);
                Some(id)
            }
            Err(e) => {
                log::error!("Flash check failed: {}; continuing without staging", e);
                None
            }
        }
    }

    /// Run one loop iteration
    pub fn run_once(&mut self) -> Tick {
        let mut tick = Tick::default();

        match self.link.poll_byte() {
            Ok(Some(byte)) => {
                tick.received = true;
                if let Some(response) = self.engine.push_byte(byte) {
                    tick.responded = self.send(&response);
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.link_errors += 1;
                log::warn!("Link read failed: {:?}", e);
            }
        }

        let now = self.sensor.read_time_ms();
        let angle = self.sensor.read_angle_deg();
        if let Some(slice) = self.scheduler.poll(now, angle) {
            self.engine.renderer_mut().on_slice(slice);
            tick.slice = Some(slice);
        }

        tick
    }

    /// Run forever
    pub fn run(&mut self) -> ! {
        loop {
            self.run_once();
        }
    }

    fn send(&mut self, response: &Response) -> bool {
        let mut buf = [0u8; MAX_RESPONSE_FRAME];
        let n = match response.encode(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                log::error!("Cannot encode response 0x{:02X}: {}", response.opcode, e);
                return false;
            }
        };
        match self.link.write_bytes(&buf[..n]) {
            Ok(()) => true,
            Err(e) => {
                self.link_errors += 1;
                log::warn!("Link write failed: {:?}", e);
                false
            }
        }
    }

    /// Link read/write failures since creation
    pub fn link_errors(&self) -> u32 {
        self.link_errors
    }

    /// The protocol engine
    pub fn engine(&self) -> &ProtocolEngine<M, R, N> {
        &self.engine
    }

    /// The protocol engine, mutably
    pub fn engine_mut(&mut self) -> &mut ProtocolEngine<M, R, N> {
        &mut self.engine
    }

    /// The slice scheduler
    pub fn scheduler(&self) -> &SliceScheduler {
        &self.scheduler
    }

    /// The host link
    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }

    /// The rotation sensor
    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
