//! Erase / program / read pipeline with per-sector erase tracking

use super::geometry::{FlashGeometry, FlashTimings, JedecId, MAX_PAGE_SIZE, MAX_SECTORS};
use crate::error::{EraseFailure, Error, Result, WriteFailure};
use crate::integrity::Checksum;
use crate::programmer::SpiMaster;
use crate::protocol;
use crate::spi::AddressWidth;

/// Read chunk used when folding flash contents into a checksum
const CHECKSUM_CHUNK: usize = 256;

/// One bit per sector: set once the sector is erased in the current session
struct SectorSet {
    words: [u32; MAX_SECTORS / 32],
}

impl SectorSet {
    const fn new() -> Self {
        Self {
            words: [0; MAX_SECTORS / 32],
        }
    }

    fn insert(&mut self, index: usize) {
        self.words[index / 32] |= 1 << (index % 32);
    }

    fn remove(&mut self, index: usize) {
        self.words[index / 32] &= !(1 << (index % 32));
    }

    fn contains(&self, index: usize) -> bool {
        self.words[index / 32] & (1 << (index % 32)) != 0
    }

    fn clear(&mut self) {
        self.words = [0; MAX_SECTORS / 32];
    }

    fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Flash pipeline over an SPI master
///
/// Owns the chip's command sequencing and enforces the erase-before-write
/// rule: a page program into a sector that has not been erased since the
/// session began is rejected before anything reaches the chip.
pub struct FlashPipeline<M> {
    master: M,
    geometry: FlashGeometry,
    timings: FlashTimings,
    width: AddressWidth,
    verify_writes: bool,
    erased: SectorSet,
    written: Option<(u32, u32)>,
}

impl<M: SpiMaster> FlashPipeline<M> {
    /// Create a pipeline for a chip with the given layout
    pub fn new(master: M, geometry: FlashGeometry, timings: FlashTimings) -> Result<Self> {
        geometry.validate()?;
        Ok(Self {
            master,
            geometry,
            timings,
            width: AddressWidth::for_size(geometry.total_size),
            verify_writes: true,
            erased: SectorSet::new(),
            written: None,
        })
    }

    /// Enable or disable the pre-program bit conflict check (enabled by default)
    pub fn with_write_verification(mut self, enabled: bool) -> Self {
        self.verify_writes = enabled;
        self
    }

    /// Chip layout
    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    /// Polling parameters
    pub fn timings(&self) -> &FlashTimings {
        &self.timings
    }

    /// Borrow the underlying driver
    pub fn master(&self) -> &M {
        &self.master
    }

    /// Mutably borrow the underlying driver
    pub fn master_mut(&mut self) -> &mut M {
        &mut self.master
    }

    /// Consume the pipeline and return the driver
    pub fn into_inner(self) -> M {
        self.master
    }

    /// Read the JEDEC identification of the attached chip
    pub fn identify(&mut self) -> Result<JedecId> {
        let (manufacturer, device) = protocol::read_jedec_id(&mut self.master)?;
        let id = JedecId::new(manufacturer, device);
        if id.is_blank() {
            return Err(Error::ChipNotFound);
        }
        Ok(id)
    }

    /// Identify the chip and check it is the expected part
    pub fn identify_expected(&mut self, expected: JedecId) -> Result<JedecId> {
        let id = self.identify()?;
        if id != expected {
            log::warn!("Expected flash {} but found {}", expected, id);
            return Err(Error::JedecIdMismatch);
        }
        Ok(id)
    }

    /// Erase the sector containing `addr`
    pub fn erase_sector(&mut self, addr: u32) -> Result<()> {
        if !self.geometry.contains(addr, 1) {
            return Err(Error::AddressOutOfBounds);
        }

        let sector = self.geometry.sector_start(addr);
        let index = self.geometry.sector_index(addr);

        // Contents are undefined until the erase completes, and earlier
        // writes no longer describe what the chip holds
        self.erased.remove(index);
        self.written = None;

        log::debug!("Erasing sector 0x{:06X}", sector);
        protocol::sector_erase(
            &mut self.master,
            self.width,
            sector,
            self.timings.erase_poll_us,
            self.timings.sector_erase_timeout_us,
        )
        .map_err(|e| match e {
            Error::Timeout => Error::EraseError(EraseFailure::Timeout { addr: sector }),
            Error::SpiTransferFailed | Error::OpcodeNotSupported => {
                Error::EraseError(EraseFailure::CommandFailed { addr: sector })
            }
            other => other,
        })?;

        self.erased.insert(index);
        Ok(())
    }

    /// Program up to one page starting at `addr`
    ///
    /// Callers split data on page boundaries; a write that would wrap within
    /// the page is rejected rather than split here.
    pub fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let page_size = self.geometry.page_size as usize;
        if data.is_empty()
            || data.len() > page_size
            || data.len() > self.master.max_write_len()
        {
            return Err(Error::InvalidLength);
        }
        if !self.geometry.contains(addr, data.len()) {
            return Err(Error::AddressOutOfBounds);
        }
        if self.geometry.page_offset(addr) as usize + data.len() > page_size {
            return Err(Error::WriteError(WriteFailure::PageBoundary {
                addr,
                len: data.len(),
            }));
        }
        if !self.erased.contains(self.geometry.sector_index(addr)) {
            return Err(Error::WriteError(WriteFailure::NotErased {
                sector: self.geometry.sector_start(addr),
            }));
        }

        if self.verify_writes {
            self.check_programmable(addr, data)?;
        }

        log::trace!("Programming {} bytes at 0x{:06X}", data.len(), addr);
        protocol::program_page(
            &mut self.master,
            self.width,
            addr,
            data,
            self.timings.program_poll_us,
            self.timings.page_program_timeout_us,
        )
        .map_err(|e| match e {
            Error::Timeout => Error::WriteError(WriteFailure::Timeout { addr }),
            other => other,
        })?;

        self.note_written(addr, data.len() as u32);
        Ok(())
    }

    /// Read flash contents into `buf`
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        if !self.geometry.contains(addr, buf.len()) {
            return Err(Error::AddressOutOfBounds);
        }
        protocol::read(&mut self.master, self.width, addr, buf)
    }

    /// Read `len` bytes from `addr` and return their checksum
    pub fn checksum_region(&mut self, addr: u32, len: u32) -> Result<u16> {
        if len == 0 {
            return Err(Error::InvalidLength);
        }
        if !self.geometry.contains(addr, len as usize) {
            return Err(Error::AddressOutOfBounds);
        }

        let mut sum = Checksum::new();
        let mut buf = [0u8; CHECKSUM_CHUNK];
        let mut offset = 0u32;
        while offset < len {
            let chunk_len = core::cmp::min(CHECKSUM_CHUNK as u32, len - offset) as usize;
            let chunk = &mut buf[..chunk_len];
            protocol::read(&mut self.master, self.width, addr + offset, chunk)?;
            sum.update(chunk);
            offset += chunk_len as u32;
        }
        Ok(sum.finalize())
    }

    /// True if the sector containing `addr` was erased in this session
    pub fn is_sector_erased(&self, addr: u32) -> bool {
        self.geometry.contains(addr, 1) && self.erased.contains(self.geometry.sector_index(addr))
    }

    /// Number of sectors erased in this session
    pub fn erased_sectors(&self) -> usize {
        self.erased.count()
    }

    /// Start and length of the range covered by writes since the last erase
    pub fn written_span(&self) -> Option<(u32, u32)> {
        self.written.map(|(start, end)| (start, end - start))
    }

    /// Forget erase tracking; the next write needs a fresh erase
    pub fn end_session(&mut self) {
        log::debug!(
            "Ending update session ({} sectors erased)",
            self.erased.count()
        );
        self.erased.clear();
        self.written = None;
    }

    fn check_programmable(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let mut have = [0u8; MAX_PAGE_SIZE];
        let have = &mut have[..data.len()];
        protocol::read(&mut self.master, self.width, addr, have)?;

        // Programming can only clear bits
        let conflict = have
            .iter()
            .zip(data)
            .position(|(&h, &w)| h & w != w);
        if let Some(i) = conflict {
            return Err(Error::WriteError(WriteFailure::BitConflict {
                addr: addr + i as u32,
                have: have[i],
                want: data[i],
            }));
        }
        Ok(())
    }

    fn note_written(&mut self, addr: u32, len: u32) {
        let end = addr + len;
        self.written = Some(match self.written {
            Some((start, stop)) => (start.min(addr), stop.max(end)),
            None => (addr, end),
        });
    }
}
