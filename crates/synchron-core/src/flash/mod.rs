//! External flash staging pipeline
//!
//! [`FlashPipeline`] wraps a flash driver with the erase-before-write
//! discipline the update protocol relies on. Erase and program are separate
//! operations; the pipeline never erases on the caller's behalf.

mod geometry;
mod pipeline;

pub use geometry::{
    FlashGeometry, FlashTimings, JedecId, ERASED_VALUE, MAX_PAGE_SIZE, MAX_SECTORS,
    SECTOR_ERASE_SIZE,
};
pub use pipeline::FlashPipeline;
