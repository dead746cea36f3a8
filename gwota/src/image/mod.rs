//! Firmware image handling: loading and sector/chunk geometry.

pub mod firmware;
pub mod sector;

// Re-export for convenience
pub use firmware::FirmwareImage;
pub use sector::{Chunk, SECTOR_SIZE, Sector, split, split_default};
