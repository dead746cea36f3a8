//! OTA protocol implementation.

pub mod crc;
pub mod frame;

// Re-export common types
pub use frame::{
    ChunkHeader, Command, CommandAck, CommandFrame, CommandRequest, FrameError, SectorAck, status,
};
