//! OTA wire frame encoding and decoding.
//!
//! The gateway's OTA service speaks three frame shapes over two GATT
//! characteristic pairs. Control frames are a fixed 20 bytes with a
//! trailing CRC-16/CCITT over the first 18 bytes; firmware data travels
//! as chunk frames with a 3-byte header.
//!
//! ## Command frame (host → device, command channel)
//!
//! ```text
//! +---------+-----------+---------------+--------+
//! |   CMD   |    ARG    |   Reserved    | CRC16  |
//! +---------+-----------+---------------+--------+
//! | u16 LE  |  u32 LE   |   12 bytes    | u16 LE |
//! | offset 0| offset 2  |  zero-filled  | off 18 |
//! +---------+-----------+---------------+--------+
//! ```
//!
//! `ARG` carries the firmware size for START and is zero otherwise.
//!
//! ## Command ack (device → host, command channel)
//!
//! ```text
//! | ack(u16 LE) | cmd(u16 LE) | rsp(u16 LE) | reserved(12) | crc16(u16 LE) |
//! ```
//!
//! ## Sector ack (device → host, data channel)
//!
//! ```text
//! | sector_sent(u16 LE) | status(u16 LE) | cur_sector(u16 LE) | reserved(12) | crc16(u16 LE) |
//! ```
//!
//! ## Chunk frame (host → device, data channel)
//!
//! ```text
//! | sector_lo | sector_hi | chunk_seq |  payload (≤507 bytes)  |
//! ```
//!
//! The sector index is little-endian; the last sector of an image is
//! always tagged `0xFFFF` on the wire, and the last chunk of a sector
//! carries `chunk_seq = 0xFF`. Both quirks are fixed firmware behavior.

use crate::protocol::crc::crc16;
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Fixed length of command and acknowledgment frames.
pub const FRAME_LEN: usize = 20;

/// Offset of the trailing CRC; the CRC covers bytes `0..CRC_OFFSET`.
pub const CRC_OFFSET: usize = 18;

/// Length of the chunk frame header.
pub const CHUNK_HEADER_LEN: usize = 3;

/// Maximum chunk payload carried in a single data-channel write.
pub const MAX_CHUNK_PAYLOAD: usize = 507;

/// Wire sector index reserved for the final sector of an image.
pub const LAST_SECTOR_INDEX: u16 = 0xFFFF;

/// Chunk sequence number reserved for the final chunk of a sector.
pub const LAST_CHUNK_SEQ: u8 = 0xFF;

/// Status and response codes reported by the device.
pub mod status {
    /// Operation accepted / sector stored.
    pub const SUCCESS: u16 = 0x0000;
    /// Sector payload failed the device-side CRC check.
    pub const CRC_ERROR: u16 = 0x0001;
    /// Sector sequencing error; `cur_sector` names the sector the
    /// device expects next (1-based).
    pub const SECTOR_ERROR: u16 = 0x0002;
    /// Sector payload had an unexpected length.
    pub const LENGTH_ERROR: u16 = 0x0003;
    /// Host-side sentinel for a notification that failed CRC or length
    /// validation. Never sent by the device.
    pub const NOTIFY_CRC_ERROR: u16 = 0xFFFF;
}

/// OTA command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    /// Begin an upload; the frame argument carries the image size.
    Start = 0x0001,
    /// Finish an upload after the last sector is acknowledged.
    End = 0x0002,
    /// Abort the upload in progress.
    Cancel = 0x0003,
}

/// Frame validation failure.
///
/// Decoders never return field values from a frame that failed
/// validation; callers decide how a malformed frame feeds the retry
/// logic (the session maps both variants to the `0xFFFF` sentinel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Frame length differs from the fixed 20 bytes.
    #[error("wrong frame length: expected {expected} bytes, got {actual}")]
    WrongLength {
        /// Required frame length.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },

    /// Trailing CRC does not match the recomputed CRC.
    #[error("frame CRC mismatch: computed {computed:#06x}, stored {stored:#06x}")]
    CrcMismatch {
        /// CRC recomputed over bytes 0..18.
        computed: u16,
        /// CRC carried in the frame trailer.
        stored: u16,
    },
}

/// Command frame builder.
#[derive(Debug, Clone, Copy)]
pub struct CommandFrame {
    cmd: Command,
    arg: u32,
}

impl CommandFrame {
    /// Build a START frame announcing the firmware image size.
    pub fn start(image_size: u32) -> Self {
        Self {
            cmd: Command::Start,
            arg: image_size,
        }
    }

    /// Build an END frame.
    pub fn end() -> Self {
        Self {
            cmd: Command::End,
            arg: 0,
        }
    }

    /// Build a CANCEL frame.
    pub fn cancel() -> Self {
        Self {
            cmd: Command::Cancel,
            arg: 0,
        }
    }

    /// Get the command code.
    pub fn command(&self) -> Command {
        self.cmd
    }

    /// Encode the complete 20-byte frame.
    pub fn build(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        LittleEndian::write_u16(&mut buf[0..2], self.cmd as u16);
        // Only START carries an argument; the field stays zero otherwise.
        if self.cmd == Command::Start {
            LittleEndian::write_u32(&mut buf[2..6], self.arg);
        }
        let crc = crc16(&buf[..CRC_OFFSET]);
        LittleEndian::write_u16(&mut buf[CRC_OFFSET..FRAME_LEN], crc);
        buf
    }
}

/// Validate length and trailing CRC of a control frame.
fn checked(data: &[u8]) -> Result<&[u8], FrameError> {
    if data.len() != FRAME_LEN {
        return Err(FrameError::WrongLength {
            expected: FRAME_LEN,
            actual: data.len(),
        });
    }
    let stored = LittleEndian::read_u16(&data[CRC_OFFSET..FRAME_LEN]);
    let computed = crc16(&data[..CRC_OFFSET]);
    if stored != computed {
        return Err(FrameError::CrcMismatch { computed, stored });
    }
    Ok(data)
}

/// Write the trailing CRC into a control frame buffer.
fn seal(buf: &mut [u8; FRAME_LEN]) {
    let crc = crc16(&buf[..CRC_OFFSET]);
    LittleEndian::write_u16(&mut buf[CRC_OFFSET..FRAME_LEN], crc);
}

/// Parsed acknowledgment from the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    /// Acknowledgment marker.
    pub ack: u16,
    /// Echo of the command being acknowledged.
    pub cmd: u16,
    /// Response code (`status::SUCCESS` on acceptance).
    pub rsp: u16,
}

impl CommandAck {
    /// Decode and validate a command ack frame.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let frame = checked(data)?;
        Ok(Self {
            ack: LittleEndian::read_u16(&frame[0..2]),
            cmd: LittleEndian::read_u16(&frame[2..4]),
            rsp: LittleEndian::read_u16(&frame[4..6]),
        })
    }

    /// Encode the 20-byte ack frame (device side; used by the emulator).
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        LittleEndian::write_u16(&mut buf[0..2], self.ack);
        LittleEndian::write_u16(&mut buf[2..4], self.cmd);
        LittleEndian::write_u16(&mut buf[4..6], self.rsp);
        seal(&mut buf);
        buf
    }

    /// Check whether the device accepted the command.
    pub fn is_success(&self) -> bool {
        self.rsp == status::SUCCESS
    }
}

/// Parsed acknowledgment from the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorAck {
    /// Wire index of the sector the ack refers to.
    pub sector_sent: u16,
    /// Result of the sector transfer.
    pub status: u16,
    /// Sector the device expects next, 1-based. Meaningful for
    /// `status::SECTOR_ERROR`, where it directs the host rewind.
    pub cur_sector: u16,
}

impl SectorAck {
    /// Decode and validate a sector ack frame.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let frame = checked(data)?;
        Ok(Self {
            sector_sent: LittleEndian::read_u16(&frame[0..2]),
            status: LittleEndian::read_u16(&frame[2..4]),
            cur_sector: LittleEndian::read_u16(&frame[4..6]),
        })
    }

    /// Encode the 20-byte ack frame (device side; used by the emulator).
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        LittleEndian::write_u16(&mut buf[0..2], self.sector_sent);
        LittleEndian::write_u16(&mut buf[2..4], self.status);
        LittleEndian::write_u16(&mut buf[4..6], self.cur_sector);
        seal(&mut buf);
        buf
    }
}

/// Parsed command frame (device side; used by the emulator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    /// Raw command code.
    pub cmd: u16,
    /// Command argument (image size for START, zero otherwise).
    pub arg: u32,
}

impl CommandRequest {
    /// Decode and validate a command frame.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let frame = checked(data)?;
        Ok(Self {
            cmd: LittleEndian::read_u16(&frame[0..2]),
            arg: LittleEndian::read_u32(&frame[2..6]),
        })
    }

    /// Map the raw code onto a known command.
    pub fn command(&self) -> Option<Command> {
        match self.cmd {
            0x0001 => Some(Command::Start),
            0x0002 => Some(Command::End),
            0x0003 => Some(Command::Cancel),
            _ => None,
        }
    }
}

/// Encode a chunk frame: 3-byte header plus payload.
///
/// `sector_index` is the on-wire index (already `0xFFFF` for the last
/// sector); `chunk_seq` is the zero-based chunk number, or
/// [`LAST_CHUNK_SEQ`] for the final chunk of the sector.
pub fn encode_chunk(sector_index: u16, chunk_seq: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_CHUNK_PAYLOAD);
    let mut frame = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
    let [lo, hi] = sector_index.to_le_bytes();
    frame.push(lo);
    frame.push(hi);
    frame.push(chunk_seq);
    frame.extend_from_slice(payload);
    frame
}

/// Parsed chunk header (device side; used by the emulator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// On-wire sector index.
    pub sector_index: u16,
    /// Chunk sequence number within the sector.
    pub chunk_seq: u8,
}

impl ChunkHeader {
    /// Split a chunk frame into its header and payload.
    pub fn split(frame: &[u8]) -> Option<(Self, &[u8])> {
        if frame.len() < CHUNK_HEADER_LEN {
            return None;
        }
        let header = Self {
            sector_index: u16::from_le_bytes([frame[0], frame[1]]),
            chunk_seq: frame[2],
        };
        Some((header, &frame[CHUNK_HEADER_LEN..]))
    }

    /// Check whether this is the final chunk of its sector.
    pub fn is_last(&self) -> bool {
        self.chunk_seq == LAST_CHUNK_SEQ
    }
}
