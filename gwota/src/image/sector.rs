//! Sector splitting and chunking.
//!
//! An image is uploaded sector by sector. Each sector is at most 4096
//! bytes of raw image data followed by a 2-byte CRC-16/CCITT over those
//! bytes; the device acknowledges whole sectors. For transmission a
//! sector (CRC included) is cut into chunks that fit a single
//! data-channel write.
//!
//! ```text
//! image:   |----------- L bytes -----------|
//! sectors: |-- 4096 --|-- 4096 --|-- rest--|     (ceil(L / 4096) sectors)
//! wire:    [ sector bytes | crc16 ]              (per sector)
//! chunks:  |-507-|-507-| ... |-tail-|            (ceil(len / 507) chunks)
//! ```
//!
//! The final sector is addressed as `0xFFFF` on the wire regardless of
//! its true index, and the final chunk of every sector is numbered
//! `0xFF`; the device firmware keys its bookkeeping on both sentinels.

use crate::image::FirmwareImage;
use crate::protocol::crc::crc16;
use crate::protocol::frame::{LAST_CHUNK_SEQ, LAST_SECTOR_INDEX, MAX_CHUNK_PAYLOAD};
use log::trace;

/// Default sector payload size in bytes.
pub const SECTOR_SIZE: usize = 4096;

/// One acknowledgment unit of the upload.
#[derive(Debug, Clone)]
pub struct Sector {
    index: usize,
    wire_index: u16,
    /// Raw payload followed by the 2-byte trailing CRC.
    data: Vec<u8>,
    raw_len: usize,
}

impl Sector {
    /// True zero-based position of this sector in the image.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Sector index as transmitted in chunk headers: the true index,
    /// except `0xFFFF` for the image's final sector.
    pub fn wire_index(&self) -> u16 {
        self.wire_index
    }

    /// Raw payload length, excluding the trailing CRC.
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Raw payload bytes, excluding the trailing CRC.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.raw_len]
    }

    /// Transmitted sector bytes: payload plus trailing CRC.
    pub fn wire_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The trailing CRC value.
    pub fn crc(&self) -> u16 {
        u16::from_le_bytes([self.data[self.raw_len], self.data[self.raw_len + 1]])
    }

    /// Cut the sector (CRC included) into transmit-sized chunks.
    ///
    /// Chunks are numbered from 0 in transmission order; the final
    /// chunk carries [`LAST_CHUNK_SEQ`] instead of its natural index.
    #[allow(clippy::cast_possible_truncation)] // at most 9 chunks per sector
    pub fn chunks(&self, max_payload: usize) -> Vec<Chunk<'_>> {
        let count = self.data.len().div_ceil(max_payload);
        let mut chunks = Vec::with_capacity(count);
        for (i, payload) in self.data.chunks(max_payload).enumerate() {
            let seq = if i == count - 1 {
                LAST_CHUNK_SEQ
            } else {
                i as u8
            };
            chunks.push(Chunk { seq, payload });
        }
        chunks
    }
}

/// One transmission unit: a slice of a sector plus its sequence number.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// Sequence number within the sector (`0xFF` marks the last chunk).
    pub seq: u8,
    /// Chunk payload bytes.
    pub payload: &'a [u8],
}

/// Split an image into sectors of `sector_size` raw bytes, each with
/// its trailing CRC appended.
///
/// The last sector may be shorter; concatenating the raw payloads of
/// all sectors reproduces the image exactly.
#[allow(clippy::cast_possible_truncation)] // sector count bounded by u16 addressing
pub fn split(image: &FirmwareImage, sector_size: usize) -> Vec<Sector> {
    let bytes = image.as_bytes();
    let count = bytes.len().div_ceil(sector_size);

    let mut sectors = Vec::with_capacity(count);
    for (index, raw) in bytes.chunks(sector_size).enumerate() {
        let wire_index = if index == count - 1 {
            LAST_SECTOR_INDEX
        } else {
            index as u16
        };

        let mut data = Vec::with_capacity(raw.len() + 2);
        data.extend_from_slice(raw);
        data.extend_from_slice(&crc16(raw).to_le_bytes());

        trace!(
            "sector {index}: {} bytes, wire index {wire_index:#06x}",
            raw.len()
        );

        sectors.push(Sector {
            index,
            wire_index,
            data,
            raw_len: raw.len(),
        });
    }
    sectors
}

/// Split an image with the default sector geometry.
pub fn split_default(image: &FirmwareImage) -> Vec<Sector> {
    split(image, SECTOR_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(len: usize) -> FirmwareImage {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        FirmwareImage::from_bytes(data).unwrap()
    }

    #[test]
    fn test_split_sector_count_and_sizes() {
        // 10000 bytes at 4096 per sector: 4096 + 4096 + 1808.
        let img = image(10000);
        let sectors = split(&img, SECTOR_SIZE);
        assert_eq!(sectors.len(), 3);
        assert_eq!(sectors[0].raw_len(), 4096);
        assert_eq!(sectors[1].raw_len(), 4096);
        assert_eq!(sectors[2].raw_len(), 1808);
        // Trailing CRC adds two bytes to each transmitted sector.
        assert_eq!(sectors[2].wire_bytes().len(), 1810);
    }

    #[test]
    fn test_split_reconstructs_image() {
        let img = image(10000);
        let joined: Vec<u8> = split(&img, SECTOR_SIZE)
            .iter()
            .flat_map(|s| s.payload().to_vec())
            .collect();
        assert_eq!(joined, img.as_bytes());
    }

    #[test]
    fn test_split_wire_indices() {
        let img = image(10000);
        let sectors = split(&img, SECTOR_SIZE);
        assert_eq!(sectors[0].wire_index(), 0);
        assert_eq!(sectors[1].wire_index(), 1);
        assert_eq!(sectors[2].wire_index(), LAST_SECTOR_INDEX);
    }

    #[test]
    fn test_single_sector_image_is_last_on_wire() {
        let img = image(100);
        let sectors = split(&img, SECTOR_SIZE);
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].wire_index(), LAST_SECTOR_INDEX);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let img = image(SECTOR_SIZE * 2);
        let sectors = split(&img, SECTOR_SIZE);
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[1].raw_len(), SECTOR_SIZE);
    }

    #[test]
    fn test_sector_crc_matches_payload() {
        let img = image(5000);
        for sector in split(&img, SECTOR_SIZE) {
            assert_eq!(sector.crc(), crc16(sector.payload()));
        }
    }

    #[test]
    fn test_chunk_count_and_sequence() {
        let img = image(4096);
        let sectors = split(&img, SECTOR_SIZE);
        // 4096 + 2 CRC bytes = 4098 -> ceil(4098 / 507) = 9 chunks.
        let chunks = sectors[0].chunks(MAX_CHUNK_PAYLOAD);
        assert_eq!(chunks.len(), 9);
        for (i, chunk) in chunks.iter().enumerate() {
            if i == chunks.len() - 1 {
                assert_eq!(chunk.seq, LAST_CHUNK_SEQ);
            } else {
                assert_eq!(usize::from(chunk.seq), i);
            }
        }
        // Chunk payloads reassemble the transmitted sector bytes.
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.to_vec()).collect();
        assert_eq!(joined, sectors[0].wire_bytes());
    }

    #[test]
    fn test_single_chunk_sector_tagged_last() {
        let img = image(64);
        let sectors = split(&img, SECTOR_SIZE);
        let chunks = sectors[0].chunks(MAX_CHUNK_PAYLOAD);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].seq, LAST_CHUNK_SEQ);
    }

    #[test]
    fn test_chunk_boundary_exact_fit() {
        // Sector of exactly two chunk payloads (including the CRC tail).
        let img = image(MAX_CHUNK_PAYLOAD * 2 - 2);
        let sectors = split(&img, SECTOR_SIZE);
        let chunks = sectors[0].chunks(MAX_CHUNK_PAYLOAD);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].seq, 0);
        assert_eq!(chunks[1].seq, LAST_CHUNK_SEQ);
        assert_eq!(chunks[1].payload.len(), MAX_CHUNK_PAYLOAD);
    }
}
