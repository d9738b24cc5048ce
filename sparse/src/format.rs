//! Sparse image wire format
//!
//! All fields are little-endian. Headers may be longer than the sizes
//! defined here; readers skip the extra bytes using the sizes recorded in
//! the file header.

use crate::error::{Result, SparseError};

pub const SPARSE_HEADER_MAGIC: u32 = 0xed26_ff3a;
pub const SPARSE_MAJOR_VERSION: u16 = 1;

/// Minimum file header size
pub const FILE_HEADER_SIZE: usize = 28;
/// Minimum chunk header size
pub const CHUNK_HEADER_SIZE: usize = 12;

/// Payload size of FILL and CRC32 chunks
pub const FILL_PAYLOAD_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ChunkType {
    /// Literal data
    Raw = 0xcac1,
    /// One 32-bit pattern repeated over the chunk
    Fill = 0xcac2,
    /// Region left untouched
    DontCare = 0xcac3,
    /// Checksum of the data so far
    Crc32 = 0xcac4,
}

impl ChunkType {
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0xcac1 => Some(Self::Raw),
            0xcac2 => Some(Self::Fill),
            0xcac3 => Some(Self::DontCare),
            0xcac4 => Some(Self::Crc32),
            _ => None,
        }
    }
}

fn le16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([data[off], data[off + 1]])
}

fn le32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

/// Sparse image file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseHeader {
    pub magic: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// Bytes in this header, at least 28
    pub file_hdr_sz: u16,
    /// Bytes in each chunk header, at least 12
    pub chunk_hdr_sz: u16,
    /// Image block size in bytes, a multiple of 4
    pub blk_sz: u32,
    /// Blocks in the output image
    pub total_blks: u32,
    pub total_chunks: u32,
    /// CRC32 of the original data, not checked on write
    pub image_checksum: u32,
}

impl SparseHeader {
    /// Header for an image of `total_blks` blocks in `total_chunks` chunks
    pub const fn new(blk_sz: u32, total_blks: u32, total_chunks: u32) -> Self {
        Self {
            magic: SPARSE_HEADER_MAGIC,
            major_version: SPARSE_MAJOR_VERSION,
            minor_version: 0,
            file_hdr_sz: FILE_HEADER_SIZE as u16,
            chunk_hdr_sz: CHUNK_HEADER_SIZE as u16,
            blk_sz,
            total_blks,
            total_chunks,
            image_checksum: 0,
        }
    }

    /// Parse and validate the header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_HEADER_SIZE {
            return Err(SparseError::InvalidHeader);
        }

        let header = Self {
            magic: le32(data, 0),
            major_version: le16(data, 4),
            minor_version: le16(data, 6),
            file_hdr_sz: le16(data, 8),
            chunk_hdr_sz: le16(data, 10),
            blk_sz: le32(data, 12),
            total_blks: le32(data, 16),
            total_chunks: le32(data, 20),
            image_checksum: le32(data, 24),
        };

        if header.magic != SPARSE_HEADER_MAGIC
            || header.major_version != SPARSE_MAJOR_VERSION
            || (header.file_hdr_sz as usize) < FILE_HEADER_SIZE
            || (header.chunk_hdr_sz as usize) < CHUNK_HEADER_SIZE
            || header.blk_sz == 0
            || header.blk_sz % 4 != 0
        {
            return Err(SparseError::InvalidHeader);
        }
        if data.len() < header.file_hdr_sz as usize {
            return Err(SparseError::Truncated);
        }

        Ok(header)
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut out = [0u8; FILE_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..6].copy_from_slice(&self.major_version.to_le_bytes());
        out[6..8].copy_from_slice(&self.minor_version.to_le_bytes());
        out[8..10].copy_from_slice(&self.file_hdr_sz.to_le_bytes());
        out[10..12].copy_from_slice(&self.chunk_hdr_sz.to_le_bytes());
        out[12..16].copy_from_slice(&self.blk_sz.to_le_bytes());
        out[16..20].copy_from_slice(&self.total_blks.to_le_bytes());
        out[20..24].copy_from_slice(&self.total_chunks.to_le_bytes());
        out[24..28].copy_from_slice(&self.image_checksum.to_le_bytes());
        out
    }
}

/// Chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Raw chunk type, see `ChunkType`
    pub chunk_type: u16,
    pub reserved: u16,
    /// Output size in image blocks
    pub chunk_sz: u32,
    /// Bytes in the chunk including its header
    pub total_sz: u32,
}

impl ChunkHeader {
    pub const fn new(chunk_type: ChunkType, chunk_sz: u32, total_sz: u32) -> Self {
        Self {
            chunk_type: chunk_type as u16,
            reserved: 0,
            chunk_sz,
            total_sz,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CHUNK_HEADER_SIZE {
            return Err(SparseError::Truncated);
        }
        Ok(Self {
            chunk_type: le16(data, 0),
            reserved: le16(data, 2),
            chunk_sz: le32(data, 4),
            total_sz: le32(data, 8),
        })
    }

    pub fn kind(&self) -> Option<ChunkType> {
        ChunkType::from_u16(self.chunk_type)
    }

    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut out = [0u8; CHUNK_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.chunk_type.to_le_bytes());
        out[2..4].copy_from_slice(&self.reserved.to_le_bytes());
        out[4..8].copy_from_slice(&self.chunk_sz.to_le_bytes());
        out[8..12].copy_from_slice(&self.total_sz.to_le_bytes());
        out
    }
}

/// Whether `data` starts with a usable sparse image header
pub fn is_sparse_image(data: &[u8]) -> bool {
    SparseHeader::parse(data).is_ok()
}
