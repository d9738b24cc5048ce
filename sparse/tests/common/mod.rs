//! Common test utilities: sparse image builder and RAM storage

#![allow(dead_code)]

use sparse::format::CHUNK_HEADER_SIZE;
use sparse::{ChunkHeader, ChunkType, Result, SparseError, SparseHeader, SparseStorage};

/// RAM-backed storage region recording every write
pub struct RamStorage {
    pub data: Vec<u8>,
    pub block_size: u32,
    pub start: u64,
    pub size: u64,
    /// (first block, block count) of each write, in call order
    pub writes: Vec<(u64, u64)>,
    /// Blocks `reserve` steps over in addition to the requested ones
    pub bad_blocks: Vec<u64>,
    /// Fail any write that reaches this block
    pub fail_from: Option<u64>,
}

impl RamStorage {
    /// Device of `num_blocks` blocks; the target region is all of it
    pub fn new(block_size: u32, num_blocks: u64) -> Self {
        Self {
            data: vec![0u8; (block_size as u64 * num_blocks) as usize],
            block_size,
            start: 0,
            size: num_blocks,
            writes: Vec::new(),
            bad_blocks: Vec::new(),
            fail_from: None,
        }
    }

    /// Restrict the target region to `start .. start + size`
    pub fn window(mut self, start: u64, size: u64) -> Self {
        self.start = start;
        self.size = size;
        self
    }

    pub fn block(&self, blk: u64) -> &[u8] {
        let bs = self.block_size as usize;
        &self.data[blk as usize * bs..(blk as usize + 1) * bs]
    }
}

impl SparseStorage for RamStorage {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn start(&self) -> u64 {
        self.start
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn write(&mut self, blk: u64, blkcnt: u64, data: &[u8]) -> Result<u64> {
        if self.fail_from.map_or(false, |f| blk + blkcnt > f) {
            return Err(SparseError::WriteFailed);
        }
        let bs = self.block_size as usize;
        let len = blkcnt as usize * bs;
        let off = blk as usize * bs;
        self.data[off..off + len].copy_from_slice(&data[..len]);
        self.writes.push((blk, blkcnt));
        Ok(blkcnt)
    }

    fn reserve(&mut self, blk: u64, blkcnt: u64) -> Result<u64> {
        let bad = self
            .bad_blocks
            .iter()
            .filter(|&&b| b >= blk && b < blk + blkcnt)
            .count() as u64;
        Ok(blkcnt + bad)
    }
}

/// Builds sparse images chunk by chunk
pub struct SparseBuilder {
    blk_sz: u32,
    /// Extra bytes appended to each header
    hdr_pad: u16,
    chunks: Vec<Vec<u8>>,
    blocks: u32,
    total_override: Option<u32>,
}

impl SparseBuilder {
    pub fn new(blk_sz: u32) -> Self {
        Self {
            blk_sz,
            hdr_pad: 0,
            chunks: Vec::new(),
            blocks: 0,
            total_override: None,
        }
    }

    /// Use headers `pad` bytes longer than the minimum
    pub fn padded_headers(mut self, pad: u16) -> Self {
        self.hdr_pad = pad;
        self
    }

    fn chunk(mut self, ty: u16, chunk_sz: u32, payload: &[u8]) -> Self {
        let hdr_sz = CHUNK_HEADER_SIZE + self.hdr_pad as usize;
        let mut hdr = ChunkHeader::new(ChunkType::Raw, chunk_sz, (hdr_sz + payload.len()) as u32);
        hdr.chunk_type = ty;

        let mut out = hdr.to_bytes().to_vec();
        out.resize(hdr_sz, 0xee);
        out.extend_from_slice(payload);
        self.chunks.push(out);
        self
    }

    pub fn raw(mut self, data: &[u8]) -> Self {
        assert_eq!(data.len() % self.blk_sz as usize, 0);
        let n = (data.len() / self.blk_sz as usize) as u32;
        self.blocks += n;
        self.chunk(ChunkType::Raw as u16, n, data)
    }

    pub fn fill(mut self, pattern: u32, blocks: u32) -> Self {
        self.blocks += blocks;
        self.chunk(ChunkType::Fill as u16, blocks, &pattern.to_le_bytes())
    }

    pub fn dont_care(mut self, blocks: u32) -> Self {
        self.blocks += blocks;
        self.chunk(ChunkType::DontCare as u16, blocks, &[])
    }

    pub fn crc32(self, crc: u32) -> Self {
        self.chunk(ChunkType::Crc32 as u16, 0, &crc.to_le_bytes())
    }

    /// Chunk with arbitrary header fields, for corrupt images
    pub fn raw_chunk(self, ty: u16, chunk_sz: u32, payload: &[u8]) -> Self {
        self.chunk(ty, chunk_sz, payload)
    }

    /// Declare a different total block count than the chunks cover
    pub fn total_blocks(mut self, total: u32) -> Self {
        self.total_override = Some(total);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut hdr = SparseHeader::new(
            self.blk_sz,
            self.total_override.unwrap_or(self.blocks),
            self.chunks.len() as u32,
        );
        hdr.file_hdr_sz += self.hdr_pad;
        hdr.chunk_hdr_sz += self.hdr_pad;

        let mut out = hdr.to_bytes().to_vec();
        out.resize(hdr.file_hdr_sz as usize, 0xee);
        for chunk in self.chunks {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

/// Deterministic test data
pub fn pattern_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// In-memory gpt_disk_io block device
pub struct MemDisk {
    pub data: Vec<u8>,
}

impl MemDisk {
    pub fn new(num_blocks: usize) -> Self {
        Self {
            data: vec![0u8; num_blocks * 512],
        }
    }
}

impl gpt_disk_io::BlockIo for MemDisk {
    type Error = std::io::Error;

    fn block_size(&self) -> gpt_disk_types::BlockSize {
        gpt_disk_types::BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> std::result::Result<u64, Self::Error> {
        Ok((self.data.len() / 512) as u64)
    }

    fn read_blocks(
        &mut self,
        start_lba: gpt_disk_types::Lba,
        dst: &mut [u8],
    ) -> std::result::Result<(), Self::Error> {
        let off = start_lba.0 as usize * 512;
        dst.copy_from_slice(&self.data[off..off + dst.len()]);
        Ok(())
    }

    fn write_blocks(
        &mut self,
        start_lba: gpt_disk_types::Lba,
        src: &[u8],
    ) -> std::result::Result<(), Self::Error> {
        let off = start_lba.0 as usize * 512;
        if off + src.len() > self.data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[off..off + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> std::result::Result<(), Self::Error> {
        Ok(())
    }
}
