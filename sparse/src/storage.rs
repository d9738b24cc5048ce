//! Storage backends for sparse writes
//!
//! A backend exposes a window of blocks; the writer never addresses
//! anything outside `start .. start + size`.

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use crate::error::{Result, SparseError};

/// Block storage a sparse image is written to
pub trait SparseStorage {
    /// Block size in bytes
    fn block_size(&self) -> u32;

    /// First block of the target region
    fn start(&self) -> u64;

    /// Length of the target region in blocks
    fn size(&self) -> u64;

    /// Write `blkcnt` blocks from `data` at block `blk`.
    ///
    /// Returns the number of blocks written; anything short of `blkcnt` is
    /// treated as a failure by the writer.
    fn write(&mut self, blk: u64, blkcnt: u64, data: &[u8]) -> Result<u64>;

    /// Step over `blkcnt` blocks at `blk` without writing them.
    ///
    /// Returns how far the cursor moves. Backends that skip bad blocks may
    /// return more than `blkcnt`.
    fn reserve(&mut self, _blk: u64, blkcnt: u64) -> Result<u64> {
        Ok(blkcnt)
    }
}

/// `SparseStorage` over a window of a gpt_disk_io block device, such as a
/// partition
pub struct BlockIoStorage<B: BlockIo> {
    io: B,
    start: u64,
    size: u64,
}

impl<B: BlockIo> BlockIoStorage<B> {
    pub fn new(io: B, start: u64, size: u64) -> Self {
        Self { io, start, size }
    }

    /// Whole device as the target region
    pub fn whole(mut io: B) -> Result<Self> {
        let size = io.num_blocks().map_err(|_| SparseError::WriteFailed)?;
        Ok(Self::new(io, 0, size))
    }

    pub fn inner(&mut self) -> &mut B {
        &mut self.io
    }

    pub fn into_inner(self) -> B {
        self.io
    }
}

impl<B: BlockIo> SparseStorage for BlockIoStorage<B> {
    fn block_size(&self) -> u32 {
        self.io.block_size().to_u32()
    }

    fn start(&self) -> u64 {
        self.start
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn write(&mut self, blk: u64, blkcnt: u64, data: &[u8]) -> Result<u64> {
        let len = blkcnt
            .checked_mul(self.block_size() as u64)
            .ok_or(SparseError::OutOfBounds)?;
        let src = data
            .get(..len as usize)
            .ok_or(SparseError::Truncated)?;
        self.io
            .write_blocks(Lba(blk), src)
            .map_err(|_| SparseError::WriteFailed)?;
        Ok(blkcnt)
    }
}
