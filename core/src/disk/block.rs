//! Block media behind a bootdev
//!
//! `BlockDevice` is the object-safe view the discovery engine needs of a
//! block device: geometry, reads, partition lookup and media readiness.
//! `GptBlockDevice` provides it for anything implementing
//! `gpt_disk_io::BlockIo`, reading partitions from the GPT on first use.

use alloc::vec::Vec;

use gpt_disk_io::BlockIo;
use gpt_disk_types::Lba;

use super::gpt::scan_partitions;
use super::partition::PartitionTable;
use crate::error::{BootError, Result};

/// Block media as seen by bootdevs and bootmeths
pub trait BlockDevice {
    /// Block size in bytes
    fn block_size(&self) -> u32;

    fn num_blocks(&mut self) -> Result<u64>;

    /// Read whole blocks starting at `lba`; `dst` must be block-aligned
    fn read_blocks(&mut self, lba: u64, dst: &mut [u8]) -> Result<()>;

    /// Partition table, read from media on first call
    fn partitions(&mut self) -> Result<&PartitionTable>;

    /// Whether media is present and ready for I/O
    fn media_ready(&mut self) -> Result<bool> {
        Ok(true)
    }

    /// Return the device to its idle state after a failed wait
    fn reset(&mut self) {}

    /// Read `len` bytes starting at byte `offset`, neither needs alignment
    fn read_bytes(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let bs = self.block_size() as u64;
        if bs == 0 {
            return Err(BootError::Invalid);
        }
        let first = offset / bs;
        let skip = (offset % bs) as usize;
        let blocks = (skip as u64 + len as u64).div_ceil(bs);

        let mut buf = Vec::new();
        buf.try_reserve_exact((blocks * bs) as usize)
            .map_err(|_| BootError::OutOfMemory)?;
        buf.resize((blocks * bs) as usize, 0);
        self.read_blocks(first, &mut buf)?;

        buf.drain(..skip);
        buf.truncate(len);
        Ok(buf)
    }
}

/// `BlockDevice` over any gpt_disk_io block device
pub struct GptBlockDevice<B: BlockIo> {
    io: B,
    table: PartitionTable,
    scanned: bool,
}

impl<B: BlockIo> GptBlockDevice<B> {
    pub fn new(io: B) -> Self {
        Self {
            io,
            table: PartitionTable::new(),
            scanned: false,
        }
    }

    /// Forget the cached partition table, e.g. after media change
    pub fn rescan(&mut self) {
        self.scanned = false;
        self.table.clear();
    }

    pub fn inner(&mut self) -> &mut B {
        &mut self.io
    }
}

impl<B: BlockIo> BlockDevice for GptBlockDevice<B> {
    fn block_size(&self) -> u32 {
        self.io.block_size().to_u32()
    }

    fn num_blocks(&mut self) -> Result<u64> {
        self.io.num_blocks().map_err(|_| BootError::Io)
    }

    fn read_blocks(&mut self, lba: u64, dst: &mut [u8]) -> Result<()> {
        self.io.read_blocks(Lba(lba), dst).map_err(|_| BootError::Io)
    }

    fn partitions(&mut self) -> Result<&PartitionTable> {
        if !self.scanned {
            let bs = self.block_size() as usize;
            scan_partitions(&mut self.io, &mut self.table, bs)?;
            self.scanned = true;
        }
        Ok(&self.table)
    }

    fn reset(&mut self) {
        self.rescan();
    }
}

