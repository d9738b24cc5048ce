//! Sparse image writer
//!
//! Walks the chunks of a sparse image in file order and writes them to a
//! `SparseStorage`, keeping a cursor in storage blocks:
//!
//! ```text
//!   RAW        write payload as-is           cursor += n
//!   FILL       write one pattern block n×    cursor += n
//!   DONT_CARE  storage.reserve()             cursor += reserved
//!   CRC32      ignored
//! ```
//!
//! Nothing is rolled back on failure. A corrupt image can leave the
//! storage partly written: every chunk before the bad one is already on
//! media when the error comes back.

use alloc::vec::Vec;

use bootstd_core::logger::LogStage;
use bootstd_core::{log_debug, log_error, log_info};

use crate::error::{Result, SparseError};
use crate::format::{ChunkHeader, ChunkType, SparseHeader, FILL_PAYLOAD_SIZE};
use crate::storage::SparseStorage;

/// Counts from one `store_sparse_image` call, in image blocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SparseStats {
    /// Chunks processed, including CRC32 chunks
    pub chunks: u32,
    /// Blocks written from RAW and FILL chunks
    pub blocks_written: u64,
    /// Blocks stepped over by DONT_CARE chunks
    pub blocks_skipped: u64,
    /// Storage block the next write of this session goes to
    pub next_block: u64,
}

/// A flashing session that may span several sparse images.
///
/// Split images are written by passing a non-zero session id on the
/// second and later calls, which continue where the previous call stopped.
#[derive(Debug, Default)]
pub struct FlashSession {
    last_offset: Option<u64>,
}

impl FlashSession {
    pub fn new() -> Self {
        Self { last_offset: None }
    }

    /// Storage block following the last write, if anything was written
    pub fn last_offset(&self) -> Option<u64> {
        self.last_offset
    }

    /// Write a sparse image to `storage`.
    ///
    /// `session_id == 0` starts at `storage.start()`; any other id resumes
    /// from where the previous call of this session stopped.
    ///
    /// # Errors
    ///
    /// - `BlockSizeMismatch`: image block size not a multiple of the
    ///   storage block size, reported before any write
    /// - `BadChunk`, `UnknownChunk`, `Truncated`: corrupt image
    /// - `OutOfBounds`: a chunk would end past `start + size`
    /// - `WriteFailed`: the backend failed or wrote short
    /// - `TotalMismatch`: the chunks cover a different number of blocks
    ///   than the header declares. Reported after the data is written.
    pub fn store_sparse_image<S: SparseStorage + ?Sized>(
        &mut self,
        storage: &mut S,
        session_id: u32,
        data: &[u8],
    ) -> Result<SparseStats> {
        let header = SparseHeader::parse(data)?;

        let bs = storage.block_size();
        if bs == 0 || header.blk_sz % bs != 0 {
            log_error!(
                LogStage::Sparse,
                "Sparse image block size {} not a multiple of {}",
                header.blk_sz,
                bs
            );
            return Err(SparseError::BlockSizeMismatch);
        }
        let ratio = (header.blk_sz / bs) as u64;

        let mut blk = if session_id == 0 {
            storage.start()
        } else {
            self.last_offset.ok_or(SparseError::NoSession)?
        };
        let end = storage
            .start()
            .checked_add(storage.size())
            .ok_or(SparseError::OutOfBounds)?;

        log_info!(
            LogStage::Sparse,
            "Flashing sparse image at offset {}: {} blocks in {} chunks",
            blk,
            header.total_blks,
            header.total_chunks
        );

        let mut stats = SparseStats::default();
        let mut total_blocks: u64 = 0;
        let mut pos = header.file_hdr_sz as usize;
        let chunk_hdr_sz = header.chunk_hdr_sz as usize;

        for _ in 0..header.total_chunks {
            let chunk = ChunkHeader::parse(data.get(pos..).ok_or(SparseError::Truncated)?)?;
            pos = pos
                .checked_add(chunk_hdr_sz)
                .ok_or(SparseError::Truncated)?;

            let payload_len = (chunk.total_sz as usize)
                .checked_sub(chunk_hdr_sz)
                .ok_or(SparseError::BadChunk)?;
            let payload = pos
                .checked_add(payload_len)
                .and_then(|payload_end| data.get(pos..payload_end))
                .ok_or(SparseError::Truncated)?;
            let blkcnt = chunk.chunk_sz as u64 * ratio;

            match chunk.kind() {
                Some(ChunkType::Raw) => {
                    if payload_len as u64 != chunk.chunk_sz as u64 * header.blk_sz as u64 {
                        log_error!(LogStage::Sparse, "Bogus chunk size for chunk type Raw");
                        return Err(SparseError::BadChunk);
                    }
                    check_bounds(blk, blkcnt, end)?;
                    write_blocks(storage, blk, blkcnt, payload)?;
                    blk += blkcnt;
                    stats.blocks_written += chunk.chunk_sz as u64;
                }
                Some(ChunkType::Fill) => {
                    if payload_len != FILL_PAYLOAD_SIZE {
                        log_error!(LogStage::Sparse, "Bogus chunk size for chunk type Fill");
                        return Err(SparseError::BadChunk);
                    }
                    check_bounds(blk, blkcnt, end)?;
                    let fill = fill_block(payload, bs as usize)?;
                    for i in 0..blkcnt {
                        write_blocks(storage, blk + i, 1, &fill)?;
                    }
                    blk += blkcnt;
                    stats.blocks_written += chunk.chunk_sz as u64;
                }
                Some(ChunkType::DontCare) => {
                    check_bounds(blk, blkcnt, end)?;
                    // Skipped bad blocks can carry the cursor further
                    let reserved = storage.reserve(blk, blkcnt)?;
                    check_bounds(blk, reserved, end)?;
                    blk += reserved;
                    stats.blocks_skipped += chunk.chunk_sz as u64;
                }
                Some(ChunkType::Crc32) => {
                    if payload_len != FILL_PAYLOAD_SIZE {
                        return Err(SparseError::BadChunk);
                    }
                }
                None => {
                    log_error!(
                        LogStage::Sparse,
                        "Unknown chunk type 0x{:04x}",
                        chunk.chunk_type
                    );
                    return Err(SparseError::UnknownChunk);
                }
            }

            if !matches!(chunk.kind(), Some(ChunkType::Crc32)) {
                total_blocks += chunk.chunk_sz as u64;
            }
            stats.chunks += 1;
            pos += payload_len;

            log_debug!(
                LogStage::Sparse,
                "chunk {}: type 0x{:04x}, {} blocks",
                stats.chunks,
                chunk.chunk_type,
                chunk.chunk_sz
            );
        }

        self.last_offset = Some(blk);
        stats.next_block = blk;
        log_info!(LogStage::Sparse, "wrote {} blocks", stats.blocks_written);

        if total_blocks != header.total_blks as u64 {
            log_error!(
                LogStage::Sparse,
                "sparse image write failure: {} of {} blocks",
                total_blocks,
                header.total_blks
            );
            return Err(SparseError::TotalMismatch);
        }

        Ok(stats)
    }
}

fn check_bounds(blk: u64, blkcnt: u64, end: u64) -> Result<()> {
    match blk.checked_add(blkcnt) {
        Some(last) if last <= end => Ok(()),
        _ => {
            log_error!(LogStage::Sparse, "Request would exceed partition size");
            Err(SparseError::OutOfBounds)
        }
    }
}

fn write_blocks<S: SparseStorage + ?Sized>(
    storage: &mut S,
    blk: u64,
    blkcnt: u64,
    data: &[u8],
) -> Result<()> {
    let written = storage.write(blk, blkcnt, data)?;
    if written != blkcnt {
        log_error!(
            LogStage::Sparse,
            "Write failed at block {}: {} of {} blocks",
            blk,
            written,
            blkcnt
        );
        return Err(SparseError::WriteFailed);
    }
    Ok(())
}

/// One storage block filled with the 4-byte pattern
fn fill_block(pattern: &[u8], block_size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(block_size)
        .map_err(|_| SparseError::OutOfMemory)?;
    while buf.len() < block_size {
        let take = (block_size - buf.len()).min(pattern.len());
        buf.extend_from_slice(&pattern[..take]);
    }
    Ok(buf)
}
