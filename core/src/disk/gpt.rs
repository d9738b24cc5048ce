// GPT partition discovery using gpt-disk-rs

use crate::disk::partition::{PartitionInfo, PartitionTable, PartitionType};
use crate::error::{BootError, Result};
use gpt_disk_io::{BlockIo, Disk};
use gpt_disk_types::{BlockSize, Lba};

/// Lends a block device to `Disk` without giving up ownership
struct Borrowed<'a, B: BlockIo>(&'a mut B);

impl<B: BlockIo> BlockIo for Borrowed<'_, B> {
    type Error = B::Error;

    fn block_size(&self) -> BlockSize {
        self.0.block_size()
    }

    fn num_blocks(&mut self) -> core::result::Result<u64, Self::Error> {
        self.0.num_blocks()
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> core::result::Result<(), Self::Error> {
        self.0.read_blocks(start_lba, dst)
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> core::result::Result<(), Self::Error> {
        self.0.write_blocks(start_lba, src)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        self.0.flush()
    }
}

/// Scan disk for GPT and populate partition table.
///
/// A disk without a readable GPT is not an error: the table is left empty
/// with `has_gpt == false` and the bootdev is treated as a whole device.
pub fn scan_partitions<B: BlockIo>(
    block_io: &mut B,
    partition_table: &mut PartitionTable,
    block_size_bytes: usize,
) -> Result<()> {
    partition_table.clear();

    let mut disk = match Disk::new(Borrowed(block_io)) {
        Ok(d) => d,
        Err(_) => return Ok(()),
    };

    let header = match disk.read_primary_gpt_header(&mut [0u8; 512]) {
        Ok(h) => h,
        Err(_) => return Ok(()),
    };
    if !header.is_signature_valid() {
        return Ok(());
    }

    let layout = match header.get_partition_entry_array_layout() {
        Ok(l) => l,
        Err(_) => return Ok(()),
    };

    let mut entry_buf = [0u8; 4096];
    if block_size_bytes > entry_buf.len() {
        return Err(BootError::Invalid);
    }
    let entry_buffer = &mut entry_buf[..block_size_bytes];

    let iter = match disk.gpt_partition_entry_array_iter(layout, entry_buffer) {
        Ok(it) => it,
        Err(_) => return Ok(()),
    };

    partition_table.has_gpt = true;

    for (index, entry_result) in iter.enumerate() {
        let entry = entry_result.map_err(|_| BootError::Io)?;

        if !entry.is_used() {
            continue;
        }

        // Copy the guids to avoid unaligned references
        let type_guid = entry.partition_type_guid;
        let unique_guid = entry.unique_partition_guid;

        let info = PartitionInfo {
            number: index as u32 + 1,
            partition_type: PartitionType::from_gpt_guid(&type_guid),
            unique_guid,
            start_lba: entry.starting_lba.to_u64(),
            end_lba: entry.ending_lba.to_u64(),
        };

        if !partition_table.add_partition(info) {
            break; // Table full
        }
    }

    Ok(())
}
