//! Common test utilities, mock block devices and scripted bootmeths

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use bootstd_core::disk::{BlockDevice, GptBlockDevice, PartitionTable, PartitionType};
use bootstd_core::{
    Boot, BootError, Bootdev, Bootflow, BootflowIter, BootflowState, Bootmeth, NetTransport,
    ReadFile, Result,
};
use gpt_disk_io::{BlockIo, Disk};
use gpt_disk_types::{
    guid, BlockSize, GptHeader, GptPartitionEntryArray, Lba, LbaLe, U32Le,
};

pub const BLOCK_SIZE: usize = 512;

/// Marker at the start of a partition holding a boot config
pub const CONF_MAGIC: &[u8; 8] = b"BOOTCONF";

/// Marker at the start of a partition holding an EFI app
pub const EFI_MAGIC: &[u8; 8] = b"EFIAPP\0\0";

/// In-memory block device for testing. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Rc<RefCell<Vec<u8>>>,
    pub block_size: usize,
}

impl MemoryBlockDevice {
    pub fn new(num_blocks: usize) -> Self {
        Self {
            data: Rc::new(RefCell::new(vec![0u8; num_blocks * BLOCK_SIZE])),
            block_size: BLOCK_SIZE,
        }
    }

    /// Copy `bytes` to the start of block `lba`
    pub fn poke(&self, lba: u64, bytes: &[u8]) {
        let offset = lba as usize * self.block_size;
        self.data.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::new(self.block_size as u32).expect("valid block size")
    }

    fn num_blocks(&mut self) -> std::result::Result<u64, Self::Error> {
        Ok((self.data.borrow().len() / self.block_size) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> std::result::Result<(), Self::Error> {
        let data = self.data.borrow();
        let offset = start_lba.0 as usize * self.block_size;
        if offset + dst.len() > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> std::result::Result<(), Self::Error> {
        let mut data = self.data.borrow_mut();
        let offset = start_lba.0 as usize * self.block_size;
        if offset + src.len() > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> std::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// One partition to put in a test GPT: (entry slot, type, first LBA, last LBA)
pub type PartSpec = (usize, PartitionType, u64, u64);

/// Build a disk with a protective MBR, a primary GPT and the given
/// partitions. Slot `n` becomes partition number `n + 1`.
pub fn make_gpt_disk(num_blocks: u64, parts: &[PartSpec]) -> MemoryBlockDevice {
    let dev = MemoryBlockDevice::new(num_blocks as usize);
    let mut disk = Disk::new(dev.clone()).expect("disk");

    let mut header = GptHeader {
        my_lba: LbaLe::from_u64(1),
        alternate_lba: LbaLe::from_u64(num_blocks - 1),
        first_usable_lba: LbaLe::from_u64(34),
        last_usable_lba: LbaLe::from_u64(num_blocks - 34),
        disk_guid: guid!("12345678-1234-1234-1234-123456789012"),
        partition_entry_lba: LbaLe::from_u64(2),
        number_of_partition_entries: U32Le::from_u32(128),
        ..Default::default()
    };

    disk.write_protective_mbr(&mut [0u8; 512]).expect("mbr");

    let layout = header
        .get_partition_entry_array_layout()
        .expect("layout");
    let mut entry_buf = vec![0u8; 16384];
    let mut entry_array =
        GptPartitionEntryArray::new(layout, BlockSize::BS_512, &mut entry_buf).expect("array");

    for &(slot, ty, start, end) in parts {
        let entry = entry_array
            .get_partition_entry_mut(slot.try_into().unwrap())
            .expect("slot");
        entry.partition_type_guid = ty.to_gpt_guid();
        entry.unique_partition_guid = guid!("12345678-1234-5678-1234-567812345678");
        entry.starting_lba = LbaLe::from_u64(start);
        entry.ending_lba = LbaLe::from_u64(end);
    }

    header.partition_entry_array_crc32 = entry_array.calculate_crc32();
    header.update_header_crc32();

    disk.write_primary_gpt_header(&header, &mut [0u8; 512])
        .expect("header");
    disk.write_gpt_partition_entry_array(&entry_array)
        .expect("entries");
    disk.flush().expect("flush");

    dev
}

/// Write a boot file record (`magic`, u32 length, payload) at `lba`
pub fn put_file(dev: &MemoryBlockDevice, lba: u64, magic: &[u8; 8], payload: &[u8]) {
    let mut rec = Vec::new();
    rec.extend_from_slice(magic);
    rec.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    rec.extend_from_slice(payload);
    dev.poke(lba, &rec);
}

/// Standard test disk: partition 1 holds a boot config, partition 2 has a
/// corrupt one, partition 3 holds an EFI app
pub fn standard_disk() -> MemoryBlockDevice {
    let dev = make_gpt_disk(
        2048,
        &[
            (0, PartitionType::LinuxFilesystem, 64, 127),
            (1, PartitionType::LinuxFilesystem, 128, 191),
            (2, PartitionType::EfiSystem, 192, 255),
        ],
    );
    put_file(&dev, 64, CONF_MAGIC, b"label linux\n  kernel /vmlinuz\n");
    // Claims far more data than the partition holds
    let mut bad = CONF_MAGIC.to_vec();
    bad.extend_from_slice(&u32::MAX.to_le_bytes());
    dev.poke(128, &bad);
    put_file(&dev, 192, EFI_MAGIC, b"MZ\x90\x00");
    dev
}

pub fn block_media(dev: MemoryBlockDevice) -> Box<dyn BlockDevice> {
    Box::new(GptBlockDevice::new(dev))
}

// ═══════════════════════════════════════════════════════════════════════════
// MEDIA WRAPPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Media that reports not-ready for a number of polls
pub struct SlowMedia {
    inner: GptBlockDevice<MemoryBlockDevice>,
    /// Polls before the media is ready; `None` never becomes ready
    ready_after: Option<u32>,
    polls: u32,
    pub resets: Rc<Cell<u32>>,
}

impl SlowMedia {
    pub fn new(dev: MemoryBlockDevice, ready_after: Option<u32>) -> Self {
        Self {
            inner: GptBlockDevice::new(dev),
            ready_after,
            polls: 0,
            resets: Rc::new(Cell::new(0)),
        }
    }
}

impl BlockDevice for SlowMedia {
    fn block_size(&self) -> u32 {
        self.inner.block_size()
    }

    fn num_blocks(&mut self) -> Result<u64> {
        self.inner.num_blocks()
    }

    fn read_blocks(&mut self, lba: u64, dst: &mut [u8]) -> Result<()> {
        self.inner.read_blocks(lba, dst)
    }

    fn partitions(&mut self) -> Result<&PartitionTable> {
        self.inner.partitions()
    }

    fn media_ready(&mut self) -> Result<bool> {
        self.polls += 1;
        Ok(self.ready_after.map_or(false, |n| self.polls > n))
    }

    fn reset(&mut self) {
        self.polls = 0;
        self.resets.set(self.resets.get() + 1);
    }
}

/// Empty card slot
pub struct NoMedia;

impl BlockDevice for NoMedia {
    fn block_size(&self) -> u32 {
        BLOCK_SIZE as u32
    }

    fn num_blocks(&mut self) -> Result<u64> {
        Ok(0)
    }

    fn read_blocks(&mut self, _lba: u64, _dst: &mut [u8]) -> Result<()> {
        Err(BootError::Io)
    }

    fn partitions(&mut self) -> Result<&PartitionTable> {
        Err(BootError::Io)
    }

    fn media_ready(&mut self) -> Result<bool> {
        Err(BootError::ProtocolNotSupported)
    }
}

/// Network link serving a fixed set of files
pub struct MockNet {
    pub files: Vec<(String, Vec<u8>)>,
}

impl NetTransport for MockNet {
    fn link_up(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn fetch(&mut self, path: &str) -> Result<Vec<u8>> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, d)| d.clone())
            .ok_or(BootError::NotFound)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCRIPTED BOOTMETHS
// ═══════════════════════════════════════════════════════════════════════════

/// What a scripted bootmeth's boot operation does
#[derive(Debug, Clone, Copy)]
pub enum BootOutcome {
    /// Returns without booting
    Returns,
    /// Fails with the given error
    Fails(BootError),
}

/// Bootmeth finding a record with a given magic at the start of a partition
pub struct FileMeth {
    name: &'static str,
    magic: &'static [u8; 8],
    fname: &'static str,
    pub outcome: BootOutcome,
    pub boots: Rc<Cell<u32>>,
    can_boot: bool,
}

impl FileMeth {
    pub fn extlinux() -> Self {
        Self {
            name: "extlinux",
            magic: CONF_MAGIC,
            fname: "/extlinux/extlinux.conf",
            outcome: BootOutcome::Returns,
            boots: Rc::new(Cell::new(0)),
            can_boot: true,
        }
    }

    pub fn efi() -> Self {
        Self {
            name: "efi",
            magic: EFI_MAGIC,
            fname: "/EFI/BOOT/BOOTAA64.EFI",
            outcome: BootOutcome::Returns,
            boots: Rc::new(Cell::new(0)),
            can_boot: true,
        }
    }

    pub fn outcome(mut self, outcome: BootOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Drop the boot capability
    pub fn no_boot(mut self) -> Self {
        self.can_boot = false;
        self
    }
}

impl Bootmeth for FileMeth {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self, iter: &BootflowIter) -> Result<()> {
        iter.uses_blk_dev()
    }

    fn read_bootflow(&mut self, dev: Option<&mut Bootdev>, bflow: &mut Bootflow) -> Result<()> {
        let dev = dev.ok_or(BootError::NoDevice)?;
        let blk = dev.blk().ok_or(BootError::NotSupported)?;

        let start = match bflow.part {
            0 => 0,
            n => blk.partitions()?.find(n).ok_or(BootError::NotFound)?.start_lba,
        };
        let bs = blk.block_size() as u64;
        let head = blk.read_bytes(start * bs, 12)?;
        if &head[..8] != self.magic {
            return Err(BootError::NotFound);
        }
        bflow.advance(BootflowState::Fs);
        bflow.fname = Some(String::from(self.fname));
        bflow.advance(BootflowState::File);

        let len = u32::from_le_bytes([head[8], head[9], head[10], head[11]]) as u64;
        if len == 0 || len > 16 * bs {
            return Err(BootError::Invalid);
        }
        let data = blk.read_bytes(start * bs + 12, len as usize)?;
        bflow.set_ready(data)
    }

    fn as_file_reader(&mut self) -> Option<&mut dyn ReadFile> {
        Some(self)
    }

    fn as_bootable(&mut self) -> Option<&mut dyn Boot> {
        if self.can_boot {
            Some(self)
        } else {
            None
        }
    }
}

impl ReadFile for FileMeth {
    fn read_file(&mut self, _dev: Option<&mut Bootdev>, bflow: &Bootflow, path: &str) -> Result<Vec<u8>> {
        if bflow.fname.as_deref() == Some(path) {
            bflow.buf().map(|b| b.to_vec()).ok_or(BootError::NotFound)
        } else {
            Err(BootError::NotFound)
        }
    }
}

impl Boot for FileMeth {
    fn boot(&mut self, _dev: Option<&mut Bootdev>, _bflow: &mut Bootflow) -> Result<()> {
        self.boots.set(self.boots.get() + 1);
        match self.outcome {
            BootOutcome::Returns => Ok(()),
            BootOutcome::Fails(err) => Err(err),
        }
    }
}

/// Bootmeth fetching a config over the network
pub struct PxeMeth;

impl Bootmeth for PxeMeth {
    fn name(&self) -> &str {
        "pxe"
    }

    fn check(&self, iter: &BootflowIter) -> Result<()> {
        iter.uses_network()
    }

    fn read_bootflow(&mut self, dev: Option<&mut Bootdev>, bflow: &mut Bootflow) -> Result<()> {
        let net = dev
            .and_then(|d| d.net())
            .ok_or(BootError::NotSupported)?;
        let data = net.fetch("pxelinux.cfg/default")?;
        bflow.fname = Some(String::from("pxelinux.cfg/default"));
        bflow.set_ready(data)
    }
}

/// Global bootmeth that always produces a bootflow
pub struct GlobalMeth {
    pub outcome: BootOutcome,
    pub boots: Rc<Cell<u32>>,
    /// Calls that were handed a bootdev
    pub dev_calls: Rc<Cell<u32>>,
    any_transport: bool,
    unfinished: bool,
}

impl GlobalMeth {
    pub fn new(outcome: BootOutcome) -> Self {
        Self {
            outcome,
            boots: Rc::new(Cell::new(0)),
            dev_calls: Rc::new(Cell::new(0)),
            any_transport: false,
            unfinished: false,
        }
    }

    /// Report success from `read_bootflow` without loading anything
    pub fn unfinished(mut self) -> Self {
        self.unfinished = true;
        self
    }

    /// Accept every transport in `check`
    pub fn any_transport(mut self) -> Self {
        self.any_transport = true;
        self
    }
}

impl Bootmeth for GlobalMeth {
    fn name(&self) -> &str {
        "firmware"
    }

    fn is_global(&self) -> bool {
        true
    }

    fn check(&self, iter: &BootflowIter) -> Result<()> {
        if self.any_transport {
            return Ok(());
        }
        iter.uses_system()
    }

    fn read_bootflow(&mut self, dev: Option<&mut Bootdev>, bflow: &mut Bootflow) -> Result<()> {
        if dev.is_some() {
            self.dev_calls.set(self.dev_calls.get() + 1);
        }
        if self.unfinished {
            bflow.fname = Some(String::from("firmware"));
            return Ok(());
        }
        bflow.set_ready(b"firmware image".to_vec())
    }

    fn as_bootable(&mut self) -> Option<&mut dyn Boot> {
        Some(self)
    }
}

impl Boot for GlobalMeth {
    fn boot(&mut self, _dev: Option<&mut Bootdev>, _bflow: &mut Bootflow) -> Result<()> {
        self.boots.set(self.boots.get() + 1);
        match self.outcome {
            BootOutcome::Returns => Ok(()),
            BootOutcome::Fails(err) => Err(err),
        }
    }
}
