//! Common test utilities: memory-backed storage and a FIT writer

#![allow(dead_code)]

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use bootstd_core::disk::{BlockDevice, GptBlockDevice, PartitionTable};
use bootstd_core::Result;
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

pub const BLOCK_SIZE: usize = 512;

/// Start of the VBE area used by the tests
pub const AREA_START: u64 = 0x8000;
pub const AREA_SIZE: u64 = 0x10000;
pub const SKIP_OFFSET: u64 = 0x1000;

/// First block of the FIT with the test layout
pub const FIT_LBA: u64 = (AREA_START + SKIP_OFFSET) / BLOCK_SIZE as u64;

/// In-memory block device for testing. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Rc<RefCell<Vec<u8>>>,
}

impl MemoryBlockDevice {
    pub fn new(num_blocks: usize) -> Self {
        Self {
            data: Rc::new(RefCell::new(vec![0u8; num_blocks * BLOCK_SIZE])),
        }
    }

    /// Copy `bytes` to byte offset `offset`
    pub fn poke(&self, offset: u64, bytes: &[u8]) {
        let offset = offset as usize;
        self.data.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> std::result::Result<u64, Self::Error> {
        Ok((self.data.borrow().len() / BLOCK_SIZE) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> std::result::Result<(), Self::Error> {
        let data = self.data.borrow();
        let offset = start_lba.0 as usize * BLOCK_SIZE;
        if offset + dst.len() > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, _start_lba: Lba, _src: &[u8]) -> std::result::Result<(), Self::Error> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }

    fn flush(&mut self) -> std::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Block device recording each read as (lba, block count)
pub struct CountingDevice {
    inner: GptBlockDevice<MemoryBlockDevice>,
    pub reads: Rc<RefCell<Vec<(u64, u64)>>>,
}

impl CountingDevice {
    pub fn new(dev: MemoryBlockDevice) -> Self {
        Self {
            inner: GptBlockDevice::new(dev),
            reads: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl BlockDevice for CountingDevice {
    fn block_size(&self) -> u32 {
        self.inner.block_size()
    }

    fn num_blocks(&mut self) -> Result<u64> {
        self.inner.num_blocks()
    }

    fn read_blocks(&mut self, lba: u64, dst: &mut [u8]) -> Result<()> {
        self.reads
            .borrow_mut()
            .push((lba, (dst.len() / BLOCK_SIZE) as u64));
        self.inner.read_blocks(lba, dst)
    }

    fn partitions(&mut self) -> Result<&PartitionTable> {
        self.inner.partitions()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FDT / FIT WRITER
// ═══════════════════════════════════════════════════════════════════════════

/// Flattened device tree writer, version 17
#[derive(Default)]
pub struct FdtWriter {
    structs: Vec<u8>,
    strings: Vec<u8>,
}

impl FdtWriter {
    pub fn begin_node(&mut self, name: &str) {
        self.structs.extend_from_slice(&1u32.to_be_bytes());
        self.structs.extend_from_slice(name.as_bytes());
        self.structs.push(0);
        self.pad();
    }

    pub fn end_node(&mut self) {
        self.structs.extend_from_slice(&2u32.to_be_bytes());
    }

    pub fn prop(&mut self, name: &str, value: &[u8]) {
        let nameoff = self.string_offset(name);
        self.structs.extend_from_slice(&3u32.to_be_bytes());
        self.structs.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.structs.extend_from_slice(&nameoff.to_be_bytes());
        self.structs.extend_from_slice(value);
        self.pad();
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) {
        self.prop(name, &value.to_be_bytes());
    }

    pub fn prop_str(&mut self, name: &str, value: &str) {
        self.prop_strlist(name, &[value]);
    }

    pub fn prop_strlist(&mut self, name: &str, values: &[&str]) {
        let mut buf = Vec::new();
        for v in values {
            buf.extend_from_slice(v.as_bytes());
            buf.push(0);
        }
        self.prop(name, &buf);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.structs.extend_from_slice(&9u32.to_be_bytes());

        let off_rsvmap = 40u32;
        let off_struct = off_rsvmap + 16;
        let off_strings = off_struct + self.structs.len() as u32;
        let totalsize = off_strings + self.strings.len() as u32;

        let mut out = Vec::with_capacity(totalsize as usize);
        for word in [
            0xd00d_feedu32,
            totalsize,
            off_struct,
            off_strings,
            off_rsvmap,
            17,
            16,
            0,
            self.strings.len() as u32,
            self.structs.len() as u32,
        ] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&self.structs);
        out.extend_from_slice(&self.strings);
        out
    }

    fn pad(&mut self) {
        while self.structs.len() % 4 != 0 {
            self.structs.push(0);
        }
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let mut off = 0;
        for s in self.strings.split(|&b| b == 0) {
            if s == name.as_bytes() {
                return off as u32;
            }
            off += s.len() + 1;
        }
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        off
    }
}

/// How an image's data is stored in the FIT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `data` property inside the tree
    Embedded,
    /// `data-offset` after the tree
    Offset,
    /// `data-position` from the start of the FIT
    Position,
}

struct FitImage {
    name: String,
    phase: Option<String>,
    data: Vec<u8>,
    placement: Placement,
}

/// Builds a FIT with one configuration, `conf-1`
pub struct FitBuilder {
    images: Vec<FitImage>,
    firmware: Vec<String>,
    loadables: Vec<String>,
    with_default: bool,
    gap: usize,
}

impl FitBuilder {
    pub fn new() -> Self {
        Self {
            images: Vec::new(),
            firmware: Vec::new(),
            loadables: Vec::new(),
            with_default: true,
            gap: 0,
        }
    }

    pub fn image(mut self, name: &str, phase: Option<&str>, data: &[u8], placement: Placement) -> Self {
        self.images.push(FitImage {
            name: name.to_string(),
            phase: phase.map(str::to_string),
            data: data.to_vec(),
            placement,
        });
        self
    }

    pub fn firmware(mut self, names: &[&str]) -> Self {
        self.firmware = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn loadables(mut self, names: &[&str]) -> Self {
        self.loadables = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Leave out the `default` property of /configurations
    pub fn no_default(mut self) -> Self {
        self.with_default = false;
        self
    }

    /// Padding between the tree and the first external image
    pub fn gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    /// Size of the tree alone, i.e. its `totalsize`
    pub fn tree_size(&self) -> usize {
        self.tree(0).len()
    }

    pub fn build(&self) -> Vec<u8> {
        // Properties are fixed size, so positions do not change the layout
        let base = align4(self.tree_size());
        let mut out = self.tree(base);
        out.resize(base + self.gap, 0);
        for img in &self.images {
            if img.placement != Placement::Embedded {
                out.extend_from_slice(&img.data);
                out.resize(align4(out.len()), 0);
            }
        }
        out
    }

    fn tree(&self, base: usize) -> Vec<u8> {
        let mut w = FdtWriter::default();
        w.begin_node("");
        w.prop_str("description", "test firmware");
        w.prop_u32("#address-cells", 1);

        w.begin_node("images");
        let mut ext = self.gap;
        for img in &self.images {
            w.begin_node(&img.name);
            w.prop_str("description", &img.name);
            w.prop_str("type", "firmware");
            if let Some(phase) = &img.phase {
                w.prop_str("phase", phase);
            }
            match img.placement {
                Placement::Embedded => w.prop("data", &img.data),
                Placement::Offset => {
                    w.prop_u32("data-offset", ext as u32);
                    w.prop_u32("data-size", img.data.len() as u32);
                    ext += align4(img.data.len());
                }
                Placement::Position => {
                    w.prop_u32("data-position", (base + ext) as u32);
                    w.prop_u32("data-size", img.data.len() as u32);
                    ext += align4(img.data.len());
                }
            }
            w.prop_u32("load", 0xdead_0000);
            w.end_node();
        }
        w.end_node();

        w.begin_node("configurations");
        if self.with_default {
            w.prop_str("default", "conf-1");
        }
        w.begin_node("conf-1");
        if !self.firmware.is_empty() {
            let names: Vec<&str> = self.firmware.iter().map(String::as_str).collect();
            w.prop_strlist("firmware", &names);
        }
        if !self.loadables.is_empty() {
            let names: Vec<&str> = self.loadables.iter().map(String::as_str).collect();
            w.prop_strlist("loadables", &names);
        }
        w.end_node();
        w.end_node();

        w.end_node();
        w.finish()
    }
}

pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Test payload of `len` bytes
pub fn pattern_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// STATE RECORDS
// ═══════════════════════════════════════════════════════════════════════════

/// CRC-8, polynomial 0x07
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &b| {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
        }
        crc
    })
}

/// 64-byte state record holding `vernum`
pub fn nvdata(vernum: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 0x40];
    buf[1] = (6 << 4) | 1;
    buf[4..8].copy_from_slice(&vernum.to_le_bytes());
    buf[0] = crc8(&buf[1..]);
    buf
}

/// Device laid out like the test area, with `fit` at the FIT position
pub fn vbe_disk(fit: &[u8]) -> MemoryBlockDevice {
    let dev = MemoryBlockDevice::new(((AREA_START + AREA_SIZE) as usize).div_ceil(BLOCK_SIZE));
    dev.poke(AREA_START + SKIP_OFFSET, fit);
    dev.poke(AREA_START, &nvdata(0x0003_0007));
    dev.poke(AREA_START + 0x200, b"U-Boot v2024.10-rc1\0");
    dev
}
