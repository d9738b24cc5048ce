//! VBE-simple firmware bootmeth
//!
//! Loads the firmware for the next phase from a FIT stored at a fixed
//! place on raw block storage, reading no more than it has to:
//!
//! ```text
//!   area_start                                        area_start + area_size
//!   │                                                                   │
//!   ├── state_offset ─► [nvdata]                                        │
//!   ├── version_offset ► [version string]                               │
//!   └── skip_offset ──► [FIT tree | external image data ...]            │
//!
//!   read 1:  first meta_size bytes of the FIT (magic, totalsize, tree)
//!   read 2:  rest of the tree                 (only if totalsize > meta_size)
//!   read 3:  blocks holding external data     (only if not already read)
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use bootstd_core::disk::BlockDevice;
use bootstd_core::logger::LogStage;
use bootstd_core::{
    log_debug, log_error, log_info, log_warn, Boot, BootError, Bootdev, Bootflow, BootflowIter,
    BootflowState, Bootmeth,
};

use crate::error::{Result, VbeError};
use crate::fdt::{self, Fdt, FDT_MAGIC};
use crate::fit::{find_image, Phase};
use crate::state::{parse_nvdata, parse_version, VbeState, MAX_VERSION_LEN};

/// Where the VBE records and firmware live on storage. Offsets other than
/// `area_start` are relative to `area_start`, and all are in bytes.
#[derive(Debug, Clone)]
pub struct VbeSimpleConfig {
    /// Storage device name, for messages
    pub storage: String,
    pub area_start: u64,
    pub area_size: u64,
    /// FIT position within the area
    pub skip_offset: u64,
    /// Bytes read from the FIT position up front, clamped to the area
    pub meta_size: u64,
    pub state_offset: u64,
    pub state_size: u64,
    pub version_offset: u64,
    pub version_size: u64,
    /// Phase whose firmware is loaded
    pub phase: Phase,
    /// Address the loaded image is reported at
    pub staging_addr: u64,
}

impl Default for VbeSimpleConfig {
    fn default() -> Self {
        Self {
            storage: String::from("mmc1"),
            area_start: 0x10_0000,
            area_size: 0x10_0000,
            skip_offset: 0x1000,
            meta_size: 0x1000,
            state_offset: 0,
            state_size: 0x40,
            version_offset: 0x200,
            version_size: 0x100,
            phase: Phase::UBoot,
            staging_addr: 0x100_0000,
        }
    }
}

impl VbeSimpleConfig {
    pub fn storage(mut self, name: &str) -> Self {
        self.storage = String::from(name);
        self
    }

    pub fn area(mut self, start: u64, size: u64) -> Self {
        self.area_start = start;
        self.area_size = size;
        self
    }

    pub fn skip_offset(mut self, offset: u64) -> Self {
        self.skip_offset = offset;
        self
    }

    pub fn meta_size(mut self, size: u64) -> Self {
        self.meta_size = size;
        self
    }

    pub fn state_record(mut self, offset: u64, size: u64) -> Self {
        self.state_offset = offset;
        self.state_size = size;
        self
    }

    pub fn version_record(mut self, offset: u64, size: u64) -> Self {
        self.version_offset = offset;
        self.version_size = size;
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn staging_addr(mut self, addr: u64) -> Self {
        self.staging_addr = addr;
        self
    }

    /// Check the layout against the storage block size: offsets must be
    /// block aligned and both records must lie inside the area.
    pub fn validate(&self, block_size: u32) -> Result<()> {
        let bs = block_size as u64;
        if bs == 0 || self.area_size == 0 || self.meta_size == 0 {
            return Err(VbeError::InvalidConfig);
        }
        let aligned = [
            self.area_start,
            self.skip_offset,
            self.meta_size,
            self.state_offset,
            self.version_offset,
        ];
        if aligned.iter().any(|off| off % bs != 0) {
            return Err(VbeError::InvalidConfig);
        }
        if self.skip_offset >= self.area_size {
            return Err(VbeError::InvalidConfig);
        }

        let inside = |off: u64, size: u64| {
            size != 0 && off.checked_add(size).map_or(false, |end| end <= self.area_size)
        };
        if !inside(self.state_offset, self.state_size)
            || !inside(self.version_offset, self.version_size)
            || self.version_size > MAX_VERSION_LEN as u64
        {
            return Err(VbeError::InvalidConfig);
        }
        Ok(())
    }
}

/// Firmware image read from the FIT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    /// FIT image node the data came from
    pub image: String,
    pub data: Vec<u8>,
    pub load_addr: u64,
}

/// Global bootmeth loading firmware from a VBE area
pub struct VbeSimple {
    name: String,
    config: VbeSimpleConfig,
    blk: Box<dyn BlockDevice>,
}

impl VbeSimple {
    pub fn new(config: VbeSimpleConfig, blk: Box<dyn BlockDevice>) -> Result<Self> {
        config.validate(blk.block_size())?;
        Ok(Self {
            name: String::from("vbe_simple"),
            config,
            blk,
        })
    }

    /// Use a different bootmeth name
    pub fn named(mut self, name: &str) -> Self {
        self.name = String::from(name);
        self
    }

    pub fn config(&self) -> &VbeSimpleConfig {
        &self.config
    }

    fn read_blocks(&mut self, lba: u64, count: u64) -> Result<Vec<u8>> {
        let bs = self.blk.block_size() as u64;
        let len = count.checked_mul(bs).ok_or(VbeError::TooBig)? as usize;

        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| VbeError::OutOfMemory)?;
        buf.resize(len, 0);

        log_debug!(
            LogStage::Vbe,
            "read {} blocks at {} from '{}'",
            count,
            lba,
            self.config.storage
        );
        self.blk.read_blocks(lba, &mut buf).map_err(|_| {
            log_error!(LogStage::Vbe, "Read failed at block {}", lba);
            VbeError::Io
        })?;
        Ok(buf)
    }

    /// Load the firmware image for the configured phase.
    ///
    /// # Errors
    ///
    /// - `NoFit`: no device tree magic at the FIT position
    /// - `TooBig`: the tree is larger than the area, or the image data
    ///   runs past its end
    /// - `ImageNotFound`: no usable image for the phase
    /// - `Io`: storage read failed
    pub fn load_firmware(&mut self) -> Result<Firmware> {
        let bs = self.blk.block_size() as usize;
        let fit_start = self.config.area_start + self.config.skip_offset;
        let first = fit_start / bs as u64;

        // The magic check and a small tree share one read
        let area_left = (self.config.area_size - self.config.skip_offset) / bs as u64;
        let head = (self.config.meta_size / bs as u64).min(area_left).max(1);
        let mut staged = self.read_blocks(first, head)?;
        if fdt::magic(&staged) != Some(FDT_MAGIC) {
            log_warn!(
                LogStage::Vbe,
                "No FIT at offset {:#x} on '{}'",
                fit_start,
                self.config.storage
            );
            return Err(VbeError::NoFit);
        }
        let size = fdt::totalsize(&staged).ok_or(VbeError::NoFit)? as usize;
        if size as u64 > self.config.area_size {
            log_error!(
                LogStage::Vbe,
                "FIT size {:#x} exceeds area size {:#x}",
                size,
                self.config.area_size
            );
            return Err(VbeError::TooBig);
        }

        let meta_blocks = size.div_ceil(bs) as u64;
        if meta_blocks > head {
            let rest = self.read_blocks(first + head, meta_blocks - head)?;
            staged.try_reserve_exact(rest.len())
                .map_err(|_| VbeError::OutOfMemory)?;
            staged.extend_from_slice(&rest);
        }

        let (image, offset, len) = {
            let fit = Fdt::new(&staged[..size])?;
            let found = find_image(&fit, self.config.phase)?;
            (String::from(found.name), found.offset, found.size)
        };
        let end = offset.checked_add(len).ok_or(VbeError::TooBig)?;
        if end as u64 > self.config.area_size {
            log_error!(LogStage::Vbe, "Image '{}' extends past the firmware area", image);
            return Err(VbeError::TooBig);
        }

        let data = if end <= staged.len() {
            staged[offset..end].to_vec()
        } else {
            // One more read, starting at the first block not yet staged
            let from = (offset / bs).max(staged.len() / bs);
            let to = end.div_ceil(bs);
            let more = self.read_blocks(first + from as u64, (to - from) as u64)?;
            let base = from * bs;
            if offset >= base {
                more[offset - base..end - base].to_vec()
            } else {
                let mut data = staged[offset..].to_vec();
                data.extend_from_slice(&more[..end - base]);
                data
            }
        };

        log_info!(
            LogStage::Vbe,
            "Loaded {} image '{}': {:#x} bytes",
            self.config.phase.name(),
            image,
            data.len()
        );

        Ok(Firmware {
            image,
            data,
            load_addr: self.config.staging_addr,
        })
    }

    /// Read the firmware version string and state record
    pub fn read_state(&mut self) -> Result<VbeState> {
        let start = self.config.area_start;

        let version = self
            .blk
            .read_bytes(start + self.config.version_offset, self.config.version_size as usize)?;
        let fw_version = parse_version(&version)?;

        let nvdata = self
            .blk
            .read_bytes(start + self.config.state_offset, self.config.state_size as usize)?;
        let fw_vernum = parse_nvdata(&nvdata).map_err(|e| {
            log_error!(LogStage::Vbe, "State record on '{}' is corrupt", self.config.storage);
            e
        })?;

        Ok(VbeState {
            fw_version,
            fw_vernum,
        })
    }
}

impl Bootmeth for VbeSimple {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_global(&self) -> bool {
        true
    }

    fn check(&self, iter: &BootflowIter) -> bootstd_core::Result<()> {
        iter.uses_system()
    }

    fn read_bootflow(
        &mut self,
        _dev: Option<&mut Bootdev>,
        bflow: &mut Bootflow,
    ) -> bootstd_core::Result<()> {
        bflow.advance(BootflowState::Media);
        let fw = self.load_firmware()?;

        bflow.advance(BootflowState::File);
        bflow.fname = Some(fw.image);
        bflow.load_addr = fw.load_addr;
        bflow.set_ready(fw.data)
    }

    fn as_bootable(&mut self) -> Option<&mut dyn Boot> {
        Some(self)
    }
}

impl Boot for VbeSimple {
    fn boot(&mut self, _dev: Option<&mut Bootdev>, _bflow: &mut Bootflow) -> bootstd_core::Result<()> {
        log_warn!(LogStage::Vbe, "Jumping to firmware is not available here");
        Err(BootError::NotSupported)
    }
}
