//! VBE state records
//!
//! Two records live beside the firmware FIT in the VBE area: a version
//! string and a small non-volatile state block.
//!
//! ```text
//!   nvdata (little-endian, 64 bytes)
//!   0x00  u8   crc8 over bytes 1 .. size
//!   0x01  u8   hdr: bits 3:0 version (1), bits 7:4 log2(size)
//!   0x02  u16  spare
//!   0x04  u32  fw_vernum: key version << 16 | firmware version
//!   0x08  ...  spare
//! ```

use alloc::string::String;

use crate::crc8::crc8;
use crate::error::{Result, VbeError};

pub const NVD_HDR_VER_MASK: u8 = 0x0f;
pub const NVD_HDR_SIZE_MASK: u8 = 0xf0;
pub const NVD_HDR_SIZE_SHIFT: u8 = 4;
pub const NVD_HDR_VER_CUR: u8 = 1;

/// Size of the state record as laid out on media
pub const NVDATA_SIZE: usize = 0x40;

/// Maximum length of the version record
pub const MAX_VERSION_LEN: usize = 256;

/// Firmware state read from the VBE area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbeState {
    /// Version string of the installed firmware
    pub fw_version: String,
    /// Combined key and firmware version number
    pub fw_vernum: u32,
}

impl VbeState {
    pub fn key_version(&self) -> u16 {
        (self.fw_vernum >> 16) as u16
    }

    pub fn firmware_version(&self) -> u16 {
        (self.fw_vernum & 0xffff) as u16
    }
}

/// Check a state record and return its version number.
///
/// Fails with `Permission` if the header version is unknown, the declared
/// size does not fit in `buf`, or the CRC does not match.
pub fn parse_nvdata(buf: &[u8]) -> Result<u32> {
    if buf.len() < 8 {
        return Err(VbeError::Permission);
    }
    let hdr = buf[1];
    if hdr & NVD_HDR_VER_MASK != NVD_HDR_VER_CUR {
        return Err(VbeError::Permission);
    }
    let size = 1usize << ((hdr & NVD_HDR_SIZE_MASK) >> NVD_HDR_SIZE_SHIFT);
    if size < 8 || size > buf.len() {
        return Err(VbeError::Permission);
    }
    if crc8(0, &buf[1..size]) != buf[0] {
        return Err(VbeError::Permission);
    }

    Ok(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]))
}

/// Extract the version string, which must be NUL-terminated within `buf`
pub fn parse_version(buf: &[u8]) -> Result<String> {
    let buf = &buf[..buf.len().min(MAX_VERSION_LEN)];
    let len = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(VbeError::BadFile)?;
    core::str::from_utf8(&buf[..len])
        .map(String::from)
        .map_err(|_| VbeError::BadFile)
}
