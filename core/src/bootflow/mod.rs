//! Bootflows
//!
//! A bootflow is one way of booting, found on one bootdev partition by one
//! bootmeth. It carries a loading state that only ever moves forward:
//!
//! ```text
//!   Base ──► Media ──► Part ──► Fs ──► File ──► Ready
//!    │         │         │       │       │        │
//!  created   media    partition  fs    file    file contents
//!            found     found   mounted found   loaded (buf)
//! ```
//!
//! Global bootmeths skip the media and partition steps.

pub mod cmdline;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::bootdev::BootdevId;
use crate::bootmeth::BootmethId;
use crate::error::{BootError, Result};

pub use cmdline::ArgValue;

/// Loading state of a bootflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BootflowState {
    /// Nothing known yet
    Base = 0,
    /// Media exists
    Media = 1,
    /// Partition exists
    Part = 2,
    /// Filesystem recognised
    Fs = 3,
    /// Bootflow file located
    File = 4,
    /// Bootflow file loaded, ready to boot
    Ready = 5,
}

impl BootflowState {
    pub const COUNT: u32 = 6;

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Media => "media",
            Self::Part => "part",
            Self::Fs => "fs",
            Self::File => "file",
            Self::Ready => "ready",
        }
    }

    pub const fn from_u32(state: u32) -> Option<Self> {
        match state {
            0 => Some(Self::Base),
            1 => Some(Self::Media),
            2 => Some(Self::Part),
            3 => Some(Self::Fs),
            4 => Some(Self::File),
            5 => Some(Self::Ready),
            _ => None,
        }
    }
}

/// Name of a raw state value, `"?"` if out of range
pub fn state_get_name(state: u32) -> &'static str {
    match BootflowState::from_u32(state) {
        Some(s) => s.name(),
        None => "?",
    }
}

/// A discovered (possibly failed) way of booting
#[derive(Debug, Clone)]
pub struct Bootflow {
    /// Bootdev it came from, `None` for global bootmeths
    pub dev: Option<BootdevId>,
    pub method: BootmethId,
    /// Partition number, 0 for the whole device
    pub part: u32,
    state: BootflowState,
    pub name: Option<String>,
    /// Directory holding the bootflow file, with trailing '/'
    pub subdir: Option<String>,
    pub fname: Option<String>,
    buf: Option<Vec<u8>>,
    pub size: usize,
    /// Filesystem type found on the partition, 0 if none
    pub fs_type: u32,
    /// Error from the last attempt on this bootflow
    pub err: Option<BootError>,
    /// Operating system name, when the bootmeth can tell
    pub os_name: Option<String>,
    /// Kernel command line
    pub cmdline: Option<String>,
    /// Address the bootflow file was staged at
    pub load_addr: u64,
    /// True if the bootflow came from block media
    pub blk: bool,
}

impl Bootflow {
    /// Fresh bootflow linked to a bootdev and bootmeth. Does no I/O.
    pub fn new(dev: Option<BootdevId>, method: BootmethId) -> Self {
        Self {
            dev,
            method,
            part: 0,
            state: BootflowState::Base,
            name: None,
            subdir: None,
            fname: None,
            buf: None,
            size: 0,
            fs_type: 0,
            err: None,
            os_name: None,
            cmdline: None,
            load_addr: 0,
            blk: false,
        }
    }

    /// Standard name for a bootflow on `dev_name`, partition `part`
    pub fn make_name(dev_name: &str, part: u32) -> String {
        if part == 0 {
            format!("{}.whole", dev_name)
        } else {
            format!("{}.part_{:x}", dev_name, part)
        }
    }

    pub fn state(&self) -> BootflowState {
        self.state
    }

    /// Move forward to `state`. Never moves backwards; reaching `Ready`
    /// needs a loaded buffer (see `set_ready`). Returns whether the state
    /// changed.
    pub fn advance(&mut self, state: BootflowState) -> bool {
        if state <= self.state || (state == BootflowState::Ready && self.buf.is_none()) {
            return false;
        }
        self.state = state;
        true
    }

    /// Attach the loaded bootflow file and mark the bootflow ready
    pub fn set_ready(&mut self, buf: Vec<u8>) -> Result<()> {
        if buf.is_empty() {
            return Err(BootError::Invalid);
        }
        self.size = buf.len();
        self.buf = Some(buf);
        self.state = BootflowState::Ready;
        Ok(())
    }

    /// Loaded file contents, present only once ready
    pub fn buf(&self) -> Option<&[u8]> {
        self.buf.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.state == BootflowState::Ready
    }

    /// Release owned strings and buffers and return to `Base`. Safe to
    /// call more than once.
    pub fn free(&mut self) {
        self.state = BootflowState::Base;
        self.err = None;
        self.name = None;
        self.subdir = None;
        self.fname = None;
        self.buf = None;
        self.os_name = None;
        self.cmdline = None;
        self.size = 0;
    }

    /// Set, add or delete a kernel command-line argument.
    ///
    /// Deleting the last argument leaves no command line at all.
    pub fn cmdline_set_arg(&mut self, arg: &str, value: ArgValue<'_>) -> Result<()> {
        let cur = self.cmdline.as_deref().unwrap_or("");
        let new = cmdline::set_arg(cur, arg, value, None)?;
        self.cmdline = if new.is_empty() { None } else { Some(new) };
        Ok(())
    }

    /// Value of a kernel command-line argument
    pub fn cmdline_get_arg(&self, arg: &str) -> Result<&str> {
        let cur = self.cmdline.as_deref().ok_or(BootError::NotFound)?;
        let (pos, len) = cmdline::get_arg(cur, arg)?;
        Ok(&cur[pos..pos + len])
    }
}
