//! Bootmeth contract
//!
//! A bootmeth knows how to find and load one kind of bootflow (extlinux
//! config, EFI app, verified-boot firmware, ...). The mandatory operations
//! are on `Bootmeth`; reading extra files and booting are optional
//! capabilities exposed through `as_file_reader` / `as_bootable`.
//!
//! ```text
//!   check()          cheap: can this bootmeth use the iterator's transport?
//!   read_bootflow()  load the bootflow, advance its state towards Ready
//!   read_file()      optional: fetch another file relative to the bootflow
//!   boot()           optional: hand over control, never returns on success
//! ```

use alloc::vec::Vec;

use crate::bootdev::Bootdev;
use crate::bootflow::Bootflow;
use crate::error::Result;
use crate::iter::BootflowIter;

/// Index of a bootmeth within a discovery session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BootmethId(pub(crate) usize);

impl BootmethId {
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// A boot method
pub trait Bootmeth {
    fn name(&self) -> &str;

    /// Global bootmeths are not tied to a bootdev and run once per scan
    fn is_global(&self) -> bool {
        false
    }

    /// Check whether this bootmeth can work with the iterator's current
    /// transport. Use the iterator's `uses_*` guards.
    fn check(&self, iter: &BootflowIter) -> Result<()>;

    /// Find and load a bootflow. `dev` is `None` for global bootmeths.
    fn read_bootflow(&mut self, dev: Option<&mut Bootdev>, bflow: &mut Bootflow) -> Result<()>;

    fn as_file_reader(&mut self) -> Option<&mut dyn ReadFile> {
        None
    }

    fn as_bootable(&mut self) -> Option<&mut dyn Boot> {
        None
    }
}

/// Optional capability: read further files for a loaded bootflow
pub trait ReadFile {
    fn read_file(&mut self, dev: Option<&mut Bootdev>, bflow: &Bootflow, path: &str) -> Result<Vec<u8>>;
}

/// Optional capability: boot a loaded bootflow
pub trait Boot {
    /// Transfer control to the bootflow. Returning at all means the boot
    /// did not happen.
    fn boot(&mut self, dev: Option<&mut Bootdev>, bflow: &mut Bootflow) -> Result<()>;
}
