//! VBE Simple Firmware Loader
//!
//! Verified Boot for Embedded, simple variant: firmware for the next boot
//! phase is kept in a FIT at a fixed place on raw block storage, beside a
//! version string and a CRC-protected state record.
//!
//! `VbeSimple` is a global bootmeth; register it with a `Bootstd` session
//! and it is tried once at the start of every scan.
//!
//! ```ignore
//! let config = VbeSimpleConfig::default().storage("mmc1").phase(Phase::Spl);
//! let vbe = VbeSimple::new(config, Box::new(GptBlockDevice::new(emmc)))?;
//! bootstd.add_bootmeth(Box::new(vbe));
//! ```

#![no_std]

extern crate alloc;

pub mod crc8;
pub mod error;
pub mod fdt;
pub mod fit;
pub mod simple;
pub mod state;

pub use error::{Result, VbeError};
pub use fdt::Fdt;
pub use fit::{find_image, ImageData, Phase};
pub use simple::{Firmware, VbeSimple, VbeSimpleConfig};
pub use state::VbeState;
