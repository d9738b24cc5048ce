//! Bootstd Core Library
//!
//! Discovery engine for the standard boot flow: finds bootflows on
//! bootdevs using bootmeths, and hands the chosen one control.
//! Designed to be no_std compatible.
//!
//! # Architecture
//!
//! ```text
//!   Bootstd (session)
//!     ├── BootflowIter ── walks bootdev × partition × bootmeth
//!     ├── Bootdev ─────── Transport::{Block, Network, System}
//!     │                     └── BlockDevice (GptBlockDevice over gpt_disk_io)
//!     ├── Bootmeth ────── check / read_bootflow, optional ReadFile / Boot
//!     └── Bootflow ────── state Base → Media → Part → Fs → File → Ready
//! ```

#![no_std]
#![allow(clippy::new_without_default)]

extern crate alloc;

pub mod bootdev;
pub mod bootflow;
pub mod bootmeth;
pub mod bootstd;
pub mod config;
pub mod disk;
pub mod error;
pub mod iter;
pub mod logger;
pub mod time;

pub use bootdev::{Bootdev, BootdevId, BootdevPrio, NetTransport, Transport, TransportKind};
pub use bootflow::{state_get_name, ArgValue, Bootflow, BootflowState};
pub use bootmeth::{Boot, Bootmeth, BootmethId, ReadFile};
pub use bootstd::{Bootstd, BootflowHandle, ScanSummary};
pub use config::BootstdConfig;
pub use error::{BootError, Result};
pub use iter::{BootflowIter, IterFlags};
