//! Bootdevs: devices that may hold a bootflow
//!
//! A bootdev owns exactly one transport. Block devices (MMC, USB, NVMe,
//! virtio-blk) carry a `BlockDevice`; network bootdevs carry a
//! `NetTransport`; system bootdevs have no media of their own.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::disk::BlockDevice;
use crate::error::Result;

/// Index of a bootdev within a discovery session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BootdevId(pub(crate) usize);

impl BootdevId {
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// Scan priority, lowest scanned first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum BootdevPrio {
    /// Must be set up before anything else is scanned
    PreScan = 1,
    /// Internal media, quick to probe (eMMC, NVMe)
    InternalFast = 2,
    /// Internal media, slow to probe (SATA)
    InternalSlow = 3,
    /// Needs a bus scan first, quick (USB mass storage)
    ScanFast = 4,
    /// Needs a bus scan first, slow
    ScanSlow = 5,
    /// Network boot
    NetBase = 6,
    /// Network boot of last resort
    NetFallback = 7,
}

/// Network link used by network bootdevs
pub trait NetTransport {
    /// Whether the link is up and configured
    fn link_up(&mut self) -> Result<bool>;

    /// Fetch a file by path from the boot server
    fn fetch(&mut self, path: &str) -> Result<Vec<u8>>;
}

/// Media attached to a bootdev
pub enum Transport {
    Block(Box<dyn BlockDevice>),
    Network(Box<dyn NetTransport>),
    System,
}

/// Transport kind, without the media itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Block,
    Network,
    System,
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Block(_) => TransportKind::Block,
            Self::Network(_) => TransportKind::Network,
            Self::System => TransportKind::System,
        }
    }
}

/// A device that may contain bootflows
pub struct Bootdev {
    name: String,
    prio: BootdevPrio,
    removable: bool,
    transport: Transport,
}

impl Bootdev {
    pub fn new(name: &str, prio: BootdevPrio, transport: Transport) -> Self {
        Self {
            name: String::from(name),
            prio,
            removable: false,
            transport,
        }
    }

    /// Block bootdev over the given media
    pub fn block(name: &str, prio: BootdevPrio, dev: Box<dyn BlockDevice>) -> Self {
        Self::new(name, prio, Transport::Block(dev))
    }

    /// Mark the media as removable (excluded from fixed-only scans)
    pub fn removable(mut self, removable: bool) -> Self {
        self.removable = removable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prio(&self) -> BootdevPrio {
        self.prio
    }

    pub fn is_removable(&self) -> bool {
        self.removable
    }

    pub fn transport(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Block media, if this is a block bootdev
    pub fn blk(&mut self) -> Option<&mut dyn BlockDevice> {
        match &mut self.transport {
            Transport::Block(dev) => Some(dev.as_mut()),
            _ => None,
        }
    }

    /// Network link, if this is a network bootdev
    pub fn net(&mut self) -> Option<&mut dyn NetTransport> {
        match &mut self.transport {
            Transport::Network(net) => Some(net.as_mut()),
            _ => None,
        }
    }
}
