//! Bootflow iterator
//!
//! Cursor over every (bootdev, partition, bootmeth) combination worth
//! trying. The iterator only tracks position; the discovery session in
//! `bootstd` drives it and does the probing.
//!
//! # Iteration order
//!
//! ```text
//!   global stage:  each global bootmeth once, no bootdev
//!        │
//!        ▼
//!   for dev in dev_order:              (priority order, or label order)
//!       for part in 0..=max_part:      (max_part grows once part 0 is probed)
//!           for meth in normal methods
//! ```
//!
//! A `DeviceExhausted` result abandons the rest of the current bootdev.
//! Running out of bootdevs ends the scan with `ScanExhausted`.

use alloc::vec::Vec;

use bitflags::bitflags;

use crate::bootdev::{BootdevId, TransportKind};
use crate::bootmeth::BootmethId;
use crate::error::{BootError, Result};

bitflags! {
    /// Flags controlling a scan
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IterFlags: u32 {
        /// Only scan fixed (non-removable) media
        const FIXED = 1 << 0;
        /// Log progress as each bootdev is scanned
        const SHOW = 1 << 1;
        /// Return bootflows with errors as well as valid ones
        const ALL = 1 << 2;
        /// Only scan one bootdev
        const SINGLE_DEV = 1 << 3;
        /// Do not run global bootmeths
        const SKIP_GLOBAL = 1 << 4;
        /// Only use one bootmeth
        const SINGLE_METHOD = 1 << 5;
        /// Only try one partition, never widen to the partition table
        const SINGLE_PARTITION = 1 << 6;
    }
}

/// Position of a scan
#[derive(Debug, Clone)]
pub struct BootflowIter {
    flags: IterFlags,
    single_dev: Option<BootdevId>,
    single_method: Option<BootmethId>,
    start_part: u32,

    dev_order: Vec<BootdevId>,
    cur_dev: usize,
    announced_dev: Option<usize>,
    part: u32,
    max_part: u32,

    /// Normal bootmeths first, then globals from `first_glob_method`
    method_order: Vec<BootmethId>,
    first_glob_method: usize,
    cur_method: usize,
    /// The bootmeth at `cur_method` was dropped; the slot already holds
    /// the next one
    method_dropped: bool,
    doing_global: bool,

    err: Option<BootError>,
    transport: Option<TransportKind>,
}

impl BootflowIter {
    pub fn new(flags: IterFlags) -> Self {
        Self {
            flags,
            single_dev: None,
            single_method: None,
            start_part: 0,
            dev_order: Vec::new(),
            cur_dev: 0,
            announced_dev: None,
            part: 0,
            max_part: 0,
            method_order: Vec::new(),
            first_glob_method: 0,
            cur_method: 0,
            method_dropped: false,
            doing_global: false,
            err: None,
            transport: None,
        }
    }

    /// Restrict the scan to one bootdev
    pub fn on_device(mut self, dev: BootdevId) -> Self {
        self.single_dev = Some(dev);
        self.flags |= IterFlags::SINGLE_DEV;
        self
    }

    /// Restrict the scan to one partition of each bootdev
    pub fn at_partition(mut self, part: u32) -> Self {
        self.start_part = part;
        self.flags |= IterFlags::SINGLE_PARTITION;
        self
    }

    /// Restrict the scan to one bootmeth
    pub fn using_method(mut self, method: BootmethId) -> Self {
        self.single_method = Some(method);
        self.flags |= IterFlags::SINGLE_METHOD;
        self
    }

    pub fn flags(&self) -> IterFlags {
        self.flags
    }

    pub(crate) fn single_dev(&self) -> Option<BootdevId> {
        self.single_dev
    }

    pub(crate) fn single_method(&self) -> Option<BootmethId> {
        self.single_method
    }

    /// Install the device and method snapshots and move to the first
    /// position. `methods[first_glob..]` are global bootmeths.
    pub(crate) fn setup(
        &mut self,
        dev_order: Vec<BootdevId>,
        method_order: Vec<BootmethId>,
        first_glob: usize,
    ) {
        self.dev_order = dev_order;
        self.method_order = method_order;
        self.first_glob_method = first_glob;
        self.cur_dev = 0;
        self.announced_dev = None;
        self.part = self.start_part;
        self.max_part = self.start_part;
        self.method_dropped = false;
        self.err = None;
        self.transport = None;

        self.doing_global = first_glob < self.method_order.len();
        self.cur_method = if self.doing_global { first_glob } else { 0 };
    }

    /// Release the snapshots. The iterator can be set up again afterwards.
    pub fn uninit(&mut self) {
        self.dev_order = Vec::new();
        self.method_order = Vec::new();
        self.first_glob_method = 0;
        self.cur_method = 0;
        self.cur_dev = 0;
        self.doing_global = false;
        self.method_dropped = false;
        self.err = None;
        self.transport = None;
    }

    /// Current bootdev, `None` while running global bootmeths
    pub fn dev(&self) -> Option<BootdevId> {
        if self.doing_global {
            return None;
        }
        self.dev_order.get(self.cur_dev).copied()
    }

    /// Current bootmeth. Globals are only visible in the global stage.
    pub fn method(&self) -> Option<BootmethId> {
        if self.cur_method >= self.methods_end() {
            return None;
        }
        self.method_order.get(self.cur_method).copied()
    }

    pub fn part(&self) -> u32 {
        self.part
    }

    pub fn max_part(&self) -> u32 {
        self.max_part
    }

    pub(crate) fn set_max_part(&mut self, max_part: u32) {
        if max_part > self.max_part {
            self.max_part = max_part;
        }
    }

    pub fn doing_global(&self) -> bool {
        self.doing_global
    }

    /// Result of the last attempt
    pub fn err(&self) -> Option<BootError> {
        self.err
    }

    pub(crate) fn set_err(&mut self, err: Option<BootError>) {
        self.err = err;
    }

    pub fn dev_order(&self) -> &[BootdevId] {
        &self.dev_order
    }

    pub fn method_order(&self) -> &[BootmethId] {
        &self.method_order
    }

    pub fn num_methods(&self) -> usize {
        self.method_order.len()
    }

    pub(crate) fn set_transport(&mut self, transport: TransportKind) {
        self.transport = Some(transport);
    }

    /// True the first time it is called for each bootdev
    pub(crate) fn announce_dev(&mut self) -> bool {
        if self.doing_global || self.announced_dev == Some(self.cur_dev) {
            return false;
        }
        self.announced_dev = Some(self.cur_dev);
        true
    }

    /// Require a block bootdev
    pub fn uses_blk_dev(&self) -> Result<()> {
        self.uses(TransportKind::Block)
    }

    /// Require a network bootdev
    pub fn uses_network(&self) -> Result<()> {
        self.uses(TransportKind::Network)
    }

    /// Require a system-level (no media) context
    pub fn uses_system(&self) -> Result<()> {
        self.uses(TransportKind::System)
    }

    fn uses(&self, kind: TransportKind) -> Result<()> {
        if self.transport == Some(kind) {
            Ok(())
        } else {
            Err(BootError::NotSupported)
        }
    }

    /// Remove a bootmeth from the rest of this scan. Dropping a bootmeth
    /// that is not (or no longer) in the order does nothing.
    pub fn drop_bootmeth(&mut self, method: BootmethId) {
        let Some(idx) = self.method_order.iter().position(|m| *m == method) else {
            return;
        };

        self.method_order.remove(idx);
        if idx < self.first_glob_method {
            self.first_glob_method -= 1;
        }
        if idx < self.cur_method {
            self.cur_method -= 1;
        } else if idx == self.cur_method {
            self.method_dropped = true;
        }
    }

    fn methods_end(&self) -> usize {
        if self.doing_global {
            self.method_order.len()
        } else {
            self.first_glob_method
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.err = Some(BootError::ScanExhausted);
        Err(BootError::ScanExhausted)
    }

    /// Enter the per-bootdev stage at the first bootdev
    fn start_devices(&mut self) -> Result<()> {
        self.doing_global = false;
        if self.dev_order.is_empty() || self.first_glob_method == 0 {
            return self.finish();
        }
        self.cur_dev = 0;
        self.part = self.start_part;
        self.max_part = self.start_part;
        self.cur_method = 0;
        Ok(())
    }

    /// Move to the next combination, honouring the last attempt's error.
    pub(crate) fn advance(&mut self) -> Result<()> {
        if self.err == Some(BootError::ScanExhausted) {
            return Err(BootError::ScanExhausted);
        }
        // Every normal bootmeth was dropped: nothing left for the devices
        if !self.doing_global && self.first_glob_method == 0 {
            return self.finish();
        }
        let dev_done = !self.doing_global && self.err == Some(BootError::DeviceExhausted);
        self.err = None;

        let dropped = core::mem::replace(&mut self.method_dropped, false);
        if !dev_done {
            let next = if dropped { self.cur_method } else { self.cur_method + 1 };
            if next < self.methods_end() {
                self.cur_method = next;
                return Ok(());
            }

            if self.doing_global {
                return self.start_devices();
            }

            if !self.flags.contains(IterFlags::SINGLE_PARTITION) && self.part < self.max_part {
                self.part += 1;
                self.cur_method = 0;
                return Ok(());
            }
        }

        self.cur_dev += 1;
        if self.cur_dev >= self.dev_order.len() {
            return self.finish();
        }
        self.part = self.start_part;
        self.max_part = self.start_part;
        self.cur_method = 0;
        Ok(())
    }
}
