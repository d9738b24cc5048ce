//! Boot discovery session
//!
//! `Bootstd` owns everything a scan needs: the registered bootdevs and
//! bootmeths, the configuration, and the bootflows found so far. There is
//! no global state; a board creates one session and drives it.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────────────── Bootstd ─────────────────────────────┐
//!   │                                                                  │
//!   │  bootdevs[]  ◄── BootdevId        bootmeths[] ◄── BootmethId     │
//!   │                                                                  │
//!   │  flows[] (arena, generation-checked BootflowHandle)              │
//!   │     ▲                    ▲                                       │
//!   │   glob: [handle, ...]   dev_lists[dev]: [handle, ...]            │
//!   │                                                                  │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let mut bootstd = Bootstd::new(BootstdConfig::default());
//! let mmc = bootstd.add_bootdev(Bootdev::block("mmc1.bootdev", BootdevPrio::InternalFast, media));
//! bootstd.add_bootmeth(Box::new(Extlinux::new()));
//!
//! let mut iter = BootflowIter::new(IterFlags::SHOW);
//! let mut ret = bootstd.scan_first(&mut iter);
//! while let Ok(mut bflow) = ret {
//!     bootstd.run_boot(Some(&mut iter), &mut bflow)?;   // only returns on failure
//!     ret = bootstd.scan_next(&mut iter);
//! }
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::bootdev::{Bootdev, BootdevId, Transport, TransportKind};
use crate::bootflow::{Bootflow, BootflowState};
use crate::bootmeth::{Bootmeth, BootmethId};
use crate::config::BootstdConfig;
use crate::error::{BootError, Result};
use crate::iter::{BootflowIter, IterFlags};
use crate::logger::LogStage;
use crate::time::{poll_until, Deadline};
use crate::{log_debug, log_error, log_info, log_warn};

/// Stable reference to a bootflow held by the session.
///
/// Handles go stale when the bootflow is removed; stale handles are
/// rejected rather than aliasing a newer bootflow in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BootflowHandle {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    flow: Option<Bootflow>,
}

/// Counts from a full scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Bootflows recorded, including failed ones when scanning with `ALL`
    pub total: usize,
    /// Bootflows without an error
    pub valid: usize,
}

/// Boot discovery session
pub struct Bootstd {
    config: BootstdConfig,
    bootdevs: Vec<Bootdev>,
    bootmeths: Vec<Box<dyn Bootmeth>>,
    flows: Vec<Slot>,
    glob: Vec<BootflowHandle>,
    dev_lists: Vec<Vec<BootflowHandle>>,
}

/// Whether a bootdev label selects the named bootdev.
///
/// `mmc1` selects `mmc1` and `mmc1.bootdev`; a label without a trailing
/// digit (`mmc`) selects every bootdev of that kind.
fn label_matches(label: &str, name: &str) -> bool {
    if name == label {
        return true;
    }
    let Some(rest) = name.strip_prefix(label) else {
        return false;
    };
    if rest.starts_with('.') {
        return true;
    }
    let label_has_seq = label.chars().last().map_or(false, |c| c.is_ascii_digit());
    !label_has_seq && rest.starts_with(|c: char| c.is_ascii_digit())
}

fn reportable(err: BootError) -> bool {
    !err.is_exhausted() && err != BootError::NotSupported && err != BootError::NoBootOp
}

impl Bootstd {
    pub fn new(config: BootstdConfig) -> Self {
        Self {
            config,
            bootdevs: Vec::new(),
            bootmeths: Vec::new(),
            flows: Vec::new(),
            glob: Vec::new(),
            dev_lists: Vec::new(),
        }
    }

    pub fn config(&self) -> &BootstdConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REGISTRIES
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_bootdev(&mut self, dev: Bootdev) -> BootdevId {
        self.bootdevs.push(dev);
        self.dev_lists.push(Vec::new());
        BootdevId(self.bootdevs.len() - 1)
    }

    pub fn add_bootmeth(&mut self, meth: Box<dyn Bootmeth>) -> BootmethId {
        self.bootmeths.push(meth);
        BootmethId(self.bootmeths.len() - 1)
    }

    pub fn bootdev(&self, id: BootdevId) -> Option<&Bootdev> {
        self.bootdevs.get(id.0)
    }

    pub fn bootdev_mut(&mut self, id: BootdevId) -> Option<&mut Bootdev> {
        self.bootdevs.get_mut(id.0)
    }

    pub fn find_bootdev(&self, name: &str) -> Option<BootdevId> {
        self.bootdevs.iter().position(|d| d.name() == name).map(BootdevId)
    }

    pub fn find_bootmeth(&self, name: &str) -> Option<BootmethId> {
        self.bootmeths.iter().position(|m| m.name() == name).map(BootmethId)
    }

    pub fn bootmeth_name(&self, id: BootmethId) -> &str {
        self.bootmeths.get(id.0).map_or("?", |m| m.name())
    }

    pub fn bootdev_count(&self) -> usize {
        self.bootdevs.len()
    }

    pub fn bootmeth_count(&self) -> usize {
        self.bootmeths.len()
    }

    /// Scan bootdevs in this label order. An empty list restores priority
    /// order. Fails with `NotFound` if a label selects no bootdev.
    pub fn set_bootdev_order(&mut self, labels: &[&str]) -> Result<()> {
        for label in labels {
            if !self.bootdevs.iter().any(|d| label_matches(label, d.name())) {
                return Err(BootError::NotFound);
            }
        }
        self.config.bootdev_order = labels.iter().map(|s| String::from(*s)).collect();
        Ok(())
    }

    /// Try bootmeths in this order; others are not used. An empty list
    /// restores registration order.
    pub fn set_bootmeth_order(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            if self.find_bootmeth(name).is_none() {
                return Err(BootError::NotFound);
            }
        }
        self.config.bootmeth_order = names.iter().map(|s| String::from(*s)).collect();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ITERATION
    // ═══════════════════════════════════════════════════════════════════════

    fn build_dev_order(&self, iter: &BootflowIter) -> Result<Vec<BootdevId>> {
        let mut order: Vec<BootdevId> = Vec::new();
        order
            .try_reserve_exact(self.bootdevs.len())
            .map_err(|_| BootError::OutOfMemory)?;

        if let Some(dev) = iter.single_dev() {
            if dev.0 >= self.bootdevs.len() {
                return Err(BootError::NoDevice);
            }
            order.push(dev);
        } else if !self.config.bootdev_order.is_empty() {
            for label in &self.config.bootdev_order {
                let before = order.len();
                for (idx, dev) in self.bootdevs.iter().enumerate() {
                    if label_matches(label, dev.name()) && !order.contains(&BootdevId(idx)) {
                        order.push(BootdevId(idx));
                    }
                }
                if order.len() == before {
                    return Err(BootError::NotFound);
                }
            }
        } else {
            order.extend((0..self.bootdevs.len()).map(BootdevId));
            // Stable: registration order breaks priority ties
            order.sort_by_key(|id| self.bootdevs[id.0].prio());
        }

        if iter.flags().contains(IterFlags::FIXED) {
            order.retain(|id| !self.bootdevs[id.0].is_removable());
        }
        if order.is_empty() {
            return Err(BootError::NoDevice);
        }
        Ok(order)
    }

    fn build_method_order(&self, iter: &BootflowIter) -> Result<(Vec<BootmethId>, usize)> {
        let mut base: Vec<BootmethId> = Vec::new();
        base.try_reserve_exact(self.bootmeths.len())
            .map_err(|_| BootError::OutOfMemory)?;

        if let Some(meth) = iter.single_method() {
            if meth.0 >= self.bootmeths.len() {
                return Err(BootError::NotFound);
            }
            base.push(meth);
        } else if !self.config.bootmeth_order.is_empty() {
            for name in &self.config.bootmeth_order {
                base.push(self.find_bootmeth(name).ok_or(BootError::NotFound)?);
            }
        } else {
            base.extend((0..self.bootmeths.len()).map(BootmethId));
        }

        let flags = iter.flags();
        let skip_global = flags.intersects(IterFlags::SKIP_GLOBAL | IterFlags::SINGLE_DEV);

        let mut order: Vec<BootmethId> = Vec::new();
        order.try_reserve_exact(base.len())
            .map_err(|_| BootError::OutOfMemory)?;
        order.extend(base.iter().copied().filter(|m| !self.bootmeths[m.0].is_global()));
        let first_glob = order.len();
        if !skip_global {
            order.extend(base.iter().copied().filter(|m| self.bootmeths[m.0].is_global()));
        }

        if order.is_empty() {
            return Err(BootError::NotFound);
        }
        Ok((order, first_glob))
    }

    /// Prepare `iter` for a new scan using its flags.
    ///
    /// # Errors
    ///
    /// - `NoDevice`: no bootdev is registered or selected
    /// - `NotFound`: no bootmeth to use, or an unknown name in the orders
    /// - `OutOfMemory`: the order snapshots could not be allocated
    pub fn iter_init(&self, iter: &mut BootflowIter) -> Result<()> {
        iter.uninit();
        if self.bootdevs.is_empty() {
            return Err(BootError::NoDevice);
        }
        let dev_order = self.build_dev_order(iter)?;
        let (method_order, first_glob) = self.build_method_order(iter)?;
        iter.setup(dev_order, method_order, first_glob);
        Ok(())
    }

    /// Wait for media and work out partition state for a block or network
    /// bootdev
    fn probe_media(
        config: &BootstdConfig,
        dev: &mut Bootdev,
        iter: &mut BootflowIter,
        bflow: &mut Bootflow,
    ) -> Result<()> {
        if iter.part() > config.max_part_limit {
            return Err(BootError::DeviceExhausted);
        }
        let deadline = Deadline::after(config.time_source, config.media_timeout_ms);

        match dev.transport() {
            Transport::Block(blk) => {
                match poll_until(&deadline, || blk.media_ready()) {
                    Ok(()) => {}
                    Err(BootError::Timeout) => {
                        log_warn!(LogStage::Bootdev, "Media not ready, resetting");
                        blk.reset();
                        return Err(BootError::DeviceExhausted);
                    }
                    Err(BootError::ProtocolNotSupported) => return Err(BootError::DeviceExhausted),
                    Err(err) => return Err(err),
                }
                bflow.blk = true;

                let table = blk.partitions()?;
                bflow.advance(BootflowState::Media);

                if iter.part() == 0 {
                    if !iter.flags().contains(IterFlags::SINGLE_PARTITION) {
                        iter.set_max_part(table.max_number().min(config.max_part_limit));
                    }
                    return Ok(());
                }

                if table.find(iter.part()).is_none() {
                    return Err(BootError::NotFound);
                }
                bflow.advance(BootflowState::Part);
                Ok(())
            }
            Transport::Network(net) => {
                match poll_until(&deadline, || net.link_up()) {
                    Ok(()) => {}
                    Err(BootError::Timeout) | Err(BootError::ProtocolNotSupported) => {
                        return Err(BootError::DeviceExhausted)
                    }
                    Err(err) => return Err(err),
                }
                bflow.advance(BootflowState::Media);
                Ok(())
            }
            Transport::System => {
                bflow.advance(BootflowState::Media);
                Ok(())
            }
        }
    }

    /// Try the iterator's current combination
    fn check(&mut self, iter: &mut BootflowIter, bflow: &mut Bootflow) -> Result<()> {
        let show = iter.flags().contains(IterFlags::SHOW);
        let meth_id = iter.method().ok_or(BootError::ScanExhausted)?;
        let meth = self
            .bootmeths
            .get_mut(meth_id.0)
            .ok_or(BootError::NotFound)?;

        if iter.doing_global() {
            iter.set_transport(TransportKind::System);
            if show {
                log_info!(LogStage::Scan, "Scanning global bootmeth '{}':", meth.name());
            }
            bflow.name = Some(String::from(meth.name()));
            meth.check(iter)?;
            return meth.read_bootflow(None, bflow);
        }

        let dev_id = iter.dev().ok_or(BootError::ScanExhausted)?;
        let dev = self
            .bootdevs
            .get_mut(dev_id.0)
            .ok_or(BootError::NoDevice)?;

        if iter.announce_dev() && show {
            log_info!(LogStage::Scan, "Scanning bootdev '{}':", dev.name());
        }
        iter.set_transport(dev.kind());
        bflow.part = iter.part();
        bflow.name = Some(Bootflow::make_name(dev.name(), iter.part()));

        Self::probe_media(&self.config, dev, iter, bflow)?;
        meth.check(iter)?;
        meth.read_bootflow(Some(dev), bflow)
    }

    /// Try the current combination, returning the bootflow if the caller
    /// should see it
    fn attempt(&mut self, iter: &mut BootflowIter) -> Option<Bootflow> {
        let method = iter.method()?;
        let mut bflow = Bootflow::new(iter.dev(), method);

        // A bootmeth that succeeds must leave the bootflow ready
        let ret = self.check(iter, &mut bflow).and_then(|()| {
            if bflow.is_ready() {
                Ok(())
            } else {
                Err(BootError::Protocol)
            }
        });
        match ret {
            Ok(()) => {
                log_debug!(
                    LogStage::Scan,
                    "Found bootflow '{}'",
                    bflow.name.as_deref().unwrap_or("")
                );
                iter.set_err(None);
                Some(bflow)
            }
            Err(err) => {
                iter.set_err(Some(err));
                bflow.err = Some(err);
                if reportable(err) && iter.flags().contains(IterFlags::ALL) {
                    Some(bflow)
                } else {
                    None
                }
            }
        }
    }

    /// Start a scan and return the first bootflow.
    ///
    /// With `IterFlags::ALL`, bootflows that failed are returned too, with
    /// `err` set. Without it only usable bootflows come back.
    pub fn scan_first(&mut self, iter: &mut BootflowIter) -> Result<Bootflow> {
        self.iter_init(iter)?;
        match self.attempt(iter) {
            Some(bflow) => Ok(bflow),
            None => self.scan_next(iter),
        }
    }

    /// Continue a scan. Returns `ScanExhausted` when nothing is left.
    pub fn scan_next(&mut self, iter: &mut BootflowIter) -> Result<Bootflow> {
        loop {
            if let Err(err) = iter.advance() {
                if iter.flags().contains(IterFlags::SHOW) {
                    log_info!(LogStage::Scan, "No more bootdevs");
                }
                return Err(err);
            }
            if let Some(bflow) = self.attempt(iter) {
                return Ok(bflow);
            }
        }
    }

    /// Start a scan of a single bootdev
    pub fn scan_bootdev(&mut self, iter: &mut BootflowIter, dev: BootdevId) -> Result<Bootflow> {
        *iter = iter.clone().on_device(dev);
        self.scan_first(iter)
    }

    /// Scan everything, recording each bootflow returned. Previously
    /// recorded bootflows are discarded first.
    pub fn scan_all(&mut self, flags: IterFlags) -> Result<ScanSummary> {
        self.clear_glob();

        let mut iter = BootflowIter::new(flags);
        let mut summary = ScanSummary::default();
        let mut ret = self.scan_first(&mut iter);
        loop {
            match ret {
                Ok(bflow) => {
                    summary.total += 1;
                    if bflow.err.is_none() {
                        summary.valid += 1;
                    }
                    self.add_bootflow(bflow)?;
                }
                Err(BootError::ScanExhausted) => break,
                Err(err) => return Err(err),
            }
            ret = self.scan_next(&mut iter);
        }

        Ok(summary)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BOOTFLOW LISTS
    // ═══════════════════════════════════════════════════════════════════════

    /// Take ownership of a bootflow, linking it into the global list and
    /// its bootdev's list
    pub fn add_bootflow(&mut self, bflow: Bootflow) -> Result<BootflowHandle> {
        self.glob.try_reserve(1).map_err(|_| BootError::OutOfMemory)?;
        let dev = bflow.dev;

        let handle = match self.flows.iter().position(|s| s.flow.is_none()) {
            Some(idx) => {
                let slot = &mut self.flows[idx];
                slot.flow = Some(bflow);
                BootflowHandle {
                    index: idx as u32,
                    generation: slot.generation,
                }
            }
            None => {
                self.flows.try_reserve(1).map_err(|_| BootError::OutOfMemory)?;
                self.flows.push(Slot {
                    generation: 0,
                    flow: Some(bflow),
                });
                BootflowHandle {
                    index: (self.flows.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        self.glob.push(handle);
        if let Some(list) = dev.and_then(|d| self.dev_lists.get_mut(d.0)) {
            list.push(handle);
        }
        Ok(handle)
    }

    fn slot(&self, handle: BootflowHandle) -> Option<&Slot> {
        self.flows
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation && s.flow.is_some())
    }

    pub fn get(&self, handle: BootflowHandle) -> Option<&Bootflow> {
        self.slot(handle).and_then(|s| s.flow.as_ref())
    }

    pub fn get_mut(&mut self, handle: BootflowHandle) -> Option<&mut Bootflow> {
        self.slot(handle)?;
        self.flows[handle.index as usize].flow.as_mut()
    }

    /// Unlink a bootflow from both lists and free it. The handle is dead
    /// afterwards.
    pub fn remove_bootflow(&mut self, handle: BootflowHandle) -> Result<()> {
        self.slot(handle).ok_or(BootError::NotFound)?;
        let slot = &mut self.flows[handle.index as usize];
        let mut bflow = slot.flow.take().ok_or(BootError::NotFound)?;
        slot.generation = slot.generation.wrapping_add(1);

        self.glob.retain(|h| *h != handle);
        if let Some(list) = bflow.dev.and_then(|d| self.dev_lists.get_mut(d.0)) {
            list.retain(|h| *h != handle);
        }
        bflow.free();
        Ok(())
    }

    /// Remove every recorded bootflow
    pub fn clear_glob(&mut self) {
        while let Some(&handle) = self.glob.first() {
            if self.remove_bootflow(handle).is_err() {
                self.glob.remove(0);
            }
        }
    }

    pub fn glob_count(&self) -> usize {
        self.glob.len()
    }

    /// First recorded bootflow, in discovery order
    pub fn first_glob(&self) -> Result<BootflowHandle> {
        self.glob.first().copied().ok_or(BootError::NotFound)
    }

    /// Recorded bootflow following `prev`
    pub fn next_glob(&self, prev: BootflowHandle) -> Result<BootflowHandle> {
        let pos = self
            .glob
            .iter()
            .position(|h| *h == prev)
            .ok_or(BootError::NotFound)?;
        self.glob.get(pos + 1).copied().ok_or(BootError::NotFound)
    }

    /// First recorded bootflow on `dev`
    pub fn first_bootflow(&self, dev: BootdevId) -> Result<BootflowHandle> {
        self.dev_lists
            .get(dev.0)
            .and_then(|l| l.first().copied())
            .ok_or(BootError::NotFound)
    }

    /// Recorded bootflow following `prev` on the same bootdev
    pub fn next_bootflow(&self, prev: BootflowHandle) -> Result<BootflowHandle> {
        let dev = self.get(prev).and_then(|b| b.dev).ok_or(BootError::NotFound)?;
        let list = self.dev_lists.get(dev.0).ok_or(BootError::NotFound)?;
        let pos = list
            .iter()
            .position(|h| *h == prev)
            .ok_or(BootError::NotFound)?;
        list.get(pos + 1).copied().ok_or(BootError::NotFound)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BOOT
    // ═══════════════════════════════════════════════════════════════════════

    /// Hand control to a bootflow.
    ///
    /// Does not return on success, so any return is an error:
    /// - `Protocol`: the bootflow is not `Ready`
    /// - `NoBootOp`: its bootmeth cannot boot
    /// - `Fault`: the bootmeth's boot returned without booting
    /// - anything the bootmeth reports
    pub fn boot(&mut self, bflow: &mut Bootflow) -> Result<()> {
        if !bflow.is_ready() {
            return Err(BootError::Protocol);
        }
        let meth = self
            .bootmeths
            .get_mut(bflow.method.0)
            .ok_or(BootError::NotFound)?;
        let booter = meth.as_bootable().ok_or(BootError::NoBootOp)?;
        let dev = match bflow.dev {
            Some(id) => self.bootdevs.get_mut(id.0),
            None => None,
        };

        booter.boot(dev, bflow)?;
        Err(BootError::Fault)
    }

    /// Boot a recorded bootflow
    pub fn boot_handle(&mut self, handle: BootflowHandle) -> Result<()> {
        self.slot(handle).ok_or(BootError::NotFound)?;
        let mut bflow = self.flows[handle.index as usize]
            .flow
            .take()
            .ok_or(BootError::NotFound)?;
        let ret = self.boot(&mut bflow);
        self.flows[handle.index as usize].flow = Some(bflow);
        ret
    }

    /// Boot a bootflow, reporting failure.
    ///
    /// A bootmeth that answers `NotSupported` is dropped from `iter` so the
    /// rest of the scan does not try it again.
    pub fn run_boot(&mut self, iter: Option<&mut BootflowIter>, bflow: &mut Bootflow) -> Result<()> {
        let meth_name = String::from(self.bootmeth_name(bflow.method));
        log_info!(
            LogStage::Boot,
            "** Booting bootflow '{}' with {}",
            bflow.name.as_deref().unwrap_or(""),
            meth_name
        );

        let ret = self.boot(bflow);
        match ret {
            Ok(()) => {}
            Err(BootError::Protocol) => {
                log_error!(
                    LogStage::Boot,
                    "Bootflow not loaded (state '{}')",
                    bflow.state().name()
                );
            }
            Err(BootError::NoBootOp) => {
                log_error!(LogStage::Boot, "Boot method '{}' not supported", meth_name);
            }
            Err(BootError::NotSupported) => {
                log_warn!(
                    LogStage::Boot,
                    "Boot method '{}' failed and will not be retried",
                    meth_name
                );
                if let Some(iter) = iter {
                    iter.drop_bootmeth(bflow.method);
                }
            }
            Err(err) => {
                log_error!(LogStage::Boot, "Boot failed (err={})", err.errno());
            }
        }
        ret
    }

    /// Read another file for a bootflow through its bootmeth
    pub fn read_file(&mut self, bflow: &Bootflow, path: &str) -> Result<Vec<u8>> {
        let meth = self
            .bootmeths
            .get_mut(bflow.method.0)
            .ok_or(BootError::NotFound)?;
        let reader = meth.as_file_reader().ok_or(BootError::NoBootOp)?;
        let dev = match bflow.dev {
            Some(id) => self.bootdevs.get_mut(id.0),
            None => None,
        };
        reader.read_file(dev, bflow, path)
    }
}
