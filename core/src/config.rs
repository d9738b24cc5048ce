//! Boot discovery configuration.
//!
//! Options the board (or a user environment) supplies when it creates a
//! discovery session.

use alloc::string::String;
use alloc::vec::Vec;

use crate::time::{tick_clock, TimeSource};

/// Highest partition number probed on any bootdev.
pub const MAX_PART_PER_BOOTDEV: u32 = 30;

/// Boot discovery configuration.
#[derive(Debug, Clone)]
pub struct BootstdConfig {
    /// Bootdev labels to scan, in order. Empty means priority order.
    pub bootdev_order: Vec<String>,
    /// Bootmeth names to try, in order. Empty means registration order.
    pub bootmeth_order: Vec<String>,
    /// How long to wait for media to become ready, in milliseconds.
    pub media_timeout_ms: u64,
    /// Millisecond clock used for media waits.
    pub time_source: TimeSource,
    /// Upper bound on partition numbers probed per bootdev.
    pub max_part_limit: u32,
}

impl Default for BootstdConfig {
    fn default() -> Self {
        Self {
            bootdev_order: Vec::new(),
            bootmeth_order: Vec::new(),
            media_timeout_ms: 1_000,
            time_source: tick_clock,
            max_part_limit: MAX_PART_PER_BOOTDEV,
        }
    }
}

impl BootstdConfig {
    /// Set bootdev scan order by label.
    pub fn bootdev_order(mut self, labels: &[&str]) -> Self {
        self.bootdev_order = labels.iter().map(|s| String::from(*s)).collect();
        self
    }

    /// Set bootmeth order by name.
    pub fn bootmeth_order(mut self, names: &[&str]) -> Self {
        self.bootmeth_order = names.iter().map(|s| String::from(*s)).collect();
        self
    }

    /// Set media wait timeout.
    pub fn media_timeout(mut self, timeout_ms: u64) -> Self {
        self.media_timeout_ms = timeout_ms;
        self
    }

    /// Install the board's millisecond timer.
    pub fn clock(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// Limit the number of partitions probed per bootdev.
    pub fn max_partitions(mut self, limit: u32) -> Self {
        self.max_part_limit = limit.min(MAX_PART_PER_BOOTDEV);
        self
    }
}
