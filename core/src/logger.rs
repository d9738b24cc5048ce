//! Boot Log Ring Buffer
//!
//! Circular buffer that captures scan progress, boot attempts and loader
//! diagnostics for display by whatever console the board provides.
//!
//! # Design
//!
//! - Fixed-size, no heap allocation for the buffer itself
//! - Guarded by a spin mutex, so producers on any stage can log
//! - Overwrites oldest entries when full
//! - Each entry carries the stage it came from and its level
//!
//! # Usage
//!
//! ```ignore
//! use bootstd_core::{log_info, logger::LogStage};
//!
//! log_info!(LogStage::Scan, "Scanning bootdev '{}':", name);
//!
//! while let Some(entry) = bootstd_core::logger::log_pop() {
//!     console.write_line(entry.message());
//! }
//! ```

use core::fmt::{self, Write};
use spin::Mutex;

/// Maximum message length in bytes
pub const LOG_MSG_LEN: usize = 120;

/// Number of entries in the ring buffer
pub const LOG_RING_SIZE: usize = 64;

/// Stage identifiers for log categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogStage {
    /// Bootflow iteration
    Scan = 0,
    /// Media probing on a bootdev
    Bootdev = 1,
    /// Bootmeth read/check
    Bootmeth = 2,
    /// Boot execution
    Boot = 3,
    /// Sparse image flashing
    Sparse = 4,
    /// VBE firmware loading
    Vbe = 5,
}

impl LogStage {
    /// Get human-readable stage name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Scan => "SCAN",
            Self::Bootdev => "BOOTDEV",
            Self::Bootmeth => "BOOTMETH",
            Self::Boot => "BOOT",
            Self::Sparse => "SPARSE",
            Self::Vbe => "VBE",
        }
    }
}

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

/// Single log entry in the ring buffer
#[derive(Clone)]
pub struct LogEntry {
    /// Message content
    pub msg: [u8; LOG_MSG_LEN],
    /// Actual message length
    pub len: u8,
    /// Stage the entry came from
    pub stage: LogStage,
    /// Severity
    pub level: LogLevel,
    /// Sequence number, increasing across the life of the ring
    pub seq: u32,
}

impl LogEntry {
    const fn empty() -> Self {
        Self {
            msg: [0u8; LOG_MSG_LEN],
            len: 0,
            stage: LogStage::Scan,
            level: LogLevel::Info,
            seq: 0,
        }
    }

    /// Get message as string slice
    pub fn message(&self) -> &str {
        let len = (self.len as usize).min(LOG_MSG_LEN);
        match core::str::from_utf8(&self.msg[..len]) {
            Ok(s) => s,
            // Truncation may split a multi-byte character
            Err(e) => core::str::from_utf8(&self.msg[..e.valid_up_to()]).unwrap_or(""),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.level {
            LogLevel::Error => "ERR ",
            LogLevel::Warn => "WARN ",
            _ => "",
        };
        write!(f, "[{}{}] {}", prefix, self.stage.name(), self.message())
    }
}

/// Truncating writer over an entry's message buffer
struct EntryWriter<'a> {
    entry: &'a mut LogEntry,
}

impl Write for EntryWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let pos = self.entry.len as usize;
        let room = LOG_MSG_LEN - pos;
        let n = s.len().min(room);
        self.entry.msg[pos..pos + n].copy_from_slice(&s.as_bytes()[..n]);
        self.entry.len = (pos + n) as u8;
        Ok(())
    }
}

struct LogRing {
    entries: [LogEntry; LOG_RING_SIZE],
    /// Total entries ever written
    written: usize,
    /// Total entries ever consumed (or skipped by clear/overflow)
    read: usize,
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing {
    entries: {
        const EMPTY: LogEntry = LogEntry::empty();
        [EMPTY; LOG_RING_SIZE]
    },
    written: 0,
    read: 0,
});

/// Record a formatted message. Used by the `log_*!` macros.
pub fn log_fmt(stage: LogStage, level: LogLevel, args: fmt::Arguments<'_>) {
    if level == LogLevel::Debug && !cfg!(feature = "trace") {
        return;
    }

    let mut ring = LOG_RING.lock();
    let idx = ring.written % LOG_RING_SIZE;
    let seq = ring.written as u32;

    let entry = &mut ring.entries[idx];
    *entry = LogEntry::empty();
    entry.stage = stage;
    entry.level = level;
    entry.seq = seq;
    let _ = EntryWriter { entry }.write_fmt(args);

    ring.written += 1;
    if ring.written - ring.read > LOG_RING_SIZE {
        ring.read = ring.written - LOG_RING_SIZE;
    }
}

/// Record a plain message
pub fn log(stage: LogStage, level: LogLevel, msg: &str) {
    log_fmt(stage, level, format_args!("{}", msg));
}

/// Pop the oldest unread entry. Returns `None` if the buffer is empty.
pub fn log_pop() -> Option<LogEntry> {
    let mut ring = LOG_RING.lock();
    if ring.read >= ring.written {
        return None;
    }
    let entry = ring.entries[ring.read % LOG_RING_SIZE].clone();
    ring.read += 1;
    Some(entry)
}

/// Visit every unread entry, oldest first, without consuming them
pub fn log_for_each<F: FnMut(&LogEntry)>(mut f: F) {
    let ring = LOG_RING.lock();
    for pos in ring.read..ring.written {
        f(&ring.entries[pos % LOG_RING_SIZE]);
    }
}

/// Number of unread entries
pub fn log_available() -> usize {
    let ring = LOG_RING.lock();
    ring.written - ring.read
}

/// Total number of entries ever written
pub fn log_count() -> usize {
    LOG_RING.lock().written
}

/// Discard all unread entries
pub fn log_clear() {
    let mut ring = LOG_RING.lock();
    ring.read = ring.written;
}

#[macro_export]
macro_rules! log_debug {
    ($stage:expr, $($arg:tt)*) => {
        $crate::logger::log_fmt($stage, $crate::logger::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($stage:expr, $($arg:tt)*) => {
        $crate::logger::log_fmt($stage, $crate::logger::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($stage:expr, $($arg:tt)*) => {
        $crate::logger::log_fmt($stage, $crate::logger::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($stage:expr, $($arg:tt)*) => {
        $crate::logger::log_fmt($stage, $crate::logger::LogLevel::Error, format_args!($($arg)*))
    };
}
