//! Boot discovery error types
//!
//! One error enum for the whole discovery engine. Each variant carries the
//! negative errno the bootstd command layer reports, so results can be
//! shown the same way whichever layer produced them.

use core::fmt;

/// Errors produced while discovering, loading or booting bootflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// No bootdev available to scan
    NoDevice,
    /// Requested item (file, partition, bootflow, label) does not exist
    NotFound,
    /// Current bootdev has nothing more to offer; move to the next one
    DeviceExhausted,
    /// Nothing left to scan at all
    ScanExhausted,
    /// Bootmeth cannot handle this transport, or refuses to boot
    NotSupported,
    /// Media is not present in the device
    ProtocolNotSupported,
    /// Bootflow is not ready to boot
    Protocol,
    /// Bootmeth does not implement the requested operation
    NoBootOp,
    /// Boot operation returned when it should have transferred control
    Fault,
    /// Allocation failed
    OutOfMemory,
    /// Malformed input or argument
    Invalid,
    /// Input exceeds the space available for it
    TooBig,
    /// Block or network I/O failed
    Io,
    /// Hardware did not become ready in time
    Timeout,
    /// Badly formed text or file contents
    BadFile,
    /// Integrity check failed on a stored record
    Permission,
}

impl BootError {
    /// Get a human-readable description of the error
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoDevice => "No bootdev available",
            Self::NotFound => "Not found",
            Self::DeviceExhausted => "No more partitions on bootdev",
            Self::ScanExhausted => "No more bootdevs",
            Self::NotSupported => "Not supported by bootmeth",
            Self::ProtocolNotSupported => "Media not present",
            Self::Protocol => "Bootflow not loaded",
            Self::NoBootOp => "Bootmeth operation not implemented",
            Self::Fault => "Boot returned unexpectedly",
            Self::OutOfMemory => "Out of memory",
            Self::Invalid => "Invalid argument",
            Self::TooBig => "Too big",
            Self::Io => "I/O error",
            Self::Timeout => "Timed out",
            Self::BadFile => "Bad file contents",
            Self::Permission => "Integrity check failed",
        }
    }

    /// Negative errno value for this error.
    ///
    /// `DeviceExhausted` and `ScanExhausted` share `-ESHUTDOWN`; callers that
    /// only see the number cannot tell them apart.
    pub const fn errno(&self) -> i32 {
        match self {
            Self::NoDevice => -19,
            Self::NotFound => -2,
            Self::DeviceExhausted | Self::ScanExhausted => -108,
            Self::NotSupported => -524,
            Self::ProtocolNotSupported => -93,
            Self::Protocol => -71,
            Self::NoBootOp => -38,
            Self::Fault => -14,
            Self::OutOfMemory => -12,
            Self::Invalid => -22,
            Self::TooBig => -7,
            Self::Io => -5,
            Self::Timeout => -110,
            Self::BadFile => -9,
            Self::Permission => -1,
        }
    }

    /// True for errors that only steer the iterator and never describe a
    /// failed bootflow.
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::DeviceExhausted | Self::ScanExhausted)
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (err={})", self.as_str(), self.errno())
    }
}

pub type Result<T> = core::result::Result<T, BootError>;
