//! Error types for the VBE firmware loader

use bootstd_core::BootError;
use core::fmt;

use crate::fdt::FdtError;

/// Result type for VBE operations
pub type Result<T> = core::result::Result<T, VbeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VbeError {
    /// No FIT at the configured offset
    NoFit,
    /// FIT or payload does not fit in the firmware area
    TooBig,
    /// No image for the requested phase, or no data for it
    ImageNotFound,
    /// Storage read failed
    Io,
    /// State record failed its integrity checks
    Permission,
    /// Version record is not a terminated string
    BadFile,
    /// Configuration does not describe a usable layout
    InvalidConfig,
    /// Malformed FIT properties
    Invalid,
    /// Buffer allocation failed
    OutOfMemory,
}

impl VbeError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoFit => "No FIT found",
            Self::TooBig => "FIT too large for firmware area",
            Self::ImageNotFound => "No firmware image for this phase",
            Self::Io => "Storage read failed",
            Self::Permission => "State record check failed",
            Self::BadFile => "Version record not terminated",
            Self::InvalidConfig => "Invalid VBE configuration",
            Self::Invalid => "Invalid FIT",
            Self::OutOfMemory => "Out of memory",
        }
    }

    pub const fn errno(&self) -> i32 {
        match self {
            Self::NoFit | Self::InvalidConfig | Self::Invalid => -22,
            Self::TooBig => -7,
            Self::ImageNotFound => -2,
            Self::Io => -5,
            Self::Permission => -1,
            Self::BadFile => -9,
            Self::OutOfMemory => -12,
        }
    }
}

impl fmt::Display for VbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (err={})", self.as_str(), self.errno())
    }
}

impl From<FdtError> for VbeError {
    fn from(err: FdtError) -> Self {
        match err {
            FdtError::BadMagic | FdtError::BadHeader => VbeError::NoFit,
            FdtError::Truncated => VbeError::Io,
        }
    }
}

impl From<BootError> for VbeError {
    fn from(err: BootError) -> Self {
        match err {
            BootError::OutOfMemory => VbeError::OutOfMemory,
            _ => VbeError::Io,
        }
    }
}

impl From<VbeError> for BootError {
    fn from(err: VbeError) -> Self {
        match err {
            VbeError::NoFit | VbeError::InvalidConfig | VbeError::Invalid => BootError::Invalid,
            VbeError::TooBig => BootError::TooBig,
            VbeError::ImageNotFound => BootError::NotFound,
            VbeError::Io => BootError::Io,
            VbeError::Permission => BootError::Permission,
            VbeError::BadFile => BootError::BadFile,
            VbeError::OutOfMemory => BootError::OutOfMemory,
        }
    }
}
