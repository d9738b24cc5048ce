//! Error types for sparse image writes

use bootstd_core::BootError;
use core::fmt;

/// Result type for sparse image operations
pub type Result<T> = core::result::Result<T, SparseError>;

/// Errors that can occur while writing a sparse image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseError {
    /// Bad magic, version or header sizes
    InvalidHeader,

    /// Image block size is not a multiple of the storage block size
    BlockSizeMismatch,

    /// Chunk size fields disagree with each other
    BadChunk,

    /// Chunk type not known
    UnknownChunk,

    /// Image data ends inside a header or payload
    Truncated,

    /// Write would go past the end of the storage region
    OutOfBounds,

    /// Resume requested with no earlier write in the session
    NoSession,

    /// Storage backend failed or wrote fewer blocks than asked
    WriteFailed,

    /// Blocks covered by the chunks differ from the header's total
    TotalMismatch,

    /// Fill buffer allocation failed
    OutOfMemory,
}

impl SparseError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidHeader => "Invalid sparse header",
            Self::BlockSizeMismatch => "Sparse block size not a multiple of storage block size",
            Self::BadChunk => "Bad chunk size",
            Self::UnknownChunk => "Unknown chunk type",
            Self::Truncated => "Sparse image truncated",
            Self::OutOfBounds => "Write beyond end of storage",
            Self::NoSession => "No sparse session to resume",
            Self::WriteFailed => "Storage write failed",
            Self::TotalMismatch => "Sparse image write failure",
            Self::OutOfMemory => "Out of memory",
        }
    }

    /// Negative errno value for this error
    pub const fn errno(&self) -> i32 {
        match self {
            Self::WriteFailed | Self::TotalMismatch => -5,
            Self::OutOfMemory => -12,
            _ => -22,
        }
    }
}

impl fmt::Display for SparseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (err={})", self.as_str(), self.errno())
    }
}

impl From<SparseError> for BootError {
    fn from(err: SparseError) -> Self {
        match err {
            SparseError::WriteFailed | SparseError::TotalMismatch => BootError::Io,
            SparseError::OutOfMemory => BootError::OutOfMemory,
            _ => BootError::Invalid,
        }
    }
}
